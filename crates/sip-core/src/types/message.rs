use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::types::headers::{HeaderAccess, Headers};
use crate::types::sip_request::Request;
use crate::types::sip_response::Response;

/// Either kind of SIP message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// A request
    Request(Request),
    /// A response
    Response(Response),
}

impl Message {
    /// Whether this is a request
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    /// The request, if this is one
    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(request) => Some(request),
            Message::Response(_) => None,
        }
    }

    /// The response, if this is one
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Request(_) => None,
            Message::Response(response) => Some(response),
        }
    }

    /// Message body
    pub fn body(&self) -> &Bytes {
        match self {
            Message::Request(request) => &request.body,
            Message::Response(response) => &response.body,
        }
    }

    /// Wire encoding
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Message::Request(request) => request.to_bytes(),
            Message::Response(response) => response.to_bytes(),
        }
    }

    /// Short human-readable label for logs: method or status code
    pub fn short_description(&self) -> String {
        match self {
            Message::Request(request) => format!("{} {}", request.method, request.uri),
            Message::Response(response) => format!("{} {}", response.status, response.reason),
        }
    }
}

impl HeaderAccess for Message {
    fn headers(&self) -> &Headers {
        match self {
            Message::Request(request) => &request.headers,
            Message::Response(response) => &response.headers,
        }
    }

    fn headers_mut(&mut self) -> &mut Headers {
        match self {
            Message::Request(request) => &mut request.headers,
            Message::Response(response) => &mut response.headers,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

pub(crate) fn write_message(start_line: &str, headers: &Headers, body: &[u8]) -> Bytes {
    let mut head = String::with_capacity(256);
    head.push_str(start_line);
    head.push_str("\r\n");
    for (name, value) in headers {
        head.push_str(&name.wire_name());
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.put_slice(head.as_bytes());
    buf.put_slice(body);
    buf.freeze()
}
