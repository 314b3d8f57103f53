//! # SIP Response Message
//!
//! A status line (`SIP/2.0 Code Reason-Phrase`), headers and body.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::headers::{HeaderAccess, HeaderName, Headers};
use crate::types::message::write_message;
use crate::types::sip_request::Request;
use crate::types::status::StatusCode;

/// Headers a response inherits from the request it answers
const COPIED_FROM_REQUEST: [HeaderName; 5] = [
    HeaderName::VIA,
    HeaderName::TO,
    HeaderName::FROM,
    HeaderName::CALL_ID,
    HeaderName::CSEQ,
];

/// A SIP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Reason phrase
    pub reason: String,
    /// Header fields
    pub headers: Headers,
    /// Message body
    pub body: Bytes,
}

impl Response {
    /// Response with the standard reason phrase, no headers and an empty body
    pub fn new(status: StatusCode) -> Self {
        Response {
            status,
            reason: status.reason_phrase().to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Response to `request`: copies every `Via`, `To`, `From`, `Call-ID` and
    /// `CSeq` value and sets `Content-Length: 0`.
    ///
    /// ```rust
    /// use sipwire_sip_core::prelude::*;
    ///
    /// let request = Request::new(Method::Register, "sip:example.com".parse().unwrap())
    ///     .with_header("Via", "SIP/2.0/UDP client.example.com;branch=z9hG4bK1")
    ///     .with_header("Via", "SIP/2.0/UDP proxy.example.com;branch=z9hG4bK2")
    ///     .with_header("CSeq", "7 REGISTER")
    ///     .with_header("Subject", "not copied");
    ///
    /// let response = Response::from_request(StatusCode::OK, &request);
    /// assert_eq!(response.headers.get_all(&HeaderName::VIA).len(), 2);
    /// assert_eq!(response.cseq().unwrap().seq, 7);
    /// assert!(!response.has_header(&HeaderName::SUBJECT));
    /// ```
    pub fn from_request(status: StatusCode, request: &Request) -> Self {
        let mut response = Response::new(status);
        for name in &COPIED_FROM_REQUEST {
            for value in request.headers.get_all(name) {
                response.headers.add(name, value.as_str());
            }
        }
        response.headers.set(HeaderName::CONTENT_LENGTH, "0");
        response
    }

    /// Builder-style reason phrase override
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Builder-style header append
    pub fn with_header(mut self, name: impl Into<HeaderName>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Builder-style [`set_body`](Response::set_body)
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body);
        self
    }

    /// Replaces the body and keeps `Content-Length` in step with it
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers
            .set(HeaderName::CONTENT_LENGTH, self.body.len().to_string());
    }

    /// Wire encoding
    pub fn to_bytes(&self) -> Bytes {
        let start_line = format!("SIP/2.0 {} {}", self.status, self.reason);
        write_message(&start_line, &self.headers, &self.body)
    }
}

impl HeaderAccess for Response {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
}
