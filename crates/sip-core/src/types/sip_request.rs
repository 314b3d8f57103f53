//! # SIP Request Message
//!
//! A request line (`METHOD Request-URI SIP/2.0`), headers and body.
//!
//! ```rust
//! use sipwire_sip_core::prelude::*;
//!
//! let request = Request::new(Method::Options, "sip:bob@example.com".parse().unwrap())
//!     .with_header(HeaderName::CALL_ID, "a84b4c76e66710")
//!     .with_header(HeaderName::CSEQ, "1 OPTIONS")
//!     .with_body("ping");
//!
//! assert_eq!(request.header(&HeaderName::CONTENT_LENGTH), Some("4"));
//! assert!(request.to_bytes().starts_with(b"OPTIONS sip:bob@example.com SIP/2.0\r\n"));
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::headers::{HeaderAccess, HeaderName, Headers};
use crate::types::message::write_message;
use crate::types::method::Method;
use crate::types::uri::Uri;

/// A SIP request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request method
    pub method: Method,
    /// Request-URI
    pub uri: Uri,
    /// Header fields
    pub headers: Headers,
    /// Message body
    pub body: Bytes,
}

impl Request {
    /// Request with no headers and an empty body
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            method,
            uri,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Builder-style header append
    pub fn with_header(mut self, name: impl Into<HeaderName>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Builder-style [`set_body`](Request::set_body)
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
        let start_line = format!("{} {} SIP/2.0", self.method, self.uri);
        write_message(&start_line, &self.headers, &self.body)
    }
}

impl HeaderAccess for Request {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
}
