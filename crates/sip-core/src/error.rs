//! Parse errors for SIP messages, headers, Via segments and URIs

use thiserror::Error;

/// Result type for sip-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or validating SIP text
///
/// Every variant describes malformed input. Callers receiving a datagram
/// drop it on any of these; none of them are fatal to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Input held no message at all (empty or only CRLF keep-alives)
    #[error("empty message")]
    Empty,

    /// The header section was not valid UTF-8
    #[error("message head is not valid UTF-8")]
    InvalidUtf8,

    /// Neither a request line nor a status line
    #[error("invalid start line: {0}")]
    InvalidStartLine(String),

    /// A header line without a `name: value` shape
    #[error("invalid header line: {0}")]
    InvalidHeader(String),

    /// The header section never reached the blank separator line
    #[error("message head is not terminated by an empty line")]
    UnterminatedHead,

    /// Status code outside 100..=699
    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// `Content-Length` was not a number
    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// Fewer body bytes than `Content-Length` announced
    #[error("body length {actual} does not match Content-Length {expected}")]
    ContentLengthMismatch {
        /// Value of the Content-Length header
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Malformed Via segment
    #[error("invalid Via header: {0}")]
    InvalidVia(String),

    /// Malformed SIP URI
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// Malformed name-addr / addr-spec
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed CSeq value
    #[error("invalid CSeq: {0}")]
    InvalidCSeq(String),

    /// Malformed method token
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// A header needed for the requested operation is absent
    #[error("missing header: {0}")]
    MissingHeader(String),
}
