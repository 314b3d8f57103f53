//! SIP message model for the sipwire stack
//!
//! This crate holds the value types every other sipwire crate exchanges:
//! requests and responses with an ordered, case-insensitive header multimap,
//! structured `Via` segments, SIP URIs and name-addresses, plus the wire
//! parser and serializer for the RFC 3261 text format.
//!
//! Nothing here has behavior beyond the grammar. Transaction matching,
//! retransmission and routing live in `sipwire-transaction-core`.
//!
//! ```rust
//! use sipwire_sip_core::prelude::*;
//!
//! let raw = b"OPTIONS sip:bob@example.com SIP/2.0\r\n\
//!             Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK74bf9\r\n\
//!             Call-ID: 843817637684230@998sdasdh09\r\n\
//!             CSeq: 1 OPTIONS\r\n\
//!             Content-Length: 0\r\n\r\n";
//!
//! let message = parse_message(raw).unwrap();
//! let request = message.as_request().unwrap();
//! assert_eq!(request.method, Method::Options);
//! assert_eq!(request.top_via().unwrap().branch.as_deref(), Some("z9hG4bK74bf9"));
//! ```

pub mod error;
pub mod parser;
pub mod types;

pub use error::{Error, Result};
pub use parser::parse_message;
pub use types::{
    generate_branch, Address, CSeq, HeaderAccess, HeaderName, Headers, Message, Method, Request,
    Response, Rport, Scheme, StatusCode, Uri, Via, BRANCH_MAGIC_COOKIE, DEFAULT_SIP_PORT,
};

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::parser::parse_message;
    pub use crate::types::{
        generate_branch, Address, CSeq, HeaderAccess, HeaderName, Headers, Message, Method,
        Request, Response, Rport, Scheme, StatusCode, Uri, Via, BRANCH_MAGIC_COOKIE,
        DEFAULT_SIP_PORT,
    };
}
