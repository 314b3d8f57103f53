//! SIP value types

pub mod address;
pub mod cseq;
pub mod headers;
pub mod message;
pub mod method;
pub mod sip_request;
pub mod sip_response;
pub mod status;
pub mod uri;
pub mod via;

pub use address::Address;
pub use cseq::CSeq;
pub use headers::{HeaderAccess, HeaderName, Headers};
pub use message::Message;
pub use method::Method;
pub use sip_request::Request;
pub use sip_response::Response;
pub use status::StatusCode;
pub use uri::{Scheme, Uri};
pub use via::{generate_branch, Rport, Via, BRANCH_MAGIC_COOKIE, DEFAULT_SIP_PORT};
