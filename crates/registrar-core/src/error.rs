use sipwire_sip_core::StatusCode;
use sipwire_transaction_core::{ProtocolError, RequestError};
use thiserror::Error;

/// A type alias for handling `Result`s with `RegistrarError`
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Registrar operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrarError {
    /// The request names a domain this registrar does not serve
    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    /// No live binding for the address-of-record
    #[error("no such user: {0}")]
    NoSuchUser(String),

    /// `Expires` header or parameter is not a number
    #[error("invalid Expires value: {0}")]
    InvalidExpires(String),

    /// `Contact` header could not be parsed, or `*` was used outside an
    /// unregistration
    #[error("invalid Contact: {0}")]
    InvalidContact(String),

    /// `To` header missing or unparsable
    #[error("invalid To header: {0}")]
    InvalidTo(String),
}

impl RegistrarError {
    /// Status code reported to the registering client
    pub fn status(&self) -> StatusCode {
        match self {
            RegistrarError::UnknownDomain(_) | RegistrarError::NoSuchUser(_) => {
                StatusCode::NOT_FOUND
            }
            RegistrarError::InvalidExpires(_)
            | RegistrarError::InvalidContact(_)
            | RegistrarError::InvalidTo(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<RegistrarError> for ProtocolError {
    fn from(error: RegistrarError) -> Self {
        ProtocolError::new(error.status())
    }
}

impl From<RegistrarError> for RequestError {
    fn from(error: RegistrarError) -> Self {
        RequestError::Protocol(error.into())
    }
}
