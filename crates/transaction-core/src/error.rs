use thiserror::Error;

use crate::transaction::{TransactionId, TransactionKind};

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transaction handling
#[derive(Error, Debug)]
pub enum Error {
    /// Error originating from the sip-core crate (parsing, header access)
    #[error("SIP core error: {0}")]
    SipCoreError(#[from] sipwire_sip_core::Error),

    /// Error originating from the sip-transport crate
    #[error("SIP transport error: {0}")]
    TransportError(String),

    /// The encoded message does not fit in one datagram. Not retryable.
    #[error("Message of {size} bytes exceeds the {limit} byte datagram limit")]
    Oversize {
        /// Encoded size
        size: usize,
        /// Datagram ceiling
        limit: usize,
    },

    /// A message or response was directed at a terminated transaction, or
    /// a response followed a final one
    #[error("{kind:?} transaction {id} is terminated or already answered")]
    SequencingViolation {
        /// Transaction kind
        kind: TransactionKind,
        /// Transaction id
        id: TransactionId,
    },

    /// Invalid transaction state transition attempted
    #[error("Invalid transaction state transition: {0}")]
    InvalidStateTransition(String),

    /// An ACK or CANCEL was started without the branch of the transaction
    /// it belongs to
    #[error("Request has no Via branch to reuse")]
    MissingBranch,

    /// A header the transaction layer relies on is absent
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// A Via host could not be turned into a socket address
    #[error("Unable to resolve host {0}")]
    UnresolvableHost(String),

    /// The transaction layer event loop has stopped
    #[error("Transaction layer closed")]
    LayerClosed,

    /// Timer settings that would stall or overflow the retransmit schedule
    #[error("Invalid timer settings: {0}")]
    InvalidTimers(String),

    /// CANCEL was requested on a non-INVITE client transaction
    #[error("Only INVITE transactions can be cancelled")]
    NotInvite,
}

impl From<sipwire_sip_transport::Error> for Error {
    fn from(e: sipwire_sip_transport::Error) -> Self {
        match e {
            sipwire_sip_transport::Error::MessageTooLarge { size, limit } => {
                Error::Oversize { size, limit }
            }
            other => Error::TransportError(other.to_string()),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::LayerClosed
    }
}
