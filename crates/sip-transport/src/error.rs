use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by a SIP transport
#[derive(Debug, Error)]
pub enum Error {
    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Binding the local socket failed
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The transport was closed
    #[error("transport is closed")]
    TransportClosed,

    /// The encoded message does not fit in one datagram
    #[error("message of {size} bytes exceeds the {limit} byte datagram limit")]
    MessageTooLarge {
        /// Encoded size
        size: usize,
        /// Datagram ceiling
        limit: usize,
    },

    /// The socket accepted fewer bytes than the datagram held
    #[error("short write: sent {sent} of {size} bytes")]
    ShortWrite {
        /// Bytes written
        sent: usize,
        /// Bytes requested
        size: usize,
    },
}
