pub mod udp;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;

use sipwire_sip_core::Message;

use crate::error::Result;

/// Largest datagram this stack sends; there is no fragmentation and no
/// fallback to a stream transport.
pub const MAX_DATAGRAM_SIZE: usize = 1300;

/// Events delivered by a transport to its owner
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A datagram parsed into a SIP message
    MessageReceived {
        /// The parsed message
        message: Message,
        /// Sender of the datagram
        source: SocketAddr,
        /// Local address it arrived on
        destination: SocketAddr,
    },

    /// A non-fatal problem, such as an unparsable datagram
    Error {
        /// Description
        error: String,
    },

    /// The transport stopped receiving
    Closed,
}

/// A SIP message transport
///
/// Implementations own their socket and report inbound traffic through the
/// `TransportEvent` channel returned when they are created.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Local socket address
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Encodes and sends a message
    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()>;

    /// Whether the transport guarantees delivery. Retransmission timers are
    /// only armed for unreliable transports.
    fn is_reliable(&self) -> bool {
        false
    }

    /// Ceiling on the encoded size of a single message, if any
    fn max_message_size(&self) -> Option<usize> {
        None
    }

    /// Stops the transport
    async fn close(&self) -> Result<()>;

    /// Whether [`close`](Transport::close) has been called
    fn is_closed(&self) -> bool;
}
