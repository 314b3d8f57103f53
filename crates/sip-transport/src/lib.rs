//! Datagram transport for the sipwire stack
//!
//! A transport owns a socket, turns inbound datagrams into parsed SIP
//! messages delivered as [`TransportEvent`]s, and sends encoded messages.
//! Transaction matching and Via handling happen one layer up, in
//! `sipwire-transaction-core`.

pub mod error;
pub mod transport;


pub use error::{Error, Result};
pub use transport::udp::UdpTransport;
pub use transport::{MAX_DATAGRAM_SIZE, Transport, TransportEvent};

/// Bind a UDP transport to the specified address
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        Error, MAX_DATAGRAM_SIZE, Result, Transport, TransportEvent, UdpTransport, bind_udp,
    };
}
