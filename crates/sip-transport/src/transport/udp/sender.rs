use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::{Error, Result};

/// Sending half of a UDP transport, sharing the listener's socket
#[derive(Clone)]
pub struct UdpSender {
    socket: Arc<UdpSocket>,
}

impl UdpSender {
    /// Wraps a bound socket
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        UdpSender { socket }
    }

    /// Sends one datagram
    pub async fn send(&self, data: &[u8], destination: SocketAddr) -> Result<()> {
        let sent = self.socket.send_to(data, destination).await?;
        if sent != data.len() {
            return Err(Error::ShortWrite {
                sent,
                size: data.len(),
            });
        }
        trace!(len = sent, %destination, "sent datagram");
        Ok(())
    }
}
