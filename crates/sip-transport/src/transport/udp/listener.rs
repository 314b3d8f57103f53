use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::{Error, Result};

/// Receive buffer size; large enough for any UDP payload
const RECEIVE_BUFFER_SIZE: usize = 65_535;

/// Receiving half of a UDP transport
pub struct UdpListener {
    socket: Arc<UdpSocket>,
}

impl UdpListener {
    /// Binds a socket to `addr`
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::BindFailed { addr, source })?;
        Ok(UdpListener {
            socket: Arc::new(socket),
        })
    }

    /// Local address of the socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared handle on the socket, for the sending half
    pub fn clone_socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    /// Waits for the next datagram, returning its payload, sender and the
    /// local address it arrived on.
    pub async fn receive(&self) -> Result<(Bytes, SocketAddr, SocketAddr)> {
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        let (len, source) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        trace!(len, %source, "received datagram");
        Ok((Bytes::from(buf), source, self.local_addr()?))
    }
}
