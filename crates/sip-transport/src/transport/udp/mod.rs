mod listener;
mod sender;

pub use listener::UdpListener;
pub use sender::UdpSender;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, trace, warn};

use sipwire_sip_core::Message;

use crate::error::{Error, Result};
use crate::transport::{MAX_DATAGRAM_SIZE, Transport, TransportEvent};

// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// UDP transport for SIP messages
///
/// Each datagram is parsed into exactly one message. Datagrams that fail to
/// parse are logged and reported as [`TransportEvent::Error`]; they never stop
/// the receive loop.
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    sender: UdpSender,
    listener: Arc<UdpListener>,
    closed: AtomicBool,
    shutdown: Notify,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl UdpTransport {
    /// Creates a new UDP transport bound to the specified address
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let listener = UdpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("SIP UDP transport bound to {}", local_addr);

        // Sender shares the listener's socket
        let sender = UdpSender::new(listener.clone_socket());

        let transport = UdpTransport {
            inner: Arc::new(UdpTransportInner {
                sender,
                listener: Arc::new(listener),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
                events_tx,
            }),
        };

        transport.spawn_receive_loop();

        Ok((transport, events_rx))
    }

    // Spawns a task to receive packets from the UDP socket
    fn spawn_receive_loop(&self) {
        let transport = self.clone();

        tokio::spawn(async move {
            let inner = &transport.inner;

            while !inner.closed.load(Ordering::Acquire) {
                let result = tokio::select! {
                    result = inner.listener.receive() => result,
                    _ = inner.shutdown.notified() => break,
                };

                match result {
                    Ok((packet, source, local_addr)) => {
                        let event = match sipwire_sip_core::parse_message(&packet) {
                            Ok(message) => {
                                debug!(%source, message = %message.short_description(), "received SIP message");
                                TransportEvent::MessageReceived {
                                    message,
                                    source,
                                    destination: local_addr,
                                }
                            }
                            Err(e) => {
                                warn!(%source, error = %e, "dropping unparsable datagram");
                                TransportEvent::Error {
                                    error: format!("Error parsing SIP message from {source}: {e}"),
                                }
                            }
                        };

                        if inner.events_tx.send(event).await.is_err() {
                            debug!("event receiver dropped, stopping receive loop");
                            break;
                        }
                    }
                    Err(e) => {
                        if inner.closed.load(Ordering::Acquire) {
                            break;
                        }

                        // ICMP port unreachable surfaces here on some platforms
                        error!("Error receiving UDP packet: {}", e);
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Error receiving packet: {e}"),
                            })
                            .await;
                    }
                }
            }

            let _ = inner.events_tx.send(TransportEvent::Closed).await;
            info!("UDP receive loop terminated");
        });
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.listener.local_addr()
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let bytes = message.to_bytes();
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::MessageTooLarge {
                size: bytes.len(),
                limit: MAX_DATAGRAM_SIZE,
            });
        }

        trace!(
            len = bytes.len(),
            %destination,
            message = %message.short_description(),
            "sending SIP message"
        );
        self.inner.sender.send(&bytes, destination).await
    }

    fn max_message_size(&self) -> Option<usize> {
        Some(MAX_DATAGRAM_SIZE)
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.shutdown.notify_one();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(addr) = self.inner.listener.local_addr() {
            write!(f, "UdpTransport({})", addr)
        } else {
            write!(f, "UdpTransport(<e>)")
        }
    }
}
