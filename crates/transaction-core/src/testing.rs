//! Test doubles for code built on the transaction layer
//!
//! [`MockTransport`] stands in for a socket: everything sent through it is
//! recorded with the (tokio) time it was sent, and tests inject inbound
//! messages through the same event channel a real transport uses.
//! [`RecordingTu`] is a transaction user that logs every callback and
//! answers requests through a pluggable responder.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use sipwire_sip_core::{Message, Request, Response, StatusCode, parse_message};
use sipwire_sip_transport::{Error, MAX_DATAGRAM_SIZE, Result, Transport, TransportEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use crate::handle::{ClientTransaction, LayerHandle, ServerTransaction};
use crate::tu::{RequestOutcome, TransactionUser};

/// A message handed to [`MockTransport::send_message`]
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// What was sent
    pub message: Message,
    /// Where it went
    pub destination: SocketAddr,
    /// When it was sent
    pub at: Instant,
}

/// In-memory [`Transport`]
#[derive(Debug)]
pub struct MockTransport {
    local: SocketAddr,
    reliable: bool,
    closed: AtomicBool,
    log: Mutex<Vec<SentMessage>>,
    sent_tx: mpsc::UnboundedSender<SentMessage>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SentMessage>>,
    events: mpsc::Sender<TransportEvent>,
}

impl MockTransport {
    /// Unreliable mock bound to `local`, and the receiving end of its
    /// event channel
    pub fn new(local: SocketAddr) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        Self::build(local, false)
    }

    /// Mock that reports itself as reliable
    pub fn reliable(local: SocketAddr) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        Self::build(local, true)
    }

    fn build(local: SocketAddr, reliable: bool) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (events, events_rx) = mpsc::channel(100);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            local,
            reliable,
            closed: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
            sent_tx,
            sent_rx: tokio::sync::Mutex::new(sent_rx),
            events,
        });
        (transport, events_rx)
    }

    /// Everything sent so far, oldest first
    pub fn sent(&self) -> Vec<SentMessage> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Waits for the next message sent after the previous call returned
    pub async fn next_sent(&self) -> Option<SentMessage> {
        self.sent_rx.lock().await.recv().await
    }

    /// Delivers `message` as if it had arrived from `source`
    pub async fn inject(&self, message: impl Into<Message>, source: SocketAddr) {
        let _ = self
            .events
            .send(TransportEvent::MessageReceived {
                message: message.into(),
                source,
                destination: self.local,
            })
            .await;
    }

    /// Parses `datagram` and delivers the result as if it had arrived from
    /// `source`
    pub async fn inject_datagram(&self, datagram: &[u8], source: SocketAddr) -> sipwire_sip_core::Result<()> {
        let message = parse_message(datagram)?;
        self.inject(message, source).await;
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local)
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        let size = message.to_bytes().len();
        if size > MAX_DATAGRAM_SIZE {
            return Err(Error::MessageTooLarge {
                size,
                limit: MAX_DATAGRAM_SIZE,
            });
        }
        let sent = SentMessage {
            message,
            destination,
            at: Instant::now(),
        };
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sent.clone());
        let _ = self.sent_tx.send(sent);
        Ok(())
    }

    fn is_reliable(&self) -> bool {
        self.reliable
    }

    fn max_message_size(&self) -> Option<usize> {
        Some(MAX_DATAGRAM_SIZE)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(TransportEvent::Closed).await;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A callback seen by [`RecordingTu`]
#[derive(Debug, Clone)]
pub enum TuEvent {
    /// `request_received`
    Request {
        /// The request
        request: Request,
        /// Where it came from
        source: SocketAddr,
        /// The transaction offered for it
        transaction: ServerTransaction,
    },
    /// `response_received`
    Response {
        /// The response
        response: Response,
        /// Its client transaction, if it matched one
        transaction: Option<ClientTransaction>,
    },
    /// `client_transaction_terminated`
    Terminated(ClientTransaction),
}

/// Decides the outcome of each request a [`RecordingTu`] receives
pub type Responder =
    Arc<dyn Fn(Request, ServerTransaction) -> BoxFuture<'static, RequestOutcome> + Send + Sync>;

/// [`TransactionUser`] that records every callback
///
/// By default every request's transaction is kept and left unanswered.
pub struct RecordingTu {
    layer: OnceLock<LayerHandle>,
    responder: Responder,
    events_tx: mpsc::UnboundedSender<TuEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TuEvent>>,
}

impl RecordingTu {
    /// TU that keeps every transaction offered to it
    pub fn new() -> Arc<Self> {
        Self::with_responder(Arc::new(
            |_request: Request, transaction: ServerTransaction| -> BoxFuture<'static, RequestOutcome> {
                async move { Ok(Some(transaction)) }.boxed()
            },
        ))
    }

    /// TU whose request outcomes come from `responder`
    pub fn with_responder(responder: Responder) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            layer: OnceLock::new(),
            responder,
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
        })
    }

    /// TU that answers every request with `status` through its transaction
    pub fn answering(status: StatusCode) -> Arc<Self> {
        Self::with_responder(Arc::new(
            move |request: Request, transaction: ServerTransaction| -> BoxFuture<'static, RequestOutcome> {
                async move {
                    let response = Response::from_request(status, &request);
                    if let Err(error) = transaction.respond(response) {
                        warn!(%error, "recording TU failed to respond");
                    }
                    Ok(Some(transaction))
                }
                .boxed()
            },
        ))
    }

    /// Handle of the layer this TU was started on
    pub fn layer(&self) -> Option<&LayerHandle> {
        self.layer.get()
    }

    /// Waits for the next callback
    pub async fn next_event(&self) -> Option<TuEvent> {
        self.events_rx.lock().await.recv().await
    }

    /// Next `response_received` callback, skipping anything else
    pub async fn next_response(&self) -> Option<(Response, Option<ClientTransaction>)> {
        loop {
            if let TuEvent::Response {
                response,
                transaction,
            } = self.next_event().await?
            {
                return Some((response, transaction));
            }
        }
    }

    /// Next `request_received` callback, skipping anything else
    pub async fn next_request(&self) -> Option<(Request, ServerTransaction)> {
        loop {
            if let TuEvent::Request {
                request,
                transaction,
                ..
            } = self.next_event().await?
            {
                return Some((request, transaction));
            }
        }
    }

    /// Callbacks recorded but not yet consumed
    pub fn drain(&self) -> Vec<TuEvent> {
        let mut drained = Vec::new();
        if let Ok(mut events) = self.events_rx.try_lock() {
            while let Ok(event) = events.try_recv() {
                drained.push(event);
            }
        }
        drained
    }
}

impl std::fmt::Debug for RecordingTu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingTu")
            .field("started", &self.layer.get().is_some())
            .finish()
    }
}

#[async_trait]
impl TransactionUser for RecordingTu {
    fn start(&self, layer: LayerHandle) {
        let _ = self.layer.set(layer);
    }

    async fn request_received(
        &self,
        request: Request,
        source: SocketAddr,
        transaction: ServerTransaction,
    ) -> RequestOutcome {
        let _ = self.events_tx.send(TuEvent::Request {
            request: request.clone(),
            source,
            transaction: transaction.clone(),
        });
        (self.responder)(request, transaction).await
    }

    async fn response_received(&self, response: Response, transaction: Option<ClientTransaction>) {
        let _ = self.events_tx.send(TuEvent::Response {
            response,
            transaction,
        });
    }

    async fn client_transaction_terminated(&self, transaction: ClientTransaction) {
        let _ = self.events_tx.send(TuEvent::Terminated(transaction));
    }
}
