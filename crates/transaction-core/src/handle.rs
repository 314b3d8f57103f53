//! Handles the TU holds on the transaction layer and its transactions
//!
//! Handles never wait on the layer's event loop: they validate what they
//! can on the spot (sizes, branches, terminated transactions) and queue the
//! rest as commands. A TU may therefore use them from inside its own
//! callbacks.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sipwire_sip_core::{
    HeaderAccess, Message, Method, Request, Response, Via, generate_branch,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::binding::TransportBinding;
use crate::builders::cancel_for;
use crate::error::{Error, Result};
use crate::layer::{Fsm, LayerCommand};
use crate::timer::TimerSettings;
use crate::transaction::client::{InviteClient, NonInviteClient};
use crate::transaction::{
    AtomicTransactionState, ClientKey, TransactionId, TransactionKind, TransactionState,
};

/// Entry point into a running transaction layer
#[derive(Clone)]
pub struct LayerHandle {
    commands: mpsc::UnboundedSender<LayerCommand>,
    binding: Arc<TransportBinding>,
    timers: TimerSettings,
}

impl LayerHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<LayerCommand>,
        binding: Arc<TransportBinding>,
        timers: TimerSettings,
    ) -> Self {
        Self {
            commands,
            binding,
            timers,
        }
    }

    pub(crate) fn binding(&self) -> &Arc<TransportBinding> {
        &self.binding
    }

    /// Whether the transport guarantees delivery
    pub fn is_reliable(&self) -> bool {
        self.binding.is_reliable()
    }

    /// Host this layer puts in its Via headers
    pub fn default_hostname(&self) -> &str {
        self.binding.default_hostname()
    }

    /// Host names this layer answers for
    pub fn hosts(&self) -> &[String] {
        self.binding.hosts()
    }

    /// Advertised port
    pub fn port(&self) -> u16 {
        self.binding.port()
    }

    /// Whether `via` names this layer's hosts and port
    pub fn is_local_via(&self, via: &Via) -> bool {
        self.binding.is_local_via(via)
    }

    /// Resolves `host` to a socket address, parsing IP literals directly
    pub async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        crate::binding::resolve(host, port).await
    }

    /// Timer durations in use
    pub fn timers(&self) -> TimerSettings {
        self.timers
    }

    /// Whether the layer's event loop has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Sends a request outside of any transaction, such as the ACK for a 2xx
    pub async fn send_request(&self, request: Request, target: SocketAddr) -> Result<()> {
        self.binding.send_request(request, target).await
    }

    /// Sends a response outside of any transaction
    pub async fn send_response(&self, response: Response) -> Result<()> {
        self.binding.send_response(response).await
    }

    /// Starts a client transaction for `request`
    ///
    /// A new branch-tagged Via is pushed onto the request unless it is an
    /// ACK or CANCEL; those must already carry the Via (and branch) of the
    /// transaction they belong to. Fails with [`Error::Oversize`] when the
    /// request does not fit in a datagram.
    pub fn start_client(&self, mut request: Request, target: SocketAddr) -> Result<ClientTransaction> {
        let branch = match request.method {
            Method::Ack | Method::Cancel => request
                .top_via()
                .ok()
                .and_then(|via| via.branch)
                .ok_or(Error::MissingBranch)?,
            _ => {
                let branch = generate_branch();
                let via = Via::new(self.default_hostname(), Some(self.port())).with_branch(branch.clone());
                request.push_via(&via);
                branch
            }
        };
        self.binding.stamp_via(&mut request)?;
        let cseq = request.cseq()?;
        self.binding.check_size(&Message::Request(request.clone()))?;

        let id = TransactionId::new();
        let reliable = self.is_reliable();
        let (kind, fsm) = if request.method == Method::Invite {
            let fsm = InviteClient::new(id, request.clone(), self.timers, reliable);
            (TransactionKind::InviteClient, Fsm::InviteClient(fsm))
        } else {
            let fsm = NonInviteClient::new(id, request.clone(), self.timers, reliable);
            (TransactionKind::NonInviteClient, Fsm::NonInviteClient(fsm))
        };

        let transaction = ClientTransaction {
            inner: Arc::new(ClientInner {
                id,
                kind,
                key: ClientKey::new(branch, cseq.method),
                request,
                target,
                state: fsm.machine().state_cell(),
                layer: self.clone(),
            }),
        };
        debug!(%id, key = %transaction.key(), %target, "starting client transaction");
        self.commands.send(LayerCommand::StartClient {
            transaction: transaction.clone(),
            fsm,
        })?;
        Ok(transaction)
    }

    /// Stops the layer's event loop. Pending transactions are dropped
    /// without notifying the TU.
    pub fn shutdown(&self) -> Result<()> {
        self.commands.send(LayerCommand::Shutdown)?;
        Ok(())
    }

    pub(crate) fn new_server_transaction(
        &self,
        id: TransactionId,
        kind: TransactionKind,
        method: Method,
        state: Arc<AtomicTransactionState>,
    ) -> ServerTransaction {
        ServerTransaction {
            inner: Arc::new(ServerInner {
                id,
                kind,
                method,
                state,
                answered: AtomicBool::new(false),
                layer: self.clone(),
            }),
        }
    }
}

impl fmt::Debug for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerHandle")
            .field("hosts", &self.hosts())
            .field("port", &self.port())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct ClientInner {
    id: TransactionId,
    kind: TransactionKind,
    key: ClientKey,
    request: Request,
    target: SocketAddr,
    state: Arc<AtomicTransactionState>,
    layer: LayerHandle,
}

/// A client transaction, as seen by the TU
#[derive(Clone)]
pub struct ClientTransaction {
    inner: Arc<ClientInner>,
}

impl ClientTransaction {
    /// Transaction id
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// INVITE or non-INVITE
    pub fn kind(&self) -> TransactionKind {
        self.inner.kind
    }

    /// Index of this transaction in the layer
    pub fn key(&self) -> &ClientKey {
        &self.inner.key
    }

    /// Branch of the Via this transaction sent
    pub fn branch(&self) -> &str {
        &self.inner.key.branch
    }

    /// Method of the request
    pub fn method(&self) -> &Method {
        &self.inner.request.method
    }

    /// The request as sent, Via included
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Where the request goes
    pub fn target(&self) -> SocketAddr {
        self.inner.target
    }

    /// Live state
    pub fn state(&self) -> TransactionState {
        self.inner.state.get()
    }

    /// Whether the transaction has terminated
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminated()
    }

    /// Sends a CANCEL for this INVITE in a transaction of its own and returns
    /// that transaction
    pub fn cancel(&self) -> Result<ClientTransaction> {
        if self.kind() != TransactionKind::InviteClient {
            return Err(Error::NotInvite);
        }
        let cancel = cancel_for(self.request())?;
        self.inner.layer.start_client(cancel, self.target())
    }
}

impl PartialEq for ClientTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ClientTransaction {}

impl fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("id", &self.id())
            .field("key", self.key())
            .field("target", &self.target())
            .field("state", &self.state())
            .finish()
    }
}

struct ServerInner {
    id: TransactionId,
    kind: TransactionKind,
    method: Method,
    state: Arc<AtomicTransactionState>,
    /// Set once a final response has been queued
    answered: AtomicBool,
    layer: LayerHandle,
}

/// A server transaction, as seen by the TU
#[derive(Clone)]
pub struct ServerTransaction {
    inner: Arc<ServerInner>,
}

impl ServerTransaction {
    /// Transaction id
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// INVITE or non-INVITE
    pub fn kind(&self) -> TransactionKind {
        self.inner.kind
    }

    /// Method of the request that created the transaction
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Live state
    pub fn state(&self) -> TransactionState {
        self.inner.state.get()
    }

    /// Whether the transaction has terminated
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminated()
    }

    /// Sends `response` through this transaction
    ///
    /// Fails at once with [`Error::Oversize`] for a response that does not
    /// fit in a datagram, or [`Error::SequencingViolation`] once the
    /// transaction has terminated or a final response has been sent
    /// through this handle.
    pub fn respond(&self, response: Response) -> Result<()> {
        if self.is_terminated() || self.inner.answered.load(Ordering::Acquire) {
            return Err(self.sequencing_violation());
        }
        self.inner
            .layer
            .binding()
            .check_size(&Message::Response(response.clone()))?;
        if response.status.is_final() && self.inner.answered.swap(true, Ordering::AcqRel) {
            return Err(self.sequencing_violation());
        }
        self.inner.layer.commands.send(LayerCommand::Respond {
            id: self.id(),
            response,
        })?;
        Ok(())
    }
}

impl ServerTransaction {
    fn sequencing_violation(&self) -> Error {
        debug!(id = %self.id(), "response refused");
        Error::SequencingViolation {
            kind: self.kind(),
            id: self.id(),
        }
    }
}

impl PartialEq for ServerTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ServerTransaction {}

impl fmt::Debug for ServerTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTransaction")
            .field("id", &self.id())
            .field("method", self.method())
            .field("state", &self.state())
            .finish()
    }
}
