//! The transaction layer event loop
//!
//! One task owns every transaction of a transport: it reads parsed messages
//! from the transport, commands from handles and firings from timer tasks,
//! and feeds them to the state machines one at a time. Matching follows
//! RFC 3261 section 17.2.3 for requests and 17.1.3 for responses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sipwire_sip_core::{
    HeaderAccess, HeaderName, Message, Method, Request, Response, Rport, StatusCode, Via,
    generate_branch,
};
use sipwire_sip_transport::{Transport, TransportEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::binding::TransportBinding;
use crate::error::{Error, Result};
use crate::handle::{ClientTransaction, LayerHandle};
use crate::timer::{TimerHandle, TimerSet, TimerSettings, TimerType};
use crate::transaction::client::{InviteClient, NonInviteClient};
use crate::transaction::key::matches_legacy;
use crate::transaction::server::{InviteServer, NonInviteServer};
use crate::transaction::{
    Action, ClientKey, Machine, ServerKey, TransactionId, TransactionState,
};
use crate::tu::TransactionUser;

/// Headers a request must carry, RFC 3261 section 8.1.1
const REQUIRED_HEADERS: [HeaderName; 6] = [
    HeaderName::TO,
    HeaderName::FROM,
    HeaderName::CALL_ID,
    HeaderName::VIA,
    HeaderName::MAX_FORWARDS,
    HeaderName::CSEQ,
];

/// Configuration of a transaction layer
#[derive(Debug, Clone, Default)]
pub struct TransactionLayerConfig {
    /// Host names this layer answers for; the first goes into outgoing Via
    /// headers. Defaults to the transport's local IP address.
    pub hosts: Vec<String>,
    /// Advertised port. `0` means the transport's local port.
    pub port: u16,
    /// Timer durations
    pub timers: TimerSettings,
}

/// Work queued for the event loop
pub(crate) enum LayerCommand {
    StartClient {
        transaction: ClientTransaction,
        fsm: Fsm,
    },
    Respond {
        id: TransactionId,
        response: Response,
    },
    TimerFired {
        id: TransactionId,
        timer: TimerType,
        token: u64,
    },
    Shutdown,
}

/// One of the four state machines
#[derive(Debug)]
pub(crate) enum Fsm {
    InviteClient(InviteClient),
    NonInviteClient(NonInviteClient),
    InviteServer(InviteServer),
    NonInviteServer(NonInviteServer),
}

impl Fsm {
    pub(crate) fn machine(&self) -> &Machine {
        match self {
            Fsm::InviteClient(fsm) => fsm.machine(),
            Fsm::NonInviteClient(fsm) => fsm.machine(),
            Fsm::InviteServer(fsm) => fsm.machine(),
            Fsm::NonInviteServer(fsm) => fsm.machine(),
        }
    }

    fn for_request(request: &Request, timers: TimerSettings, reliable: bool) -> Fsm {
        let id = TransactionId::new();
        if request.method == Method::Invite {
            Fsm::InviteServer(InviteServer::new(id, timers, reliable))
        } else {
            Fsm::NonInviteServer(NonInviteServer::new(id, timers, reliable))
        }
    }

    fn start(&mut self) -> Vec<Action> {
        match self {
            Fsm::InviteClient(fsm) => fsm.start(),
            Fsm::NonInviteClient(fsm) => fsm.start(),
            Fsm::InviteServer(_) | Fsm::NonInviteServer(_) => Vec::new(),
        }
    }

    fn on_request(&mut self, request: Request) -> Result<Vec<Action>> {
        match self {
            Fsm::InviteServer(fsm) => fsm.on_request(request),
            Fsm::NonInviteServer(fsm) => fsm.on_request(request),
            Fsm::InviteClient(_) | Fsm::NonInviteClient(_) => Err(Error::InvalidStateTransition(
                "client transactions do not receive requests".to_string(),
            )),
        }
    }

    fn on_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self {
            Fsm::InviteClient(fsm) => fsm.on_response(response),
            Fsm::NonInviteClient(fsm) => fsm.on_response(response),
            Fsm::InviteServer(_) | Fsm::NonInviteServer(_) => Err(Error::InvalidStateTransition(
                "server transactions do not receive responses".to_string(),
            )),
        }
    }

    fn on_tu_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self {
            Fsm::InviteServer(fsm) => fsm.on_tu_response(response),
            Fsm::NonInviteServer(fsm) => fsm.on_tu_response(response),
            Fsm::InviteClient(_) | Fsm::NonInviteClient(_) => Err(Error::InvalidStateTransition(
                "client transactions do not send responses".to_string(),
            )),
        }
    }

    fn on_timer(&mut self, timer: TimerType) -> Result<Vec<Action>> {
        match self {
            Fsm::InviteClient(fsm) => fsm.on_timer(timer),
            Fsm::NonInviteClient(fsm) => fsm.on_timer(timer),
            Fsm::InviteServer(fsm) => fsm.on_timer(timer),
            Fsm::NonInviteServer(fsm) => fsm.on_timer(timer),
        }
    }

    fn last_response(&self) -> Option<&Response> {
        match self {
            Fsm::InviteServer(fsm) => fsm.last_response(),
            Fsm::NonInviteServer(fsm) => fsm.last_response(),
            Fsm::InviteClient(_) | Fsm::NonInviteClient(_) => None,
        }
    }
}

/// How a transaction is found again
enum Index {
    Client(ClientTransaction),
    Server(ServerKey),
    Legacy,
    /// Error responses sent by the layer itself; nothing routes to them
    Unindexed,
}

struct Entry {
    fsm: Fsm,
    timers: TimerSet,
    index: Index,
}

impl Entry {
    fn new(fsm: Fsm, index: Index) -> Self {
        Self {
            fsm,
            timers: TimerSet::new(),
            index,
        }
    }

    fn client(&self) -> Option<&ClientTransaction> {
        match &self.index {
            Index::Client(transaction) => Some(transaction),
            _ => None,
        }
    }
}

/// The transaction layer of one transport
pub struct TransactionLayer {
    binding: Arc<TransportBinding>,
    timers: TimerSettings,
    tu: Arc<dyn TransactionUser>,
    handle: LayerHandle,
    commands_tx: mpsc::UnboundedSender<LayerCommand>,
    commands: mpsc::UnboundedReceiver<LayerCommand>,
    events: mpsc::Receiver<TransportEvent>,
    transactions: HashMap<TransactionId, Entry>,
    servers: HashMap<ServerKey, TransactionId>,
    legacy_servers: Vec<(TransactionId, Request)>,
    clients: HashMap<ClientKey, TransactionId>,
    next_token: u64,
}

impl TransactionLayer {
    /// Starts a layer over `transport`, reading its parsed traffic from
    /// `events`, and binds `tu` to it
    ///
    /// Returns the handle the TU and the application use, and the task
    /// running the event loop. The loop ends on [`LayerHandle::shutdown`] or
    /// when the transport closes.
    pub fn start(
        config: TransactionLayerConfig,
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
        tu: Arc<dyn TransactionUser>,
    ) -> Result<(LayerHandle, JoinHandle<()>)> {
        config.timers.validate()?;
        let local = transport.local_addr()?;
        let hosts = if config.hosts.is_empty() {
            if local.ip().is_unspecified() {
                warn!(%local, "no hosts configured; Via headers will carry a wildcard address");
            }
            vec![local.ip().to_string()]
        } else {
            config.hosts
        };
        let port = if config.port == 0 { local.port() } else { config.port };
        let binding = Arc::new(TransportBinding::new(transport, hosts, port));

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let handle = LayerHandle::new(commands_tx.clone(), binding.clone(), config.timers);
        tu.start(handle.clone());

        info!(
            hosts = ?binding.hosts(),
            port,
            %local,
            reliable = binding.is_reliable(),
            "transaction layer started"
        );

        let layer = TransactionLayer {
            binding,
            timers: config.timers,
            tu,
            handle: handle.clone(),
            commands_tx,
            commands,
            events,
            transactions: HashMap::new(),
            servers: HashMap::new(),
            legacy_servers: Vec::new(),
            clients: HashMap::new(),
            next_token: 0,
        };
        let task = tokio::spawn(layer.run());
        Ok((handle, task))
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(LayerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = self.events.recv() => match event {
                    Some(TransportEvent::MessageReceived { message, source, .. }) => {
                        self.handle_message(message, source).await;
                    }
                    Some(TransportEvent::Error { error }) => {
                        debug!(%error, "transport dropped a datagram");
                    }
                    Some(TransportEvent::Closed) | None => {
                        info!("transport closed");
                        break;
                    }
                },
            }
        }
        debug!(pending = self.transactions.len(), "transaction layer stopped");
        self.transactions.clear();
    }

    async fn handle_command(&mut self, command: LayerCommand) {
        match command {
            LayerCommand::StartClient { transaction, mut fsm } => {
                let id = transaction.id();
                if let Some(previous) = self.clients.insert(transaction.key().clone(), id) {
                    warn!(%id, %previous, key = %transaction.key(), "client transaction key reused");
                }
                let actions = fsm.start();
                self.transactions
                    .insert(id, Entry::new(fsm, Index::Client(transaction)));
                self.apply(id, actions).await;
            }
            LayerCommand::Respond { id, response } => {
                let Some(entry) = self.transactions.get_mut(&id) else {
                    debug!(%id, status = %response.status, "response for a transaction that is gone");
                    return;
                };
                let result = entry.fsm.on_tu_response(response);
                self.settle(id, result).await;
            }
            LayerCommand::TimerFired { id, timer, token } => {
                let Some(entry) = self.transactions.get_mut(&id) else {
                    return;
                };
                if !entry.timers.fired(timer, token) {
                    trace!(%id, %timer, "stale timer firing ignored");
                    return;
                }
                trace!(%id, %timer, "timer fired");
                let result = entry.fsm.on_timer(timer);
                self.settle(id, result).await;
            }
            LayerCommand::Shutdown => {}
        }
    }

    async fn handle_message(&mut self, message: Message, source: SocketAddr) {
        match message {
            Message::Request(request) => self.handle_request(request, source).await,
            Message::Response(response) => self.handle_response(response, source).await,
        }
    }

    async fn handle_request(&mut self, mut request: Request, source: SocketAddr) {
        let mut invalid = false;
        for name in &REQUIRED_HEADERS {
            if request.has_header(name) {
                continue;
            }
            invalid = true;
            if *name == HeaderName::VIA {
                let via = Via::new(source.ip().to_string(), Some(source.port())).with_branch(generate_branch());
                request.push_via(&via);
            } else {
                request.headers.add(name, "");
            }
        }
        if invalid {
            warn!(%source, method = %request.method, "request missing mandatory headers");
            let response = Response::from_request(StatusCode::BAD_REQUEST, &request);
            self.respond_in_new_transaction(response).await;
            return;
        }

        let mut via = match request.top_via() {
            Ok(via) => via,
            Err(error) => {
                warn!(%source, %error, "request with unusable Via dropped");
                return;
            }
        };
        let source_ip = source.ip().to_string();
        if via.host != source_ip {
            via.received = Some(source_ip);
        }
        if via.rport == Rport::Requested {
            via.rport = Rport::Value(source.port());
        }
        request.set_top_via(&via);

        let key = ServerKey::from_request(&request, &via);
        let existing = match &key {
            Some(key) => self.servers.get(key).copied(),
            None => self.match_legacy(&request),
        };
        if let Some(id) = existing {
            trace!(%id, method = %request.method, "request matched server transaction");
            if let Some(entry) = self.transactions.get_mut(&id) {
                let result = entry.fsm.on_request(request);
                self.settle(id, result).await;
            }
            return;
        }

        let mut fsm = Fsm::for_request(&request, self.timers, self.binding.is_reliable());
        let id = fsm.machine().id();
        let offered = self.handle.new_server_transaction(
            id,
            fsm.machine().kind(),
            request.method.clone(),
            fsm.machine().state_cell(),
        );
        debug!(%id, %source, method = %request.method, "new request for the TU");

        match self.tu.request_received(request.clone(), source, offered).await {
            Ok(Some(transaction)) if transaction.id() == id => {
                let index = match key {
                    Some(key) => {
                        self.servers.insert(key.clone(), id);
                        Index::Server(key)
                    }
                    None => {
                        self.legacy_servers.push((id, request.clone()));
                        Index::Legacy
                    }
                };
                let trying = if request.method == Method::Invite {
                    Some(fsm.on_tu_response(Response::from_request(StatusCode::TRYING, &request)))
                } else {
                    None
                };
                self.transactions.insert(id, Entry::new(fsm, index));
                if let Some(result) = trying {
                    self.settle(id, result).await;
                }
            }
            Ok(Some(transaction)) => {
                fsm.machine().state_cell().set(TransactionState::Terminated);
                warn!(%id, returned = %transaction.id(), "TU returned a transaction for another request");
            }
            Ok(None) => {
                fsm.machine().state_cell().set(TransactionState::Terminated);
                trace!(%id, "TU kept no transaction for the request");
            }
            Err(error) => {
                fsm.machine().state_cell().set(TransactionState::Terminated);
                let response = error.to_response(&request);
                debug!(%source, %error, status = %response.status, "TU rejected request");
                self.respond_in_new_transaction(response).await;
            }
        }
    }

    fn match_legacy(&self, request: &Request) -> Option<TransactionId> {
        self.legacy_servers.iter().find_map(|(id, original)| {
            let last_response = self
                .transactions
                .get(id)
                .and_then(|entry| entry.fsm.last_response());
            matches_legacy(original, last_response, request).then_some(*id)
        })
    }

    /// Sends a response the layer generated itself through a server
    /// transaction that no request can match
    async fn respond_in_new_transaction(&mut self, response: Response) {
        let mut fsm = Fsm::NonInviteServer(NonInviteServer::new(
            TransactionId::new(),
            self.timers,
            self.binding.is_reliable(),
        ));
        let id = fsm.machine().id();
        let result = fsm.on_tu_response(response);
        self.transactions.insert(id, Entry::new(fsm, Index::Unindexed));
        self.settle(id, result).await;
    }

    async fn handle_response(&mut self, response: Response, source: SocketAddr) {
        let via = match response.top_via() {
            Ok(via) => via,
            Err(error) => {
                debug!(%source, %error, "response without usable Via dropped");
                return;
            }
        };
        if !self.binding.is_local_via(&via) {
            debug!(%source, host = %via.host, port = ?via.port, "response not addressed to this layer dropped");
            return;
        }

        let matched = match (via.branch.as_deref(), response.cseq()) {
            (Some(branch), Ok(cseq)) => self
                .clients
                .get(&ClientKey::new(branch, cseq.method.clone()))
                .copied()
                .filter(|id| {
                    self.transactions
                        .get(id)
                        .and_then(Entry::client)
                        .and_then(|client| client.request().cseq().ok())
                        .is_some_and(|sent| sent.seq == cseq.seq)
                }),
            _ => None,
        };

        match matched {
            Some(id) => {
                trace!(%id, status = %response.status, "response matched client transaction");
                if let Some(entry) = self.transactions.get_mut(&id) {
                    let result = entry.fsm.on_response(response);
                    self.settle(id, result).await;
                }
            }
            None => {
                debug!(%source, status = %response.status, "response matched no client transaction");
                self.tu.response_received(response, None).await;
            }
        }
    }

    async fn settle(&mut self, id: TransactionId, result: Result<Vec<Action>>) {
        match result {
            Ok(actions) => self.apply(id, actions).await,
            Err(error @ Error::SequencingViolation { .. }) => {
                error!(%id, %error, "message routed to a terminated transaction");
            }
            Err(error) => warn!(%id, %error, "transaction rejected input"),
        }
    }

    async fn apply(&mut self, id: TransactionId, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::SendRequest(request) => {
                    let Some(target) = self
                        .transactions
                        .get(&id)
                        .and_then(Entry::client)
                        .map(ClientTransaction::target)
                    else {
                        continue;
                    };
                    if let Err(error) = self.binding.send_request(request, target).await {
                        warn!(%id, %target, %error, "failed to send request");
                    }
                }
                Action::SendResponse(response) => {
                    if let Err(error) = self.binding.send_response(response).await {
                        warn!(%id, %error, "failed to send response");
                    }
                }
                Action::StartTimer(timer, duration) => self.start_timer(id, timer, duration),
                Action::CancelTimer(timer) => {
                    if let Some(entry) = self.transactions.get_mut(&id) {
                        entry.timers.cancel(timer);
                    }
                }
                Action::DeliverResponse(response) => {
                    let transaction = self
                        .transactions
                        .get(&id)
                        .and_then(Entry::client)
                        .cloned();
                    self.tu.response_received(response, transaction).await;
                }
                Action::Terminate => self.remove(id).await,
            }
        }
    }

    fn start_timer(&mut self, id: TransactionId, timer: TimerType, duration: Duration) {
        let Some(entry) = self.transactions.get_mut(&id) else {
            return;
        };
        self.next_token += 1;
        let token = self.next_token;
        let commands = self.commands_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = commands.send(LayerCommand::TimerFired { id, timer, token });
        });
        entry.timers.arm(timer, TimerHandle::new(token, task));
    }

    async fn remove(&mut self, id: TransactionId) {
        let Some(entry) = self.transactions.remove(&id) else {
            return;
        };
        debug!(%id, kind = ?entry.fsm.machine().kind(), "transaction terminated");
        match entry.index {
            Index::Client(transaction) => {
                if self.clients.get(transaction.key()) == Some(&id) {
                    self.clients.remove(transaction.key());
                }
                self.tu.client_transaction_terminated(transaction).await;
            }
            Index::Server(key) => {
                if self.servers.get(&key) == Some(&id) {
                    self.servers.remove(&key);
                }
            }
            Index::Legacy => self.legacy_servers.retain(|(legacy_id, _)| *legacy_id != id),
            Index::Unindexed => {}
        }
    }
}
