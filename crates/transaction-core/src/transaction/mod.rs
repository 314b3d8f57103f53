//! The four RFC 3261 transaction state machines
//!
//! Each machine is sans-IO: it consumes an input (a message from the
//! network, a response from the TU, a timer firing) and returns the
//! [`Action`]s the transaction layer must carry out. The layer owns the
//! machines, their timers and the socket; nothing in this module awaits.

pub mod client;
pub mod key;
pub mod server;
pub mod state;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sipwire_sip_core::{Request, Response};
use tracing::trace;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::timer::TimerType;

pub use key::{ClientKey, ServerKey};
pub use state::{AtomicTransactionState, TransactionState};

/// The four transaction state machines of RFC 3261 section 17
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// Section 17.1.1
    InviteClient,
    /// Section 17.1.2
    NonInviteClient,
    /// Section 17.2.1
    InviteServer,
    /// Section 17.2.2
    NonInviteServer,
}

impl TransactionKind {
    /// Whether this is a client transaction
    pub fn is_client(&self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::NonInviteClient)
    }

    /// Whether this kind is driven by INVITE
    pub fn is_invite(&self) -> bool {
        matches!(self, TransactionKind::InviteClient | TransactionKind::InviteServer)
    }

    /// Initial state of the machine
    pub fn initial_state(&self) -> TransactionState {
        match self {
            TransactionKind::InviteClient => TransactionState::Calling,
            TransactionKind::InviteServer => TransactionState::Proceeding,
            TransactionKind::NonInviteClient | TransactionKind::NonInviteServer => {
                TransactionState::Trying
            }
        }
    }
}

/// Identifier of a transaction within one transaction layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// A fresh random id
    pub fn new() -> Self {
        TransactionId(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Work a state machine hands back to the transaction layer
#[derive(Debug, Clone)]
pub enum Action {
    /// Send a request to the client transaction's target
    SendRequest(Request),
    /// Send a response along its top Via
    SendResponse(Response),
    /// Arm a timer, replacing any running instance of the same type
    StartTimer(TimerType, Duration),
    /// Disarm a timer
    CancelTimer(TimerType),
    /// Hand a response to the TU
    DeliverResponse(Response),
    /// Remove the transaction from the layer
    Terminate,
}

/// State shared by every machine: identity and the live state cell
#[derive(Debug, Clone)]
pub struct Machine {
    id: TransactionId,
    kind: TransactionKind,
    state: Arc<AtomicTransactionState>,
    reliable: bool,
}

impl Machine {
    pub(crate) fn new(id: TransactionId, kind: TransactionKind, reliable: bool) -> Self {
        Self {
            id,
            kind,
            state: Arc::new(AtomicTransactionState::new(kind.initial_state())),
            reliable,
        }
    }

    /// Transaction id
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Machine kind
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    /// Cell the handles read the state from
    pub fn state_cell(&self) -> Arc<AtomicTransactionState> {
        self.state.clone()
    }

    /// Whether the transport retransmits on its own
    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    pub(crate) fn transition(&self, new_state: TransactionState) -> Result<()> {
        let current = self.state.get();
        AtomicTransactionState::validate_transition(self.kind, current, new_state)
            .map_err(Error::InvalidStateTransition)?;
        self.state.set(new_state);
        if current != new_state {
            trace!(id = %self.id, from = %current, to = %new_state, "transaction state change");
        }
        Ok(())
    }

    /// Moves to `Terminated` and returns the action that removes the
    /// transaction from the layer
    pub(crate) fn terminate(&self) -> Action {
        self.state.set(TransactionState::Terminated);
        Action::Terminate
    }

    pub(crate) fn sequencing_violation(&self) -> Error {
        Error::SequencingViolation {
            kind: self.kind,
            id: self.id,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use sipwire_sip_core::prelude::*;

    use super::Action;
    use crate::timer::TimerType;

    pub fn request(method: Method) -> Request {
        let cseq = CSeq::new(1, method.clone());
        Request::new(method, "sip:bob@example.com".parse().unwrap())
            .with_header(HeaderName::VIA, "SIP/2.0/UDP client.example.com:5060;branch=z9hG4bKtest1")
            .with_header(HeaderName::MAX_FORWARDS, "70")
            .with_header(HeaderName::TO, "<sip:bob@example.com>")
            .with_header(HeaderName::FROM, "<sip:alice@example.com>;tag=from1")
            .with_header(HeaderName::CALL_ID, "call-1@example.com")
            .with_header(HeaderName::CSEQ, cseq.to_string())
            .with_header(HeaderName::CONTENT_LENGTH, "0")
    }

    pub fn response(status: u16, request: &Request) -> Response {
        Response::from_request(StatusCode::from_u16(status).unwrap(), request)
    }

    pub fn started_timers(actions: &[Action]) -> Vec<TimerType> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::StartTimer(timer, _) => Some(*timer),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled_timers(actions: &[Action]) -> Vec<TimerType> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::CancelTimer(timer) => Some(*timer),
                _ => None,
            })
            .collect()
    }

    pub fn sent_requests(actions: &[Action]) -> Vec<&Request> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::SendRequest(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn sent_responses(actions: &[Action]) -> Vec<&Response> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::SendResponse(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    pub fn delivered(actions: &[Action]) -> Vec<&Response> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::DeliverResponse(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    pub fn terminates(actions: &[Action]) -> bool {
        actions.iter().any(|action| matches!(action, Action::Terminate))
    }
}
