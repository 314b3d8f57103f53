use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::transaction::TransactionKind;

/// State of a SIP transaction, per the state machines of RFC 3261 section 17
///
/// Which states a transaction passes through depends on its
/// [`TransactionKind`]:
///
/// - INVITE client: `Calling -> Proceeding -> Completed -> Terminated`
/// - non-INVITE client: `Trying -> Proceeding -> Completed -> Terminated`
/// - INVITE server: `Proceeding -> Completed -> Confirmed -> Terminated`
/// - non-INVITE server: `Trying -> Proceeding -> Completed -> Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// INVITE client: request sent, nothing heard back
    Calling,
    /// Non-INVITE: request sent (client) or received (server), no
    /// provisional response yet
    Trying,
    /// A provisional response was received (client) or sent (server)
    Proceeding,
    /// A final response was received (client) or sent (server); the
    /// transaction lingers to absorb retransmissions
    Completed,
    /// INVITE server only: the ACK for a failure response arrived
    Confirmed,
    /// Final state. The transaction is out of the layer's tables.
    Terminated,
}

impl TransactionState {
    /// Checks if the transaction state is `Terminated`.
    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }

    /// Lower-case state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Calling => "calling",
            TransactionState::Trying => "trying",
            TransactionState::Proceeding => "proceeding",
            TransactionState::Completed => "completed",
            TransactionState::Confirmed => "confirmed",
            TransactionState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric representation of transaction states for atomic operations
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StateValue {
    Calling = 0,
    Trying = 1,
    Proceeding = 2,
    Completed = 3,
    Confirmed = 4,
    Terminated = 5,
}

impl From<TransactionState> for StateValue {
    fn from(state: TransactionState) -> Self {
        match state {
            TransactionState::Calling => StateValue::Calling,
            TransactionState::Trying => StateValue::Trying,
            TransactionState::Proceeding => StateValue::Proceeding,
            TransactionState::Completed => StateValue::Completed,
            TransactionState::Confirmed => StateValue::Confirmed,
            TransactionState::Terminated => StateValue::Terminated,
        }
    }
}

impl From<StateValue> for TransactionState {
    fn from(value: StateValue) -> Self {
        match value {
            StateValue::Calling => TransactionState::Calling,
            StateValue::Trying => TransactionState::Trying,
            StateValue::Proceeding => TransactionState::Proceeding,
            StateValue::Completed => TransactionState::Completed,
            StateValue::Confirmed => TransactionState::Confirmed,
            StateValue::Terminated => TransactionState::Terminated,
        }
    }
}

impl From<u8> for StateValue {
    fn from(value: u8) -> Self {
        match value {
            0 => StateValue::Calling,
            1 => StateValue::Trying,
            2 => StateValue::Proceeding,
            3 => StateValue::Completed,
            4 => StateValue::Confirmed,
            _ => StateValue::Terminated,
        }
    }
}

/// A `TransactionState` that can be read from any task
///
/// The transaction layer is the only writer; transaction handles held by
/// the TU read through the same cell to observe the live state.
#[derive(Debug)]
pub struct AtomicTransactionState {
    value: AtomicU8,
}

impl AtomicTransactionState {
    /// Creates a new `AtomicTransactionState` initialized to the given `state`.
    pub fn new(state: TransactionState) -> Self {
        Self {
            value: AtomicU8::new(StateValue::from(state) as u8),
        }
    }

    /// Current state
    pub fn get(&self) -> TransactionState {
        let value = self.value.load(Ordering::Acquire);
        TransactionState::from(StateValue::from(value))
    }

    /// Stores `new_state` and returns the previous state.
    pub fn set(&self, new_state: TransactionState) -> TransactionState {
        let prev_value = self
            .value
            .swap(StateValue::from(new_state) as u8, Ordering::AcqRel);
        TransactionState::from(StateValue::from(prev_value))
    }

    /// Moves from `current_state` to `new_state` if the cell still holds
    /// `current_state`. A transition to `Terminated` always succeeds, as does
    /// one to the state already held.
    pub fn transition_if(&self, current_state: TransactionState, new_state: TransactionState) -> bool {
        let current_value = StateValue::from(current_state) as u8;
        let new_value = StateValue::from(new_state) as u8;

        match self.value.compare_exchange(
            current_value,
            new_value,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(actual) if actual == new_value => true,
            Err(_) if new_state == TransactionState::Terminated => {
                self.value.store(new_value, Ordering::Release);
                true
            }
            Err(_) => false,
        }
    }

    /// Checks a transition against the state machine of `kind`.
    pub fn validate_transition(
        kind: TransactionKind,
        current_state: TransactionState,
        new_state: TransactionState,
    ) -> std::result::Result<(), String> {
        use TransactionState::*;

        if current_state == Terminated {
            return Err(format!("{kind:?} cannot leave the terminated state"));
        }
        if current_state == new_state || new_state == Terminated {
            return Ok(());
        }

        let allowed = match kind {
            TransactionKind::InviteClient => matches!(
                (current_state, new_state),
                (Calling, Proceeding) | (Calling, Completed) | (Proceeding, Completed)
            ),
            TransactionKind::NonInviteClient | TransactionKind::NonInviteServer => matches!(
                (current_state, new_state),
                (Trying, Proceeding) | (Trying, Completed) | (Proceeding, Completed)
            ),
            TransactionKind::InviteServer => matches!(
                (current_state, new_state),
                (Proceeding, Completed) | (Completed, Confirmed)
            ),
        };

        if allowed {
            Ok(())
        } else {
            Err(format!(
                "{kind:?} cannot move from {current_state} to {new_state}"
            ))
        }
    }
}
