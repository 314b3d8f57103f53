//! Client transactions, RFC 3261 section 17.1
//!
//! A client transaction owns the request it sends, retransmits it over an
//! unreliable transport until a response arrives, and reports every
//! response to the TU. Timing out yields a synthesized 408.

use std::time::Duration;

use sipwire_sip_core::{Request, Response};
use tracing::debug;

use crate::builders::{ack_for_failure, timeout_response};
use crate::error::Result;
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{Action, Machine, TransactionId, TransactionKind, TransactionState};

/// Non-INVITE client transaction, RFC 3261 section 17.1.2
///
/// `Trying -> Proceeding -> Completed -> Terminated`. Timer E retransmits
/// the request, doubling from T1 up to T2 while `Trying` and fixed at T2
/// once `Proceeding`; timer F abandons the transaction after 64*T1.
#[derive(Debug)]
pub struct NonInviteClient {
    machine: Machine,
    request: Request,
    timers: TimerSettings,
    interval_e: Duration,
}

impl NonInviteClient {
    /// Creates the machine for `request`, which already carries its Via
    pub fn new(id: TransactionId, request: Request, timers: TimerSettings, reliable: bool) -> Self {
        Self {
            machine: Machine::new(id, TransactionKind::NonInviteClient, reliable),
            request,
            timers,
            interval_e: timers.t1,
        }
    }

    /// Identity and state
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// The request this transaction sends
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Sends the request and arms timers E and F
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::SendRequest(self.request.clone())];
        if !self.machine.is_reliable() {
            actions.push(Action::StartTimer(TimerType::E, self.interval_e));
        }
        actions.push(Action::StartTimer(TimerType::F, self.timers.timer_f()));
        actions
    }

    /// A response matched to this transaction
    pub fn on_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self.machine.state() {
            TransactionState::Terminated => Err(self.machine.sequencing_violation()),
            TransactionState::Completed => {
                debug!(id = %self.machine.id(), status = %response.status, "absorbed response retransmission");
                Ok(Vec::new())
            }
            _ if response.status.is_provisional() => {
                self.machine.transition(TransactionState::Proceeding)?;
                Ok(vec![Action::DeliverResponse(response)])
            }
            _ => {
                self.machine.transition(TransactionState::Completed)?;
                let mut actions = vec![
                    Action::CancelTimer(TimerType::E),
                    Action::CancelTimer(TimerType::F),
                    Action::DeliverResponse(response),
                ];
                if self.machine.is_reliable() {
                    actions.push(self.machine.terminate());
                } else {
                    actions.push(Action::StartTimer(TimerType::K, self.timers.timer_k()));
                }
                Ok(actions)
            }
        }
    }

    /// A timer armed by this transaction fired
    pub fn on_timer(&mut self, timer: TimerType) -> Result<Vec<Action>> {
        let state = self.machine.state();
        let actions = match (timer, state) {
            (TimerType::E, TransactionState::Trying | TransactionState::Proceeding) => {
                self.interval_e = if state == TransactionState::Proceeding {
                    self.timers.t2
                } else {
                    self.timers.capped_backoff(self.interval_e)
                };
                vec![
                    Action::SendRequest(self.request.clone()),
                    Action::StartTimer(TimerType::E, self.interval_e),
                ]
            }
            (TimerType::F, TransactionState::Trying | TransactionState::Proceeding) => {
                debug!(id = %self.machine.id(), method = %self.request.method, "timer F fired, giving up");
                vec![
                    Action::CancelTimer(TimerType::E),
                    Action::DeliverResponse(timeout_response(&self.request)),
                    self.machine.terminate(),
                ]
            }
            (TimerType::K, TransactionState::Completed) => vec![self.machine.terminate()],
            _ => Vec::new(),
        };
        Ok(actions)
    }
}

/// INVITE client transaction, RFC 3261 section 17.1.1
///
/// `Calling -> Proceeding -> Completed -> Terminated`. Timer A retransmits
/// the INVITE, doubling from T1, until any response arrives; timer B
/// abandons it after 64*T1. A failure response is acknowledged here; the
/// ACK for a 2xx belongs to the TU.
#[derive(Debug)]
pub struct InviteClient {
    machine: Machine,
    request: Request,
    timers: TimerSettings,
    interval_a: Duration,
    ack: Option<Request>,
}

impl InviteClient {
    /// Creates the machine for `invite`, which already carries its Via
    pub fn new(id: TransactionId, invite: Request, timers: TimerSettings, reliable: bool) -> Self {
        Self {
            machine: Machine::new(id, TransactionKind::InviteClient, reliable),
            request: invite,
            timers,
            interval_a: timers.t1,
            ack: None,
        }
    }

    /// Identity and state
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// The INVITE this transaction sends
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Sends the INVITE and arms timers A and B
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::SendRequest(self.request.clone())];
        if !self.machine.is_reliable() {
            actions.push(Action::StartTimer(TimerType::A, self.interval_a));
        }
        actions.push(Action::StartTimer(TimerType::B, self.timers.timer_b()));
        actions
    }

    /// A response matched to this transaction
    pub fn on_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self.machine.state() {
            TransactionState::Terminated => Err(self.machine.sequencing_violation()),
            TransactionState::Completed => {
                // Retransmitted failure response: the ACK got lost.
                match &self.ack {
                    Some(ack) if response.status.as_u16() >= 300 => {
                        Ok(vec![Action::SendRequest(ack.clone())])
                    }
                    _ => Ok(Vec::new()),
                }
            }
            _ => {
                let mut actions = vec![
                    Action::CancelTimer(TimerType::A),
                    Action::CancelTimer(TimerType::B),
                ];
                if response.status.is_provisional() {
                    self.machine.transition(TransactionState::Proceeding)?;
                    actions.push(Action::DeliverResponse(response));
                } else if response.status.is_success() {
                    actions.push(Action::DeliverResponse(response));
                    actions.push(self.machine.terminate());
                } else {
                    let ack = ack_for_failure(&self.request, &response)?;
                    self.machine.transition(TransactionState::Completed)?;
                    actions.push(Action::SendRequest(ack.clone()));
                    self.ack = Some(ack);
                    actions.push(Action::DeliverResponse(response));
                    if self.machine.is_reliable() {
                        actions.push(self.machine.terminate());
                    } else {
                        actions.push(Action::StartTimer(TimerType::D, self.timers.timer_d));
                    }
                }
                Ok(actions)
            }
        }
    }

    /// A timer armed by this transaction fired
    pub fn on_timer(&mut self, timer: TimerType) -> Result<Vec<Action>> {
        let actions = match (timer, self.machine.state()) {
            (TimerType::A, TransactionState::Calling) => {
                self.interval_a = TimerSettings::doubled(self.interval_a);
                vec![
                    Action::SendRequest(self.request.clone()),
                    Action::StartTimer(TimerType::A, self.interval_a),
                ]
            }
            (TimerType::B, TransactionState::Calling) => {
                debug!(id = %self.machine.id(), "timer B fired, giving up");
                vec![
                    Action::CancelTimer(TimerType::A),
                    Action::DeliverResponse(timeout_response(&self.request)),
                    self.machine.terminate(),
                ]
            }
            (TimerType::D, TransactionState::Completed) => vec![self.machine.terminate()],
            _ => Vec::new(),
        };
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use sipwire_sip_core::prelude::*;

    use super::*;
    use crate::error::Error;
    use crate::transaction::test_support::*;

    fn non_invite(reliable: bool) -> NonInviteClient {
        NonInviteClient::new(
            TransactionId::new(),
            request(Method::Register),
            TimerSettings::default(),
            reliable,
        )
    }

    fn invite(reliable: bool) -> InviteClient {
        InviteClient::new(
            TransactionId::new(),
            request(Method::Invite),
            TimerSettings::default(),
            reliable,
        )
    }

    #[test]
    fn test_non_invite_start_arms_e_and_f() {
        let mut tx = non_invite(false);
        let actions = tx.start();
        assert_eq!(sent_requests(&actions).len(), 1);
        assert_eq!(started_timers(&actions), vec![TimerType::E, TimerType::F]);
        assert_eq!(tx.machine().state(), TransactionState::Trying);
    }

    #[test]
    fn test_non_invite_reliable_skips_retransmission() {
        let mut tx = non_invite(true);
        assert_eq!(started_timers(&tx.start()), vec![TimerType::F]);
    }

    #[test]
    fn test_timer_e_backoff() {
        let mut tx = non_invite(false);
        tx.start();
        let mut intervals = Vec::new();
        for _ in 0..5 {
            let actions = tx.on_timer(TimerType::E).unwrap();
            assert_eq!(sent_requests(&actions).len(), 1);
            for action in &actions {
                if let Action::StartTimer(TimerType::E, interval) = action {
                    intervals.push(interval.as_millis());
                }
            }
        }
        assert_eq!(intervals, vec![1000, 2000, 4000, 4000, 4000]);
    }

    #[test]
    fn test_timer_e_fixed_at_t2_when_proceeding() {
        let mut tx = non_invite(false);
        let register = tx.request().clone();
        tx.start();
        tx.on_response(response(100, &register)).unwrap();
        let actions = tx.on_timer(TimerType::E).unwrap();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartTimer(TimerType::E, d) if *d == Duration::from_secs(4))));
    }

    #[test]
    fn test_non_invite_provisional_then_final() {
        let mut tx = non_invite(false);
        let register = tx.request().clone();
        tx.start();

        let actions = tx.on_response(response(100, &register)).unwrap();
        assert_eq!(delivered(&actions).len(), 1);
        assert_eq!(tx.machine().state(), TransactionState::Proceeding);

        let actions = tx.on_response(response(200, &register)).unwrap();
        assert_eq!(delivered(&actions).len(), 1);
        assert_eq!(cancelled_timers(&actions), vec![TimerType::E, TimerType::F]);
        assert_eq!(started_timers(&actions), vec![TimerType::K]);
        assert!(!terminates(&actions));
        assert_eq!(tx.machine().state(), TransactionState::Completed);

        // Retransmitted final responses are absorbed.
        assert!(tx.on_response(response(200, &register)).unwrap().is_empty());

        let actions = tx.on_timer(TimerType::K).unwrap();
        assert!(terminates(&actions));
        assert_eq!(tx.machine().state(), TransactionState::Terminated);
    }

    #[test]
    fn test_non_invite_reliable_final_terminates() {
        let mut tx = non_invite(true);
        let register = tx.request().clone();
        tx.start();
        let actions = tx.on_response(response(200, &register)).unwrap();
        assert_eq!(delivered(&actions).len(), 1);
        assert!(terminates(&actions));
    }

    #[test]
    fn test_timer_f_synthesizes_408() {
        let mut tx = non_invite(false);
        tx.start();
        let actions = tx.on_timer(TimerType::F).unwrap();
        let responses = delivered(&actions);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, StatusCode::REQUEST_TIMEOUT);
        assert!(terminates(&actions));
    }

    #[test]
    fn test_terminated_non_invite_rejects_responses() {
        let mut tx = non_invite(true);
        let register = tx.request().clone();
        tx.start();
        tx.on_response(response(200, &register)).unwrap();
        let result = tx.on_response(response(200, &register));
        assert!(matches!(result, Err(Error::SequencingViolation { .. })));
    }

    #[test]
    fn test_stale_timer_is_noop() {
        let mut tx = non_invite(false);
        let register = tx.request().clone();
        tx.start();
        tx.on_response(response(200, &register)).unwrap();
        assert!(tx.on_timer(TimerType::E).unwrap().is_empty());
        assert!(tx.on_timer(TimerType::F).unwrap().is_empty());
    }

    #[test]
    fn test_timer_a_doubles_without_cap() {
        let mut tx = invite(false);
        let actions = tx.start();
        assert_eq!(started_timers(&actions), vec![TimerType::A, TimerType::B]);
        let mut intervals = Vec::new();
        for _ in 0..5 {
            for action in tx.on_timer(TimerType::A).unwrap() {
                if let Action::StartTimer(TimerType::A, interval) = action {
                    intervals.push(interval.as_millis());
                }
            }
        }
        assert_eq!(intervals, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_invite_provisional_then_success_sends_no_ack() {
        let mut tx = invite(false);
        let request = tx.request().clone();
        tx.start();

        let actions = tx.on_response(response(180, &request)).unwrap();
        assert_eq!(tx.machine().state(), TransactionState::Proceeding);
        assert_eq!(cancelled_timers(&actions), vec![TimerType::A, TimerType::B]);

        let actions = tx.on_response(response(200, &request)).unwrap();
        assert!(sent_requests(&actions).is_empty());
        assert_eq!(delivered(&actions).len(), 1);
        assert!(terminates(&actions));
    }

    #[test]
    fn test_invite_failure_is_acknowledged() {
        let mut tx = invite(false);
        let request = tx.request().clone();
        tx.start();

        let actions = tx.on_response(response(486, &request)).unwrap();
        let acks = sent_requests(&actions);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].method, Method::Ack);
        assert_eq!(started_timers(&actions), vec![TimerType::D]);
        assert_eq!(tx.machine().state(), TransactionState::Completed);

        // A retransmitted 486 gets the same ACK again and no TU delivery.
        let actions = tx.on_response(response(486, &request)).unwrap();
        assert_eq!(sent_requests(&actions).len(), 1);
        assert!(delivered(&actions).is_empty());

        assert!(terminates(&tx.on_timer(TimerType::D).unwrap()));
    }

    #[test]
    fn test_invite_failure_reliable_terminates() {
        let mut tx = invite(true);
        let request = tx.request().clone();
        tx.start();
        let actions = tx.on_response(response(603, &request)).unwrap();
        assert_eq!(sent_requests(&actions).len(), 1);
        assert!(terminates(&actions));
    }

    #[test]
    fn test_timer_b_only_fires_while_calling() {
        let mut tx = invite(false);
        let request = tx.request().clone();
        tx.start();
        tx.on_response(response(100, &request)).unwrap();
        assert!(tx.on_timer(TimerType::B).unwrap().is_empty());

        let mut tx = invite(false);
        tx.start();
        let actions = tx.on_timer(TimerType::B).unwrap();
        assert_eq!(delivered(&actions)[0].status, StatusCode::REQUEST_TIMEOUT);
        assert!(terminates(&actions));
    }
}
