//! Server transactions, RFC 3261 section 17.2
//!
//! A server transaction remembers the last response the TU sent through it
//! and answers retransmitted requests with that response, so the TU sees
//! each request once.

use std::time::Duration;

use sipwire_sip_core::{Method, Request, Response};
use tracing::debug;

use crate::error::{Error, Result};
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{Action, Machine, TransactionId, TransactionKind, TransactionState};

/// Non-INVITE server transaction, RFC 3261 section 17.2.2
///
/// `Trying -> Proceeding -> Completed -> Terminated`. After the final
/// response the transaction lingers for timer J (64*T1) on an unreliable
/// transport.
#[derive(Debug)]
pub struct NonInviteServer {
    machine: Machine,
    timers: TimerSettings,
    last_response: Option<Response>,
}

impl NonInviteServer {
    /// Creates the machine in `Trying`
    pub fn new(id: TransactionId, timers: TimerSettings, reliable: bool) -> Self {
        Self {
            machine: Machine::new(id, TransactionKind::NonInviteServer, reliable),
            timers,
            last_response: None,
        }
    }

    /// Identity and state
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Last response sent through this transaction
    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    /// A retransmission of the request that created this transaction
    pub fn on_request(&mut self, _request: Request) -> Result<Vec<Action>> {
        match self.machine.state() {
            TransactionState::Terminated => Err(self.machine.sequencing_violation()),
            TransactionState::Trying => Ok(Vec::new()),
            _ => Ok(self
                .last_response
                .iter()
                .cloned()
                .map(Action::SendResponse)
                .collect()),
        }
    }

    /// A response from the TU
    pub fn on_tu_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self.machine.state() {
            TransactionState::Terminated => Err(self.machine.sequencing_violation()),
            TransactionState::Completed => Err(Error::InvalidStateTransition(format!(
                "transaction {} already sent its final response",
                self.machine.id()
            ))),
            _ => {
                let provisional = response.status.is_provisional();
                self.last_response = Some(response.clone());
                let mut actions = vec![Action::SendResponse(response)];
                if provisional {
                    self.machine.transition(TransactionState::Proceeding)?;
                } else if self.machine.is_reliable() {
                    actions.push(self.machine.terminate());
                } else {
                    self.machine.transition(TransactionState::Completed)?;
                    actions.push(Action::StartTimer(TimerType::J, self.timers.timer_j()));
                }
                Ok(actions)
            }
        }
    }

    /// A timer armed by this transaction fired
    pub fn on_timer(&mut self, timer: TimerType) -> Result<Vec<Action>> {
        match (timer, self.machine.state()) {
            (TimerType::J, TransactionState::Completed) => Ok(vec![self.machine.terminate()]),
            _ => Ok(Vec::new()),
        }
    }
}

/// INVITE server transaction, RFC 3261 section 17.2.1
///
/// `Proceeding -> Completed -> Confirmed -> Terminated`. A 2xx ends the
/// transaction at once. A failure response is retransmitted on timer G
/// until the ACK arrives or timer H gives up; after the ACK, timer I keeps
/// the transaction around to absorb ACK retransmissions.
#[derive(Debug)]
pub struct InviteServer {
    machine: Machine,
    timers: TimerSettings,
    last_response: Option<Response>,
    interval_g: Duration,
}

impl InviteServer {
    /// Creates the machine in `Proceeding`
    pub fn new(id: TransactionId, timers: TimerSettings, reliable: bool) -> Self {
        Self {
            machine: Machine::new(id, TransactionKind::InviteServer, reliable),
            timers,
            last_response: None,
            interval_g: timers.t1,
        }
    }

    /// Identity and state
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Last response sent through this transaction
    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    /// A request matched to this transaction: an INVITE retransmission, the
    /// ACK for a failure response, or a CANCEL sharing the branch
    pub fn on_request(&mut self, request: Request) -> Result<Vec<Action>> {
        match self.machine.state() {
            TransactionState::Terminated => Err(self.machine.sequencing_violation()),
            TransactionState::Confirmed => Ok(Vec::new()),
            TransactionState::Completed if request.method == Method::Ack => {
                self.machine.transition(TransactionState::Confirmed)?;
                let mut actions = vec![
                    Action::CancelTimer(TimerType::G),
                    Action::CancelTimer(TimerType::H),
                ];
                if self.machine.is_reliable() {
                    actions.push(self.machine.terminate());
                } else {
                    actions.push(Action::StartTimer(TimerType::I, self.timers.timer_i()));
                }
                Ok(actions)
            }
            _ if request.method == Method::Ack => {
                debug!(id = %self.machine.id(), "ACK before a final response, ignored");
                Ok(Vec::new())
            }
            _ => Ok(self
                .last_response
                .iter()
                .cloned()
                .map(Action::SendResponse)
                .collect()),
        }
    }

    /// A response from the TU
    pub fn on_tu_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self.machine.state() {
            TransactionState::Terminated => Err(self.machine.sequencing_violation()),
            TransactionState::Proceeding => {
                let status = response.status;
                self.last_response = Some(response.clone());
                let mut actions = vec![Action::SendResponse(response)];
                if status.is_success() {
                    actions.push(self.machine.terminate());
                } else if status.as_u16() >= 300 {
                    self.machine.transition(TransactionState::Completed)?;
                    if !self.machine.is_reliable() {
                        actions.push(Action::StartTimer(TimerType::G, self.interval_g));
                    }
                    actions.push(Action::StartTimer(TimerType::H, self.timers.timer_h()));
                }
                Ok(actions)
            }
            state => Err(Error::InvalidStateTransition(format!(
                "transaction {} cannot send a response while {state}",
                self.machine.id()
            ))),
        }
    }

    /// A timer armed by this transaction fired
    pub fn on_timer(&mut self, timer: TimerType) -> Result<Vec<Action>> {
        let actions = match (timer, self.machine.state()) {
            (TimerType::G, TransactionState::Completed) => {
                self.interval_g = self.timers.capped_backoff(self.interval_g);
                let mut actions: Vec<Action> = self
                    .last_response
                    .iter()
                    .cloned()
                    .map(Action::SendResponse)
                    .collect();
                actions.push(Action::StartTimer(TimerType::G, self.interval_g));
                actions
            }
            (TimerType::H, TransactionState::Completed) => {
                debug!(id = %self.machine.id(), "timer H fired without an ACK");
                vec![Action::CancelTimer(TimerType::G), self.machine.terminate()]
            }
            (TimerType::I, TransactionState::Confirmed) => vec![self.machine.terminate()],
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

    fn non_invite(reliable: bool) -> NonInviteServer {
        NonInviteServer::new(TransactionId::new(), TimerSettings::default(), reliable)
    }

    fn invite(reliable: bool) -> InviteServer {
        InviteServer::new(TransactionId::new(), TimerSettings::default(), reliable)
    }

    fn ack() -> Request {
        let mut ack = request(Method::Ack);
        ack.headers.set(HeaderName::CSEQ, "1 ACK");
        ack
    }

    #[test]
    fn test_non_invite_duplicate_while_trying_is_ignored() {
        let mut tx = non_invite(false);
        let actions = tx.on_request(request(Method::Register)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(tx.machine().state(), TransactionState::Trying);
    }

    #[test]
    fn test_non_invite_provisional_then_final() {
        let mut tx = non_invite(false);
        let register = request(Method::Register);

        let actions = tx.on_tu_response(response(100, &register)).unwrap();
        assert_eq!(sent_responses(&actions).len(), 1);
        assert_eq!(tx.machine().state(), TransactionState::Proceeding);

        // Duplicate while proceeding resends the 100.
        let actions = tx.on_request(register.clone()).unwrap();
        assert_eq!(sent_responses(&actions)[0].status, StatusCode::TRYING);

        let actions = tx.on_tu_response(response(200, &register)).unwrap();
        assert_eq!(started_timers(&actions), vec![TimerType::J]);
        assert_eq!(tx.machine().state(), TransactionState::Completed);
    }

    #[test]
    fn test_non_invite_completed_resends_identical_response() {
        let mut tx = non_invite(false);
        let register = request(Method::Register);
        let ok = response(200, &register).with_header(HeaderName::CONTACT, "<sip:alice@10.0.0.1>");
        tx.on_tu_response(ok.clone()).unwrap();

        for _ in 0..3 {
            let actions = tx.on_request(register.clone()).unwrap();
            let sent = sent_responses(&actions);
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].to_bytes(), ok.to_bytes());
            assert_eq!(tx.machine().state(), TransactionState::Completed);
        }

        assert!(terminates(&tx.on_timer(TimerType::J).unwrap()));
        assert!(matches!(
            tx.on_request(register),
            Err(Error::SequencingViolation { .. })
        ));
    }

    #[test]
    fn test_non_invite_reliable_final_terminates() {
        let mut tx = non_invite(true);
        let register = request(Method::Register);
        let actions = tx.on_tu_response(response(404, &register)).unwrap();
        assert!(terminates(&actions));
        assert!(started_timers(&actions).is_empty());
    }

    #[test]
    fn test_non_invite_second_final_is_rejected() {
        let mut tx = non_invite(false);
        let register = request(Method::Register);
        tx.on_tu_response(response(200, &register)).unwrap();
        assert!(matches!(
            tx.on_tu_response(response(500, &register)),
            Err(Error::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn test_invite_success_terminates() {
        let mut tx = invite(false);
        let request = request(Method::Invite);
        tx.on_tu_response(response(100, &request)).unwrap();
        assert_eq!(tx.machine().state(), TransactionState::Proceeding);
        let actions = tx.on_tu_response(response(200, &request)).unwrap();
        assert_eq!(sent_responses(&actions).len(), 1);
        assert!(terminates(&actions));
    }

    #[test]
    fn test_invite_failure_retransmits_until_ack() {
        let mut tx = invite(false);
        let request = request(Method::Invite);
        let actions = tx.on_tu_response(response(486, &request)).unwrap();
        assert_eq!(started_timers(&actions), vec![TimerType::G, TimerType::H]);
        assert_eq!(tx.machine().state(), TransactionState::Completed);

        let mut intervals = Vec::new();
        for _ in 0..4 {
            let actions = tx.on_timer(TimerType::G).unwrap();
            assert_eq!(sent_responses(&actions)[0].status, StatusCode::BUSY_HERE);
            for action in actions {
                if let Action::StartTimer(TimerType::G, interval) = action {
                    intervals.push(interval.as_millis());
                }
            }
        }
        assert_eq!(intervals, vec![1000, 2000, 4000, 4000]);

        // INVITE retransmission gets the failure response again.
        let actions = tx.on_request(request.clone()).unwrap();
        assert_eq!(sent_responses(&actions)[0].status, StatusCode::BUSY_HERE);

        let actions = tx.on_request(ack()).unwrap();
        assert_eq!(cancelled_timers(&actions), vec![TimerType::G, TimerType::H]);
        assert_eq!(started_timers(&actions), vec![TimerType::I]);
        assert_eq!(tx.machine().state(), TransactionState::Confirmed);

        // Confirmed absorbs everything.
        assert!(tx.on_request(ack()).unwrap().is_empty());
        assert!(tx.on_request(request).unwrap().is_empty());

        assert!(terminates(&tx.on_timer(TimerType::I).unwrap()));
    }

    #[test]
    fn test_invite_timer_h_gives_up() {
        let mut tx = invite(false);
        let request = request(Method::Invite);
        tx.on_tu_response(response(500, &request)).unwrap();
        let actions = tx.on_timer(TimerType::H).unwrap();
        assert_eq!(cancelled_timers(&actions), vec![TimerType::G]);
        assert!(terminates(&actions));
        assert!(tx.on_timer(TimerType::G).unwrap().is_empty());
    }

    #[test]
    fn test_invite_reliable_failure_skips_timer_g() {
        let mut tx = invite(true);
        let request = request(Method::Invite);
        let actions = tx.on_tu_response(response(486, &request)).unwrap();
        assert_eq!(started_timers(&actions), vec![TimerType::H]);
        let actions = tx.on_request(ack()).unwrap();
        assert!(terminates(&actions));
    }

    #[test]
    fn test_invite_ack_while_proceeding_is_ignored() {
        let mut tx = invite(false);
        assert!(tx.on_request(ack()).unwrap().is_empty());
        assert_eq!(tx.machine().state(), TransactionState::Proceeding);
    }
}
