//! RFC 3261 transaction timers
//!
//! Timer durations derive from three constants: T1 (round-trip estimate),
//! T2 (maximum retransmit interval) and T4 (time for the network to clear
//! messages). A running timer is a spawned task that sleeps and then posts a
//! firing event back to the transaction layer; the layer owns a
//! [`TimerSet`] per transaction, so cancelling aborts the task and a firing
//! whose token no longer matches the armed timer is ignored.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

use tokio::task::JoinHandle;

/// The RFC 3261 transaction timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerType {
    /// INVITE client request retransmission
    A,
    /// INVITE client transaction timeout
    B,
    /// INVITE client wait for response retransmissions
    D,
    /// Non-INVITE client request retransmission
    E,
    /// Non-INVITE client transaction timeout
    F,
    /// INVITE server final response retransmission
    G,
    /// INVITE server wait for ACK
    H,
    /// INVITE server wait for ACK retransmissions
    I,
    /// Non-INVITE server wait for request retransmissions
    J,
    /// Non-INVITE client wait for response retransmissions
    K,
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerType::A => "A",
            TimerType::B => "B",
            TimerType::D => "D",
            TimerType::E => "E",
            TimerType::F => "F",
            TimerType::G => "G",
            TimerType::H => "H",
            TimerType::I => "I",
            TimerType::J => "J",
            TimerType::K => "K",
        };
        f.write_str(name)
    }
}

/// Timer durations used by every transaction of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    /// Round-trip time estimate
    pub t1: Duration,
    /// Maximum retransmission interval for non-INVITE requests and INVITE
    /// responses
    pub t2: Duration,
    /// Maximum time a message stays in the network
    pub t4: Duration,
    /// Wait for INVITE response retransmissions after a failure response
    pub timer_d: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            timer_d: Duration::from_secs(32),
        }
    }
}

impl TimerSettings {
    /// Rejects a zero T1 and a T1 above T2
    pub fn validate(&self) -> Result<()> {
        if self.t1.is_zero() {
            return Err(Error::InvalidTimers("T1 must be positive".to_string()));
        }
        if self.t1 > self.t2 {
            return Err(Error::InvalidTimers(format!(
                "T1 ({:?}) exceeds T2 ({:?})",
                self.t1, self.t2
            )));
        }
        Ok(())
    }

    /// 64*T1, the overall transaction lifetime bound
    pub fn transaction_timeout(&self) -> Duration {
        self.t1.saturating_mul(64)
    }

    /// INVITE client timeout
    pub fn timer_b(&self) -> Duration {
        self.transaction_timeout()
    }

    /// Non-INVITE client timeout
    pub fn timer_f(&self) -> Duration {
        self.transaction_timeout()
    }

    /// INVITE server wait for ACK
    pub fn timer_h(&self) -> Duration {
        self.transaction_timeout()
    }

    /// INVITE server lingering after ACK
    pub fn timer_i(&self) -> Duration {
        self.t4
    }

    /// Non-INVITE server lingering after a final response
    pub fn timer_j(&self) -> Duration {
        self.transaction_timeout()
    }

    /// Non-INVITE client lingering after a final response
    pub fn timer_k(&self) -> Duration {
        self.t4
    }

    /// Next interval of a T2-capped exponential backoff
    pub fn capped_backoff(&self, current: Duration) -> Duration {
        Self::doubled(current).min(self.t2)
    }

    /// Next interval of an uncapped exponential backoff
    pub fn doubled(current: Duration) -> Duration {
        current.saturating_mul(2)
    }
}

/// A spawned timer task together with the token it reports when it fires
#[derive(Debug)]
pub struct TimerHandle {
    token: u64,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Wraps a spawned timer task
    pub fn new(token: u64, task: JoinHandle<()>) -> Self {
        Self { token, task }
    }

    /// Token the task reports on firing
    pub fn token(&self) -> u64 {
        self.token
    }

    fn cancel(self) {
        self.task.abort();
    }
}

/// The armed timers of one transaction, at most one per [`TimerType`]
#[derive(Debug, Default)]
pub struct TimerSet {
    armed: HashMap<TimerType, TimerHandle>,
}

impl TimerSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `timer`, cancelling any earlier instance of the same type
    pub fn arm(&mut self, timer: TimerType, handle: TimerHandle) {
        if let Some(previous) = self.armed.insert(timer, handle) {
            previous.cancel();
        }
    }

    /// Cancels `timer`. Cancelling a timer that is not armed does nothing.
    pub fn cancel(&mut self, timer: TimerType) {
        if let Some(handle) = self.armed.remove(&timer) {
            handle.cancel();
        }
    }

    /// Consumes a firing. Returns `false` for a firing from a timer that was
    /// cancelled or re-armed since it was spawned.
    pub fn fired(&mut self, timer: TimerType, token: u64) -> bool {
        match self.armed.get(&timer) {
            Some(handle) if handle.token() == token => {
                self.armed.remove(&timer);
                true
            }
            _ => false,
        }
    }

    /// Whether `timer` is armed
    pub fn is_armed(&self, timer: TimerType) -> bool {
        self.armed.contains_key(&timer)
    }

    /// Cancels everything
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.armed.drain() {
            handle.cancel();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_task() -> JoinHandle<()> {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
    }

    #[test]
    fn test_default_settings() {
        let settings = TimerSettings::default();
        assert_eq!(settings.timer_b(), Duration::from_secs(32));
        assert_eq!(settings.timer_f(), Duration::from_secs(32));
        assert_eq!(settings.timer_h(), Duration::from_secs(32));
        assert_eq!(settings.timer_j(), Duration::from_secs(32));
        assert_eq!(settings.timer_i(), Duration::from_secs(5));
        assert_eq!(settings.timer_k(), Duration::from_secs(5));
        assert_eq!(settings.timer_d, Duration::from_secs(32));
    }

    #[test]
    fn test_capped_backoff() {
        let settings = TimerSettings::default();
        let mut interval = settings.t1;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(interval.as_millis());
            interval = settings.capped_backoff(interval);
        }
        assert_eq!(seen, vec![500, 1000, 2000, 4000, 4000]);
    }

    #[test]
    fn test_validate() {
        assert!(TimerSettings::default().validate().is_ok());
        let stalled = TimerSettings {
            t1: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(stalled.validate(), Err(Error::InvalidTimers(_))));
        let inverted = TimerSettings {
            t1: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(matches!(inverted.validate(), Err(Error::InvalidTimers(_))));
    }

    #[test]
    fn test_huge_t1_saturates() {
        let settings = TimerSettings {
            t1: Duration::MAX,
            t2: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(settings.timer_b(), Duration::MAX);
        assert_eq!(TimerSettings::doubled(Duration::MAX), Duration::MAX);
        assert_eq!(settings.capped_backoff(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_timer_type_display() {
        assert_eq!(TimerType::A.to_string(), "A");
        assert_eq!(TimerType::K.to_string(), "K");
    }

    #[tokio::test]
    async fn test_stale_token_is_ignored() {
        let mut timers = TimerSet::new();
        timers.arm(TimerType::E, TimerHandle::new(1, idle_task()));
        timers.arm(TimerType::E, TimerHandle::new(2, idle_task()));

        assert!(!timers.fired(TimerType::E, 1));
        assert!(timers.is_armed(TimerType::E));
        assert!(timers.fired(TimerType::E, 2));
        assert!(!timers.is_armed(TimerType::E));
    }

    #[tokio::test]
    async fn test_cancel_twice_is_harmless() {
        let mut timers = TimerSet::new();
        timers.arm(TimerType::G, TimerHandle::new(7, idle_task()));
        timers.cancel(TimerType::G);
        timers.cancel(TimerType::G);
        assert!(!timers.fired(TimerType::G, 7));
    }
}
