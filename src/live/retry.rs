//! Bounded reconnect policy.

use std::time::Duration;

/// Default cap on consecutive failed or dropped connections.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default fixed delay between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Default liveness polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// How the manager reconnects after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Failures tolerated before the manager stops.
    pub max_attempts: u32,
    /// Fixed delay before each reconnect; there is no backoff.
    pub delay: Duration,
    /// Liveness polling interval while monitoring.
    pub poll_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            delay: RECONNECT_DELAY,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect after `delay`. `attempt` is 1-indexed.
    Retry { attempt: u32, delay: Duration },
    /// The cap was reached.
    GiveUp { attempts: u32 },
}

/// Attempts counter for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
    delay: Duration,
}

impl RetryState {
    /// Fresh counter for `policy`.
    pub fn new(policy: &ReconnectPolicy) -> Self {
        Self {
            attempts: 0,
            max_attempts: policy.max_attempts,
            delay: policy.delay,
        }
    }

    /// Failures recorded since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured cap.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the cap has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Reset after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Record a failed or dropped connection.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);
        if self.is_exhausted() {
            RetryDecision::GiveUp {
                attempts: self.attempts,
            }
        } else {
            RetryDecision::Retry {
                attempt: self.attempts,
                delay: self.delay,
            }
        }
    }
}
