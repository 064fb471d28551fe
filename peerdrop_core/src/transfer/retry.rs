use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL};

/// How the sender repeats its file name until the receiver acknowledges it.
///
/// With neither `max_attempts` nor `deadline` set the handshake retries forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            deadline: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Running retransmission timer for one handshake.
///
/// The first attempt is due immediately, then one per interval. The timer is
/// stopped by [`Retransmit::cancel`], which consumes it.
#[derive(Debug)]
pub struct Retransmit {
    interval: Interval,
    deadline: Option<Instant>,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl Retransmit {
    pub fn start(policy: &RetryPolicy) -> Self {
        let mut interval = tokio::time::interval(policy.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            interval,
            deadline: policy.deadline.map(|d| Instant::now() + d),
            max_attempts: policy.max_attempts,
            attempts: 0,
        }
    }

    /// Wait until the next attempt is due and return its 1-based number.
    ///
    /// Once the attempts are used up, the tick after the last one returns
    /// `Err(attempts)`. Passing the deadline returns `Err` right away.
    /// Cancellation-safe.
    pub async fn next_attempt(&mut self) -> Result<u32, u32> {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.interval.tick() => {}
                    _ = tokio::time::sleep_until(deadline) => return Err(self.attempts),
                }
            }
            None => {
                self.interval.tick().await;
            }
        }

        if self.max_attempts.is_some_and(|max| self.attempts >= max) {
            return Err(self.attempts);
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Stop the timer and report how many attempts went out.
    pub fn cancel(self) -> u32 {
        self.attempts
    }
}
