//! Connect retry with a pluggable backoff policy.
//!
//! The policy only decides how many attempts to make and how long to wait
//! before each one. Waiting itself goes through a [`Sleeper`], so the same
//! policy runs on a blocking thread or under a test clock.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How the delay grows between consecutive attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base × (k-1)` before attempt k
    #[default]
    Linear,
    /// `base × 2^(k-2)` before attempt k
    Exponential,
    /// `base` before every retry
    Fixed,
}

/// Attempt count and delay function for connecting to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay unit
    pub base_delay: Duration,
    /// Growth rule
    pub strategy: BackoffStrategy,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            strategy: BackoffStrategy::Linear,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Linear policy with the given attempt count and delay unit.
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait before attempt `attempt` (1-indexed).
    ///
    /// The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let delay = match self.strategy {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt - 1),
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Fixed => self.base_delay,
        };
        delay.min(self.max_delay)
    }
}

/// Something that can wait.
pub trait Sleeper: Send + Sync {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Records requested delays without waiting.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy runs out of attempts.
///
/// `operation` receives the 1-indexed attempt number. Before attempt k>1 the
/// sleeper is asked to wait [`BackoffPolicy::delay_before`]`(k)`. On
/// exhaustion the last error is returned together with the number of
/// attempts made.
pub fn with_retry<T, F>(
    policy: &BackoffPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> std::result::Result<T, (Error, u32)>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err((e, attempt)),
            Err(e) if attempt >= max_attempts => return Err((e, attempt)),
            Err(e) => {
                let delay = policy.delay_before(attempt + 1);
                log::debug!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                sleeper.sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportKind;

    #[test]
    fn test_linear_delays() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = BackoffPolicy {
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
        };
        assert_eq!(policy.delay_before(2), Duration::from_secs(1));
        assert_eq!(policy.delay_before(3), Duration::from_secs(2));
        assert_eq!(policy.delay_before(4), Duration::from_secs(4));
        assert_eq!(policy.delay_before(5), Duration::from_secs(5));
        assert_eq!(policy.delay_before(40), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_delays() {
        let policy = BackoffPolicy {
            strategy: BackoffStrategy::Fixed,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delay_before(2), policy.delay_before(3));
    }

    #[test]
    fn test_success_first_try_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let result = with_retry(&BackoffPolicy::default(), &sleeper, |_| Ok::<_, Error>(7));
        assert_eq!(result.ok(), Some(7));
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_non_retryable_error_stops_immediately() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;
        let result: std::result::Result<(), _> =
            with_retry(&BackoffPolicy::default(), &sleeper, |_| {
                calls += 1;
                Err(Error::Authentication {
                    device: "r1".into(),
                    message: "denied".into(),
                })
            });

        let (err, attempts) = result.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert_eq!(attempts, 1);
        assert_eq!(calls, 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_permanent_transport_error_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;
        let result: std::result::Result<(), _> =
            with_retry(&BackoffPolicy::default(), &sleeper, |_| {
                calls += 1;
                Err(Error::Transport {
                    device: "r1".into(),
                    kind: TransportKind::Unreachable,
                    message: "no such host".into(),
                    transient: false,
                })
            });

        let (err, attempts) = result.unwrap_err();
        assert!(matches!(err, Error::Transport { transient: false, .. }));
        assert_eq!(attempts, 1);
        assert_eq!(calls, 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_exhaustion_reports_attempts_and_increasing_delays() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::linear(4, Duration::from_millis(10));
        let result: std::result::Result<(), _> = with_retry(&policy, &sleeper, |_| {
            Err(Error::transient("r1", TransportKind::Refused, "refused"))
        });

        let (_, attempts) = result.unwrap_err();
        assert_eq!(attempts, 4);
        let delays = sleeper.delays();
        assert_eq!(delays.len(), 3);
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_eventual_success() {
        let sleeper = RecordingSleeper::new();
        let result = with_retry(&BackoffPolicy::default(), &sleeper, |attempt| {
            if attempt < 3 {
                Err(Error::transient("r1", TransportKind::Timeout, "slow"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.ok(), Some(3));
        assert_eq!(sleeper.delays().len(), 2);
    }
}
