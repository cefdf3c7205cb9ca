//! Bounded retry over a fixed delay schedule.

use crate::cancel::CancelToken;
use crate::config::RetryConfig;
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;

/// Waits between retries.
pub trait Sleeper: Send + Sync {
    /// Waits for `delay` unless `cancel` fires first.
    ///
    /// Returns true if the run was cancelled.
    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> bool;
}

/// Sleeps on the calling thread, waking early on cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> bool {
        cancel.wait_timeout(delay)
    }
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
    cancel_on_call: Option<usize>,
}

impl RecordingSleeper {
    /// Creates a sleeper that never blocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sleeper that cancels the run on its `n`th call (1-based).
    pub fn cancelling_on(n: usize) -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            cancel_on_call: Some(n),
        }
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> bool {
        let calls = {
            let mut delays = self.delays.lock();
            delays.push(delay);
            delays.len()
        };
        if self.cancel_on_call == Some(calls) {
            cancel.cancel();
        }
        cancel.is_cancelled()
    }
}

/// Result of one attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The attempt succeeded.
    Done(T),
    /// The attempt failed in a way worth retrying.
    Transient(E),
    /// The attempt failed for good.
    Fatal(E),
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed transiently.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last: E,
    },
    /// An attempt failed with a non-retryable error.
    Fatal {
        /// 1-based attempt that failed.
        attempt: u32,
        /// The error.
        error: E,
    },
    /// The run was cancelled while waiting to retry.
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => *attempts,
            RetryError::Fatal { attempt, .. } => *attempt,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            RetryError::Fatal { error, .. } => write!(f, "{error}"),
            RetryError::Cancelled { .. } => f.write_str("cancelled"),
        }
    }
}

/// Runs `op` until it succeeds, fails fatally or the schedule runs out.
///
/// `op` receives the 0-based attempt number and that attempt's read
/// timeout. Before attempt `n > 0` the sleeper waits
/// [`RetryConfig::delay_for_attempt`]`(n)`.
pub fn run_with_retry<T, E, F>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    cancel: &CancelToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut(u32, Duration) -> Attempt<T, E>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 0u32;
    loop {
        match op(attempt, config.timeout_for_attempt(attempt)) {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fatal(error) => {
                return Err(RetryError::Fatal {
                    attempt: attempt + 1,
                    error,
                })
            }
            Attempt::Transient(error) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    "transient failure, retrying"
                );
                if sleeper.sleep(delay, cancel) {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(v: &[u64]) -> Vec<Duration> {
        v.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn five_transient_faults_then_success() {
        let sleeper = RecordingSleeper::new();
        let mut timeouts = Vec::new();
        let result: Result<u32, RetryError<String>> = run_with_retry(
            &RetryConfig::default(),
            &sleeper,
            &CancelToken::new(),
            |attempt, timeout| {
                timeouts.push(timeout.as_secs());
                if attempt < 5 {
                    Attempt::Transient("timeout".to_string())
                } else {
                    Attempt::Done(attempt)
                }
            },
        );
        assert_eq!(result.unwrap(), 5);
        assert_eq!(sleeper.delays(), secs(&[10, 30, 90, 300, 900]));
        assert_eq!(timeouts, [60, 90, 120, 150, 180, 210]);
    }

    #[test]
    fn exhausted_after_schedule() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;
        let result: Result<(), _> = run_with_retry(
            &RetryConfig::default(),
            &sleeper,
            &CancelToken::new(),
            |_, _| {
                calls += 1;
                Attempt::Transient("reset")
            },
        );
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 6);
                assert_eq!(last, "reset");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls, 6);
        assert_eq!(sleeper.delays().len(), 5);
    }

    #[test]
    fn fatal_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let result: Result<(), _> = run_with_retry(
            &RetryConfig::default(),
            &sleeper,
            &CancelToken::new(),
            |_, _| Attempt::Fatal("404"),
        );
        assert!(matches!(result, Err(RetryError::Fatal { attempt: 1, .. })));
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn cancellation_stops_retries() {
        let sleeper = RecordingSleeper::cancelling_on(2);
        let cancel = CancelToken::new();
        let result: Result<(), _> = run_with_retry(
            &RetryConfig::default(),
            &sleeper,
            &cancel,
            |_, _| Attempt::Transient("timeout"),
        );
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 2 })));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn thread_sleeper_wakes_on_cancel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(ThreadSleeper.sleep(Duration::from_secs(60), &cancel));
    }
}
