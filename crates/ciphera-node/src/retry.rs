//! Bounded retry with a fixed backoff schedule.
//!
//! Every attempt is bounded by a timeout; a timed-out attempt counts as a
//! [`ProtocolError::Timeout`]. Transient failures sleep for the next delay
//! of the schedule; non-transient ones stop immediately. There is no
//! unbounded retry: when the schedule runs out the result is `Exhausted` and
//! the caller decides how the work is recovered.

use std::future::Future;
use std::time::Duration;

use ciphera_canonical::NodeId;
use ciphera_core::{BackoffSchedule, ProtocolError};
use tracing::debug;

/// Outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryResult<T> {
    /// The operation succeeded.
    Success {
        /// The successful return value.
        value: T,
        /// Attempts made (1 = first try).
        attempts: usize,
    },
    /// Retries ran out, or the error was not transient.
    Exhausted {
        /// The last error.
        last_error: ProtocolError,
        /// Attempts made before giving up.
        attempts: usize,
    },
}

impl<T> RetryResult<T> {
    /// The value, if the operation succeeded.
    pub fn ok(self) -> Option<T> {
        match self {
            RetryResult::Success { value, .. } => Some(value),
            RetryResult::Exhausted { .. } => None,
        }
    }
}

/// Runs `operation` against `node` until it succeeds or `schedule` runs out.
pub async fn retry_with_backoff<F, Fut, T>(
    schedule: &BackoffSchedule,
    attempt_timeout: Duration,
    node: &NodeId,
    mut operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProtocolError>>,
{
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        let error = match tokio::time::timeout(attempt_timeout, operation()).await {
            Ok(Ok(value)) => return RetryResult::Success { value, attempts },
            Ok(Err(error)) => error,
            Err(_) => ProtocolError::Timeout {
                node_id: node.clone(),
            },
        };

        if !error.is_transient() {
            return RetryResult::Exhausted {
                last_error: error,
                attempts,
            };
        }

        match schedule.delay_after(attempts - 1) {
            Some(delay) => {
                debug!(node_id = %node, attempt = attempts, ?delay, error = %error, "retrying");
                tokio::time::sleep(delay).await;
            }
            None => {
                return RetryResult::Exhausted {
                    last_error: error,
                    attempts,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn node() -> NodeId {
        NodeId::parse("node2").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let start = Instant::now();
        let result = retry_with_backoff(
            &BackoffSchedule::default(),
            Duration::from_secs(5),
            &node(),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProtocolError::Unreachable(node()))
                } else {
                    Ok(7)
                }
            },
        )
        .await;
        assert_eq!(result, RetryResult::Success { value: 7, attempts: 3 });
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_schedule_on_timeouts() {
        let start = Instant::now();
        let result: RetryResult<()> = retry_with_backoff(
            &BackoffSchedule::default(),
            Duration::from_secs(1),
            &node(),
            || std::future::pending(),
        )
        .await;
        match result {
            RetryResult::Exhausted { last_error, attempts } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_error, ProtocolError::Timeout { node_id: node() });
            }
            other => panic!("unexpected {:?}", other),
        }
        // five 1s attempts plus 15s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_permanent_error() {
        let calls = AtomicUsize::new(0);
        let result: RetryResult<()> = retry_with_backoff(
            &BackoffSchedule::default(),
            Duration::from_secs(1),
            &node(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProtocolError::NotFound {
                    kind: "credential",
                    id: "c1".to_string(),
                })
            },
        )
        .await;
        assert!(matches!(result, RetryResult::Exhausted { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
