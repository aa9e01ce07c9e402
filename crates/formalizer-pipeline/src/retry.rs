//! Bounded retry of reasoning calls with configurable backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use formalizer_llm::ReasoningResult;

use crate::events::{EventEmitter, PipelineEvent};

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed {
        #[serde(with = "crate::duration_serde")]
        delay: Duration,
    },
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential {
        #[serde(with = "crate::duration_serde")]
        base: Duration,
        #[serde(with = "crate::duration_serde")]
        max: Duration,
    },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay } => *delay,
            BackoffPolicy::Exponential { base, max } => {
                let millis = (base.as_millis() as u64)
                    .saturating_mul(2u64.saturating_pow(attempt as u32));
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// The final result of a retried call and how many attempts it took.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub result: ReasoningResult,
    pub attempts: usize,
}

/// Call `f` up to `max_retries + 1` times.
///
/// Only results that are [`ReasoningResult::is_retryable`] are retried. Usable
/// answers, `Unsupported` and permanent failures return immediately. When the
/// bound is exhausted the last failure is returned as-is.
pub async fn execute_with_retry<F, Fut>(
    f: F,
    max_retries: usize,
    policy: &BackoffPolicy,
    rule_id: &str,
    events: &EventEmitter,
) -> RetryOutcome
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = ReasoningResult>,
{
    let mut attempt = 0;
    loop {
        let result = f().await;
        if !result.is_retryable() || attempt >= max_retries {
            if result.is_retryable() {
                tracing::warn!(rule = %rule_id, attempts = attempt + 1, "Reasoning retries exhausted");
            }
            return RetryOutcome {
                result,
                attempts: attempt + 1,
            };
        }

        let delay = policy.delay_for_attempt(attempt);
        tracing::warn!(
            rule = %rule_id,
            attempt,
            delay_ms = %delay.as_millis(),
            "Retryable reasoning failure, retrying"
        );
        events.emit(PipelineEvent::ReasoningRetrying {
            rule_id: rule_id.to_string(),
            attempt: attempt + 1,
        });
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn success_on_first_try() {
        let outcome = execute_with_retry(
            || async { ReasoningResult::answer("done") },
            3,
            &BackoffPolicy::None,
            "R001",
            &EventEmitter::default(),
        )
        .await;

        assert_eq!(outcome.result.text(), Some("done"));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn retry_on_transient_failure_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cc = calls.clone();
        let events = EventEmitter::new(8);
        let mut rx = events.subscribe();

        let outcome = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    if cc.fetch_add(1, Ordering::SeqCst) == 0 {
                        ReasoningResult::failed("rate limited", true)
                    } else {
                        ReasoningResult::answer("recovered")
                    }
                }
            },
            3,
            &BackoffPolicy::None,
            "R002",
            &events,
        )
        .await;

        assert!(outcome.result.is_usable());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match rx.recv().await.unwrap() {
            PipelineEvent::ReasoningRetrying { rule_id, attempt } => {
                assert_eq!(rule_id, "R002");
                assert_eq!(attempt, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cc = calls.clone();

        let outcome = execute_with_retry(
            move || {
                cc.fetch_add(1, Ordering::SeqCst);
                async { ReasoningResult::failed("503", true) }
            },
            2,
            &BackoffPolicy::None,
            "R003",
            &EventEmitter::default(),
        )
        .await;

        assert!(outcome.result.is_retryable());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_and_unsupported_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cc = calls.clone();
        let outcome = execute_with_retry(
            move || {
                cc.fetch_add(1, Ordering::SeqCst);
                async { ReasoningResult::failed("bad key", false) }
            },
            5,
            &BackoffPolicy::None,
            "R004",
            &EventEmitter::default(),
        )
        .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let outcome = execute_with_retry(
            || async {
                ReasoningResult::Unsupported {
                    provider: "local".into(),
                }
            },
            5,
            &BackoffPolicy::None,
            "R004",
            &EventEmitter::default(),
        )
        .await;
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn backoff_fixed_delay() {
        let policy = BackoffPolicy::Fixed {
            delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(200));
    }

    #[test]
    fn backoff_exponential_is_capped() {
        let policy = BackoffPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn backoff_serde_uses_readable_durations() {
        let json = serde_json::to_value(BackoffPolicy::default()).unwrap();
        assert_eq!(json["kind"], "exponential");
        assert_eq!(json["base"], "500ms");
        assert_eq!(json["max"], "30000ms");

        let fixed: BackoffPolicy =
            serde_json::from_str(r#"{"kind": "fixed", "delay": "2s"}"#).unwrap();
        assert_eq!(
            fixed,
            BackoffPolicy::Fixed {
                delay: Duration::from_secs(2)
            }
        );
        let none: BackoffPolicy = serde_json::from_str(r#"{"kind": "none"}"#).unwrap();
        assert_eq!(none, BackoffPolicy::None);
    }
}
