use std::time::Duration;

use tracing::warn;

use crate::error::Error;
use crate::llm::types::{CompletionRequest, CompletionResponse};

use super::{LlmProvider, OnText};

/// Backoff schedule for the retry middleware.
///
/// Produces `max_retries` delays, doubling from `initial_backoff` up to the
/// `max_backoff` cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the initial attempt (0 disables retrying).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// The successive delays this config yields, one per retry.
    fn backoff_schedule(&self) -> impl Iterator<Item = Duration> {
        let max = self.max_backoff;
        (0..self.max_retries).scan(self.initial_backoff, move |next, _| {
            let current = (*next).min(max);
            *next = (*next * 2).min(max);
            Some(current)
        })
    }
}

/// Middleware wrapping a provider's model calls with backoff on transient
/// failures. Wrappers like this compose into a chain around the provider
/// before it is handed to the agent builder.
///
/// What counts as transient is the harness's own call: see
/// [`Error::is_transient`]. Deterministic failures (client errors, parse
/// failures, anything the harness itself raised) pass through untouched so
/// the loop can surface them as tool results or a terminal `error` event.
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
}

impl<P> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Wrap a provider with the default schedule (3 retries from 500ms).
    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, RetryConfig::default())
    }
}

impl<P: LlmProvider> LlmProvider for RetryingProvider<P> {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let mut outcome = self.inner.complete(request.clone()).await;
        for (attempt, delay) in self.config.backoff_schedule().enumerate() {
            match &outcome {
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient provider failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    outcome = self.inner.complete(request.clone()).await;
                }
                _ => break,
            }
        }
        outcome
    }

    // A retried attempt streams from the beginning again, so `on_text` may
    // see duplicate deltas from a partially-streamed failure. The returned
    // response is always the complete one.
    async fn stream_complete(
        &self,
        request: CompletionRequest,
        on_text: &OnText,
    ) -> Result<CompletionResponse, Error> {
        let mut outcome = self.inner.stream_complete(request.clone(), on_text).await;
        for (attempt, delay) in self.config.backoff_schedule().enumerate() {
            match &outcome {
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient provider failure during stream, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    outcome = self.inner.stream_complete(request.clone(), on_text).await;
                }
                _ => break,
            }
        }
        outcome
    }

    fn model_name(&self) -> Option<&str> {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ContentBlock, Message, StopReason, TokenUsage};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails the first N calls, then succeeds.
    struct FailNTimes {
        remaining_failures: AtomicU32,
        error_factory: Box<dyn Fn() -> Error + Send + Sync>,
        call_count: Arc<AtomicU32>,
    }

    impl FailNTimes {
        fn new(
            failures: u32,
            error_factory: impl Fn() -> Error + Send + Sync + 'static,
        ) -> (Self, Arc<AtomicU32>) {
            let count = Arc::new(AtomicU32::new(0));
            (
                Self {
                    remaining_failures: AtomicU32::new(failures),
                    error_factory: Box::new(error_factory),
                    call_count: count.clone(),
                },
                count,
            )
        }
    }

    impl LlmProvider for FailNTimes {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, Error> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.remaining_failures.load(Ordering::SeqCst) > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
                return Err((self.error_factory)());
            }
            Ok(CompletionResponse {
                content: vec![ContentBlock::Text { text: "ok".into() }],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            })
        }
    }

    fn test_request() -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: 64,
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let (inner, count) = FailNTimes::new(2, || Error::Api {
            status: 429,
            message: "rate limited".into(),
        });
        let provider = RetryingProvider::new(inner, fast_config(3));

        let response = provider.complete(test_request()).await.unwrap();
        assert_eq!(response.text(), "ok");
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deterministic_errors_pass_through_immediately() {
        let (inner, count) = FailNTimes::new(5, || Error::Api {
            status: 401,
            message: "bad key".into(),
        });
        let provider = RetryingProvider::new(inner, fast_config(3));

        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn harness_errors_are_never_retried() {
        let (inner, count) = FailNTimes::new(5, || Error::Agent("deterministic".into()));
        let provider = RetryingProvider::new(inner, fast_config(3));

        provider.complete(test_request()).await.unwrap_err();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_schedule_returns_last_error() {
        let (inner, count) = FailNTimes::new(10, || Error::Api {
            status: 503,
            message: "overloaded".into(),
        });
        let provider = RetryingProvider::new(inner, fast_config(2));

        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        // 1 initial + 2 retries
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        let delays: Vec<Duration> = config.backoff_schedule().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[test]
    fn zero_retries_yields_empty_schedule() {
        assert_eq!(fast_config(0).backoff_schedule().count(), 0);
    }
}
