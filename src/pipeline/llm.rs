//! Model interaction: the [`ModelClient`] seam, its provider-backed
//! implementation, and the retry loop shared by extraction and structuring.
//!
//! All prompt text lives in [`crate::prompts`]; this module only moves
//! prompts and images to the model and classifies what comes back.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors are frequent when ten batches are in flight at once.
//! Delays grow exponentially (`retry_backoff_ms · 2^(k−1)`), are capped at
//! `max_backoff_ms`, and carry random jitter so that workers rate-limited at
//! the same moment do not retry in lock-step. With the 1.5 s default base the
//! ceilings run 1.5 s → 3 s → 6 s → 12 s for five attempts.

use crate::config::ClassifierConfig;
use crate::error::ModelError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// The two model capabilities the pipeline needs.
///
/// Implementations return the raw response text; parsing and validation
/// happen downstream because every response is untrusted.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One image plus instructions → text.
    async fn complete_vision(&self, prompt: &str, image: ImageData) -> Result<String, ModelError>;

    /// Instructions plus text → text.
    async fn complete_text(&self, prompt: &str) -> Result<String, ModelError>;
}

/// [`ModelClient`] backed by an `edgequake-llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ClassifierConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ModelError> {
        let start = Instant::now();
        let response = match timeout(self.timeout, self.provider.chat(&messages, Some(&self.options)))
            .await
        {
            Err(_) => {
                return Err(ModelError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) => return Err(ModelError::from_provider_message(e.to_string())),
            Ok(Ok(response)) => response,
        };

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(ModelError::Malformed("empty response".into()));
        }
        Ok(response.content)
    }
}

#[async_trait]
impl ModelClient for ProviderClient {
    async fn complete_vision(&self, prompt: &str, image: ImageData) -> Result<String, ModelError> {
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
        self.chat(messages).await
    }

    async fn complete_text(&self, prompt: &str) -> Result<String, ModelError> {
        let messages = vec![ChatMessage::user(prompt)];
        self.chat(messages).await
    }
}

/// Build `CompletionOptions` from the classifier config.
fn build_options(config: &ClassifierConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Backoff ──────────────────────────────────────────────────────────────

/// Capped exponential backoff with equal jitter.
///
/// Delay *k* lies in `[ceiling(k)/2, ceiling(k)]` and never drops below the
/// previous delay, so the sequence for one failing call is non-decreasing.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    retries: u32,
    previous: Duration,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
            retries: 0,
            previous: Duration::ZERO,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(config.retry_backoff_ms, config.max_backoff_ms)
    }

    /// Upper bound of the delay before retry `k` (1-based).
    pub fn ceiling(&self, k: u32) -> Duration {
        let factor = 1u64.checked_shl(k.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }

    /// Delay before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        self.retries += 1;
        let cap = self.ceiling(self.retries).as_millis() as u64;
        let half = cap / 2;
        let jitter = if cap > half {
            rand::rng().random_range(0..=cap - half)
        } else {
            0
        };
        let delay = Duration::from_millis(half + jitter).max(self.previous);
        self.previous = delay;
        delay
    }
}

/// Result of [`call_with_retry`]: the final outcome and how many calls it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ModelError>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently, or `max_attempts` calls
/// have been made.
///
/// `op` receives the 1-based attempt number. `label` only appears in logs.
pub async fn call_with_retry<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    mut backoff: Backoff,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if !e.is_retryable() => {
                warn!("{}: attempt {} failed permanently: {}", label, attempt, e);
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) if attempt >= max_attempts => {
                warn!("{}: giving up after {} attempts: {}", label, attempt, e);
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {}ms",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn build_options_defaults() {
        let config = ClassifierConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn ceilings_double_then_cap() {
        let b = Backoff::new(1500, 30_000);
        let ceilings: Vec<u64> = (1..=6).map(|k| b.ceiling(k).as_millis() as u64).collect();
        assert_eq!(ceilings, vec![1500, 3000, 6000, 12_000, 24_000, 30_000]);
        assert_eq!(b.ceiling(200).as_millis(), 30_000);
    }

    #[test]
    fn delays_are_non_decreasing_and_bounded() {
        for _ in 0..50 {
            let mut b = Backoff::new(100, 1000);
            let mut prev = Duration::ZERO;
            for k in 1..=10 {
                let d = b.next_delay();
                assert!(d >= prev, "delay {k} went down: {d:?} < {prev:?}");
                assert!(d <= b.ceiling(k));
                assert!(d >= b.ceiling(k) / 2);
                prev = d;
            }
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let outcome = call_with_retry("test", 5, Backoff::new(1, 2), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(ModelError::RateLimited("429".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(outcome.result, Ok(3));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn never_exceeds_max_attempts() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = call_with_retry("test", 4, Backoff::new(1, 2), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ModelError::Timeout { secs: 50 }) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.attempts, 4);
        assert!(matches!(outcome.result, Err(ModelError::Timeout { .. })));
    }

    #[tokio::test]
    async fn permanent_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = call_with_retry("test", 5, Backoff::new(1, 2), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ModelError::Permanent("401 Unauthorized".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
    }
}
