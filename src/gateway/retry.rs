//! Retry decorator for the completion transport.
//!
//! Wraps any [`CompletionClient`] and retries rate-limit and transient
//! failures with exponential backoff and jitter. Authentication failures
//! and everything else propagate immediately. This is the only retry
//! layer; nothing above or below the transport retries.

use async_trait::async_trait;
use tracing::warn;

use crate::error::{AgentError, Result};
use crate::tools::ToolSpec;
use crate::transcript::Message;

use super::provider::{CompletionClient, RawCompletion, RequestParams};

/// Whether an error should be retried with backoff.
pub fn is_retryable(err: &AgentError) -> bool {
    match err {
        AgentError::Provider(pe) => pe.is_retryable(),
        _ => false,
    }
}

/// Compute the backoff delay for a given attempt (without sleeping).
///
/// Formula: `min(base_delay_ms * 2^attempt + jitter_ms, max_delay_ms)`.
pub fn compute_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(16));
    exponential.saturating_add(jitter_ms).min(max_delay_ms)
}

/// Sleep for the backoff delay for a given retry attempt.
///
/// Jitter comes from the nanosecond component of the system clock, which
/// decorrelates concurrent retries without pulling in `rand`.
pub async fn delay_with_jitter(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) {
    let jitter_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % (base_delay_ms.max(1)))
        .unwrap_or(0);
    let delay = compute_delay(attempt, base_delay_ms, max_delay_ms, jitter_ms);
    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
}

/// A decorator client that retries transient transport failures.
pub struct RetryClient {
    inner: Box<dyn CompletionClient>,
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryClient {
    pub fn new(inner: Box<dyn CompletionClient>) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }
}

#[async_trait]
impl CompletionClient for RetryClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &RequestParams,
    ) -> Result<RawCompletion> {
        let mut last_err: Option<AgentError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                if let Some(ref err) = last_err {
                    warn!(
                        client = self.inner.name(),
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "Retrying completion after transient error"
                    );
                }
                delay_with_jitter(attempt - 1, self.base_delay_ms, self.max_delay_ms).await;
            }

            match self.inner.complete(messages, tools, params).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !is_retryable(&err) || attempt == self.max_retries {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }
        }

        // The loop always returns; this satisfies the compiler.
        Err(last_err.unwrap_or_else(|| {
            AgentError::Config("retry loop exited without result".to_string())
        }))
    }
}
