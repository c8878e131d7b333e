//! Retry with configurable backoff for generation calls.

use std::time::Duration;

use async_trait::async_trait;

use folio_types::Result;

use crate::{GenerationRequest, TextGenerator};

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let factor = 2u64.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
                let base_millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
                let millis = base_millis.saturating_mul(factor);
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

/// Call `generator` up to `max_retries + 1` times, retrying only errors that
/// satisfy [`folio_types::FolioError::is_retryable`]. The last error is
/// returned once attempts run out.
pub async fn generate_with_retry<G: TextGenerator + ?Sized>(
    generator: &G,
    request: &GenerationRequest,
    max_retries: usize,
    policy: &BackoffPolicy,
) -> Result<String> {
    let mut attempt = 0;
    loop {
        match generator.generate(request).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    generator = %generator.name(),
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Retryable generation error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A [`TextGenerator`] that retries its inner generator.
pub struct RetryingGenerator<G> {
    inner: G,
    max_retries: usize,
    policy: BackoffPolicy,
}

impl<G: TextGenerator> RetryingGenerator<G> {
    pub fn new(inner: G, max_retries: usize, policy: BackoffPolicy) -> Self {
        Self {
            inner,
            max_retries,
            policy,
        }
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for RetryingGenerator<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        generate_with_retry(&self.inner, request, self.max_retries, &self.policy).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn check_connection(&self) -> Result<()> {
        self.inner.check_connection().await
    }
}
