//! Retry wrapper for embedding providers.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use vitrine_core::config::EmbeddingConfig;
use vitrine_core::{Error, ModelVersion, Result};

use crate::embedding::EmbeddingProvider;

/// Wraps an embedding provider with exponential-backoff retry logic.
///
/// Only retryable errors ([`Error::Provider`]) are retried. `max_attempts`
/// counts the first call, so a value of 3 means at most 3 provider calls.
/// The last error is returned once attempts are exhausted.
pub struct RetryingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryingProvider {
    /// Creates a new retry wrapper with default settings.
    ///
    /// Default settings:
    /// - Max attempts: 3
    /// - Initial delay: 500 milliseconds
    /// - Max delay: 10 seconds
    /// - Multiplier: 2.0 (exponential backoff)
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner: provider,
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }

    /// Creates a retry wrapper from the embedding configuration section.
    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(provider)
            .with_max_attempts(config.max_attempts)
            .with_initial_delay(config.initial_backoff())
            .with_max_delay(config.max_backoff())
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the initial delay between retries.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Maximum number of provider calls per embedding.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }

    /// Determines if an error should be retried.
    fn should_retry(error: &Error) -> bool {
        error.is_retryable()
    }

    fn log_retry(error: &Error, delay: Duration) {
        log::warn!("Embedding provider failed, retrying in {delay:?}: {error}");
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (|| self.inner.embed(text))
            .retry(self.backoff())
            .when(Self::should_retry)
            .notify(Self::log_retry)
            .await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (|| self.inner.embed_batch(texts))
            .retry(self.backoff())
            .when(Self::should_retry)
            .notify(Self::log_retry)
            .await
    }

    fn model(&self) -> &ModelVersion {
        self.inner.model()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
