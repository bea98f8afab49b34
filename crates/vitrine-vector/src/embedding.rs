//! Embedding provider trait and mock implementation.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! embedding backends (hosted APIs, local models, etc.). Every provider is
//! bound to one [`ModelVersion`]; vectors from different versions are never
//! compared.
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic fixed-dimension vectors for testing,
//!   with optional injected failures and latency
//! - [`RetryingProvider`](crate::retry::RetryingProvider): exponential backoff
//!   around any provider

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vitrine_core::{Error, ModelVersion, Result};

/// Trait for generating text embeddings.
///
/// Implementations wrap specific embedding backends and provide a uniform
/// async interface. The trait requires `Send + Sync` to allow safe sharing
/// across async tasks.
///
/// Transient backend failures must be reported as [`Error::Provider`] so
/// that retry wrappers can tell them apart from permanent errors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends that support native batching should override this.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The model version every returned vector belongs to.
    fn model(&self) -> &ModelVersion;

    /// The embedding dimension.
    fn dimension(&self) -> usize {
        self.model().dimension
    }

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A mock embedding provider for testing.
///
/// Generates deterministic vectors based on the input text bytes, producing
/// consistent embeddings for the same input. Failures and latency can be
/// injected to exercise retry and deadline handling.
pub struct MockEmbeddingProvider {
    model: ModelVersion,
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    delay: Option<Duration>,
    output_dimension: Option<usize>,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension and a `mock` model id.
    pub fn new(dimension: usize) -> Self {
        Self::with_model(ModelVersion::new("mock", dimension))
    }

    /// Create a new mock provider for an explicit model version.
    pub fn with_model(model: ModelVersion) -> Self {
        Self {
            model,
            calls: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            delay: None,
            output_dimension: None,
        }
    }

    /// Fail the next `count` calls with a retryable provider error.
    pub fn failing_first(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every call with a retryable provider error.
    pub fn always_failing(self) -> Self {
        self.failing_first(usize::MAX)
    }

    /// Sleep for `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Emit vectors of `dimension` regardless of the declared model.
    pub fn with_output_dimension(mut self, dimension: usize) -> Self {
        self.output_dimension = Some(dimension);
        self
    }

    /// Number of `embed` calls made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Generate a deterministic embedding from text.
    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let dimension = self.output_dimension.unwrap_or(self.model.dimension);
        let mut embedding = vec![0.0f32; dimension];
        let bytes = text.as_bytes();

        for (i, val) in embedding.iter_mut().enumerate() {
            // Use byte values to create deterministic but varied components
            let byte_idx = i % bytes.len().max(1);
            let byte_val = if bytes.is_empty() {
                0u8
            } else {
                bytes[byte_idx]
            };
            *val = ((byte_val as f32 + i as f32) % 256.0) / 256.0;
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == 0 {
                    None
                } else if n == usize::MAX {
                    Some(n)
                } else {
                    Some(n - 1)
                }
            })
            .is_ok()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure() {
            return Err(Error::provider("mock provider: injected failure"));
        }
        Ok(self.deterministic_embedding(text))
    }

    fn model(&self) -> &ModelVersion {
        &self.model
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================
