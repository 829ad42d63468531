use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::provider::EmbeddingProvider;

/// A mock embedding provider that always returns the same fixed vector.
///
/// Tracks the number of calls via an atomic counter so tests can verify
/// caching and warm-up behaviour.
pub struct MockEmbeddingProvider {
    vector: Vec<f32>,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a mock provider returning the given fixed vector.
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times [`embed`](EmbeddingProvider::embed) was called
    /// (batch calls count once per input).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.vector.clone())
    }
}

/// A mock embedding provider mapping specific texts to specific vectors.
///
/// Unknown texts receive a zero vector of the configured dimension, which
/// scores 0.0 similarity against everything.
pub struct MappingEmbeddingProvider {
    mappings: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl MappingEmbeddingProvider {
    /// Create a mapping provider with the given text-to-vector mappings.
    pub fn new(mappings: HashMap<String, Vec<f32>>, dimension: usize) -> Self {
        Self {
            mappings,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MappingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self
            .mappings
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimension]))
    }
}

/// A mock embedding provider that always returns an error, for exercising
/// the lexical fallback paths.
pub struct FailingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::ApiError("mock failure".to_owned()))
    }
}
