use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Trait for computing text embeddings.
///
/// Implementations call an external service (e.g. an OpenAI-compatible
/// `/v1/embeddings` endpoint) to convert text into a dense vector. The
/// gateway treats every call as I/O and wraps it in the evaluator deadline.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed multiple texts.
    ///
    /// The default implementation calls [`embed`](Self::embed) sequentially;
    /// providers with a batch API should override it.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}
