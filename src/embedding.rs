//! Embedding capability contract
//!
//! Providers live outside this crate; the memory layer only needs the
//! operations below and must keep working when no adapter is configured.

use async_trait::async_trait;

use crate::error::Result;

/// A pluggable embedding provider.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output dimensionality, when the provider knows it up front.
    fn dimensions(&self) -> Option<usize>;

    /// Provider model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Largest batch the provider accepts per call; `None` means unchunked.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
}
