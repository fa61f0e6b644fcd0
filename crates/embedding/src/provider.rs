use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::types::TextEmbedding;

/// Common interface over embedding backends.
///
/// A provider is identified by `(provider_name, model_name)`; that pair plus
/// the native dimension forms the [`identity`](Self::identity) string used in
/// cache keys and search filters.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Backend family, e.g. `"hf"`, `"openai"`, `"stub"`.
    fn provider_name(&self) -> &str;

    /// Concrete model label, e.g. `"bge-small-en-v1.5"`.
    fn model_name(&self) -> &str;

    /// Native output width of the model, before any padding.
    fn dimension(&self) -> usize;

    /// Whether the backend can currently serve requests.
    fn is_available(&self) -> bool {
        true
    }

    /// Stable identity string for cache keys: `provider/model/dim`.
    fn identity(&self) -> String {
        format!(
            "{}/{}/{}",
            self.provider_name(),
            self.model_name(),
            self.dimension()
        )
    }

    /// Embeds a batch of texts, one embedding per input in order.
    async fn encode_texts(&self, texts: &[String]) -> Result<Vec<TextEmbedding>, EmbeddingError>;

    /// Embeds a batch of images given as raw bytes. Most text-only backends
    /// leave the default, which reports the capability as unsupported.
    async fn encode_images(
        &self,
        _images: &[Vec<u8>],
    ) -> Result<Vec<TextEmbedding>, EmbeddingError> {
        Err(EmbeddingError::Unsupported(format!(
            "provider '{}' does not support image encoding",
            self.provider_name()
        )))
    }

    /// Releases backend resources. Idempotent.
    async fn close(&self) {}
}
