use async_trait::async_trait;

/// Seam shared by the indexing queue and the search engine.
///
/// The only production implementation talks to an Ollama-shaped service;
/// tests substitute deterministic providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  /// The service could not be reached at all. Carries the configured host so
  /// callers can tell the user which endpoint is down.
  #[error("cannot connect to embedding service at {host} — is Ollama running?")]
  Connection { host: String },

  #[error("embedding service error: {0}")]
  Service(String),

  #[error("request failed: {0}")]
  Request(#[source] reqwest::Error),

  #[error("request timed out")]
  Timeout,

  #[error("embedding count mismatch: expected {expected}, got {got}")]
  ShapeMismatch { expected: usize, got: usize },
}
