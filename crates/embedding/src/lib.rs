pub mod ollama;
pub mod provider;
pub mod resilient;

pub use ollama::{LoadedModel, OllamaClient};
pub use provider::{EmbeddingError, EmbeddingProvider};
pub use resilient::{Retrying, RetryConfig, is_retryable_error, wrap_retrying};
