// Retry wrapper for embedding calls
//
// - Exponential backoff with jitter
// - Retries connection failures, timeouts, and 429/5xx service errors
// - Bounded attempts; the last error is surfaced unchanged

use crate::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retrying embedding operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
  /// Maximum number of retry attempts after the first try.
  pub max_retries: u32,
  /// Initial backoff duration.
  pub initial_backoff: Duration,
  /// Maximum backoff duration.
  pub max_backoff: Duration,
  /// Exponential factor between attempts.
  pub backoff_multiplier: f64,
  /// Whether to add jitter to backoff.
  pub add_jitter: bool,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff: Duration::from_millis(500),
      max_backoff: Duration::from_secs(30),
      backoff_multiplier: 2.0,
      add_jitter: true,
    }
  }
}

impl RetryConfig {
  /// Calculate backoff duration for a given attempt.
  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
    let mut backoff = Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()));

    if self.add_jitter {
      // Up to 25% jitter
      let jitter_factor = 1.0 + (rand_f64() * 0.25);
      backoff = Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);
    }

    backoff.min(self.max_backoff)
  }
}

/// A simple pseudo-random number generator for jitter (no external deps)
fn rand_f64() -> f64 {
  use std::time::{SystemTime, UNIX_EPOCH};

  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .subsec_nanos();

  (nanos as f64 / u32::MAX as f64).fract()
}

/// Check if an error is worth retrying.
pub fn is_retryable_error(error: &EmbeddingError) -> bool {
  match error {
    EmbeddingError::Connection { .. } => true,
    EmbeddingError::Timeout => true,
    EmbeddingError::Service(msg) => {
      msg.contains("429") // Rate limited
        || msg.contains("502") // Bad gateway
        || msg.contains("503") // Service unavailable
        || msg.contains("504") // Gateway timeout
    }
    _ => false,
  }
}

/// An embedding provider that retries transient failures of its inner
/// provider with bounded backoff.
pub struct Retrying<P: EmbeddingProvider> {
  inner: P,
  config: RetryConfig,
}

impl<P: EmbeddingProvider> Retrying<P> {
  pub fn new(provider: P) -> Self {
    Self {
      inner: provider,
      config: RetryConfig::default(),
    }
  }

  pub fn with_config(provider: P, config: RetryConfig) -> Self {
    Self {
      inner: provider,
      config,
    }
  }

  async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let backoff = self.config.backoff_for_attempt(attempt - 1);
        debug!(attempt, ?backoff, "retrying embed");
        sleep(backoff).await;
      }

      match self.inner.embed(text).await {
        Ok(result) => return Ok(result),
        Err(e) if is_retryable_error(&e) && attempt < self.config.max_retries => {
          warn!(attempt = attempt + 1, "retryable embedding error: {e}");
          last_error = Some(e);
        }
        Err(e) => return Err(e),
      }
    }

    Err(last_error.unwrap_or_else(|| EmbeddingError::Service("max retries exceeded".to_string())))
  }

  async fn embed_batch_with_retry(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let backoff = self.config.backoff_for_attempt(attempt - 1);
        debug!(attempt, ?backoff, batch = texts.len(), "retrying embed batch");
        sleep(backoff).await;
      }

      match self.inner.embed_batch(texts).await {
        Ok(result) => return Ok(result),
        Err(e) if is_retryable_error(&e) && attempt < self.config.max_retries => {
          warn!(attempt = attempt + 1, "retryable embedding error: {e}");
          last_error = Some(e);
        }
        Err(e) => return Err(e),
      }
    }

    Err(last_error.unwrap_or_else(|| EmbeddingError::Service("max retries exceeded".to_string())))
  }
}

#[async_trait]
impl<P: EmbeddingProvider + Send + Sync> EmbeddingProvider for Retrying<P> {
  fn model_id(&self) -> &str {
    self.inner.model_id()
  }

  fn dimensions(&self) -> usize {
    self.inner.dimensions()
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.embed_with_retry(text).await
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    self.embed_batch_with_retry(texts).await
  }
}

/// Wrap a provider with the default retry policy.
pub fn wrap_retrying<P: EmbeddingProvider>(provider: P) -> Retrying<P> {
  Retrying::new(provider)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  /// Provider that fails with a connection error a fixed number of times.
  struct Flaky {
    failures: AtomicU32,
    dims: usize,
  }

  impl Flaky {
    fn new(failures: u32) -> Self {
      Self {
        failures: AtomicU32::new(failures),
        dims: 4,
      }
    }
  }

  #[async_trait]
  impl EmbeddingProvider for Flaky {
    fn model_id(&self) -> &str {
      "flaky"
    }

    fn dimensions(&self) -> usize {
      self.dims
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
      if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
        return Err(EmbeddingError::Connection {
          host: "http://test".to_string(),
        });
      }
      Ok(vec![0.0; self.dims])
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
        return Err(EmbeddingError::Connection {
          host: "http://test".to_string(),
        });
      }
      Ok(texts.iter().map(|_| vec![0.0; self.dims]).collect())
    }
  }

  fn fast_config() -> RetryConfig {
    RetryConfig {
      max_retries: 3,
      initial_backoff: Duration::from_millis(1),
      max_backoff: Duration::from_millis(5),
      backoff_multiplier: 2.0,
      add_jitter: false,
    }
  }

  #[test]
  fn test_backoff_calculation() {
    let config = RetryConfig {
      initial_backoff: Duration::from_secs(1),
      backoff_multiplier: 2.0,
      max_backoff: Duration::from_secs(60),
      add_jitter: false,
      ..Default::default()
    };

    assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(1));
    assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(2));
    assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(4));
  }

  #[test]
  fn test_backoff_respects_max() {
    let config = RetryConfig {
      initial_backoff: Duration::from_secs(10),
      backoff_multiplier: 10.0,
      max_backoff: Duration::from_secs(30),
      add_jitter: false,
      ..Default::default()
    };

    assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(30));
  }

  #[test]
  fn test_is_retryable_error() {
    assert!(is_retryable_error(&EmbeddingError::Connection {
      host: "http://localhost:11434".to_string()
    }));
    assert!(is_retryable_error(&EmbeddingError::Timeout));
    assert!(is_retryable_error(&EmbeddingError::Service("returned 503".to_string())));
    assert!(!is_retryable_error(&EmbeddingError::Service("returned 400".to_string())));
    assert!(!is_retryable_error(&EmbeddingError::ShapeMismatch {
      expected: 2,
      got: 1
    }));
  }

  #[tokio::test]
  async fn test_recovers_after_transient_failures() {
    let provider = Retrying::with_config(Flaky::new(2), fast_config());
    let result = provider.embed_batch(&["a", "b"]).await.unwrap();
    assert_eq!(result.len(), 2);
  }

  #[tokio::test]
  async fn test_gives_up_after_max_retries() {
    let provider = Retrying::with_config(Flaky::new(10), fast_config());
    let err = provider.embed("a").await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Connection { .. }));
  }

  #[test]
  fn test_rand_f64_is_bounded() {
    for _ in 0..100 {
      let val = rand_f64();
      assert!((0.0..=1.0).contains(&val));
    }
  }
}
