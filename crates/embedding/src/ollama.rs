use crate::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use ragling_core::EmbeddingSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_HOST: &str = "http://localhost:11434";
/// Large fixed timeout so cold model loads don't count as failures.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for an Ollama-shaped embedding service.
///
/// Two operations: batch embedding (`/api/embed`) and loaded-model memory
/// reporting (`/api/ps`).
#[derive(Debug, Clone)]
pub struct OllamaClient {
  http: reqwest::Client,
  host: String,
  model: String,
  dimensions: usize,
  keep_alive: String,
}

impl OllamaClient {
  pub fn new(settings: &EmbeddingSettings) -> Self {
    Self {
      http: reqwest::Client::new(),
      host: settings.host().to_string(),
      model: settings.model.clone(),
      dimensions: settings.dimensions,
      keep_alive: settings.keep_alive.clone(),
    }
  }

  pub fn with_host(mut self, host: impl Into<String>) -> Self {
    self.host = host.into();
    self
  }

  pub fn host(&self) -> &str {
    &self.host
  }

  fn embed_url(&self) -> String {
    format!("{}/api/embed", self.host)
  }

  fn ps_url(&self) -> String {
    format!("{}/api/ps", self.host)
  }

  /// Quick reachability probe.
  pub async fn is_available(&self) -> bool {
    match self
      .http
      .get(&self.host)
      .timeout(Duration::from_secs(5))
      .send()
      .await
    {
      Ok(response) => response.status().is_success(),
      Err(_) => false,
    }
  }

  /// Models currently loaded by the service, with their VRAM footprint.
  pub async fn loaded_models(&self) -> Result<Vec<LoadedModel>, EmbeddingError> {
    let response = self
      .http
      .get(self.ps_url())
      .timeout(Duration::from_secs(10))
      .send()
      .await
      .map_err(|e| self.request_error(e))?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(EmbeddingError::Service(format!(
        "embedding service returned {status}: {body}"
      )));
    }

    let result: PsResponse = response.json().await.map_err(|e| self.request_error(e))?;
    Ok(result.models)
  }

  async fn embed_inputs(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let request = EmbedRequest {
      model: &self.model,
      input: texts,
      keep_alive: &self.keep_alive,
    };

    debug!(batch = texts.len(), model = %self.model, "embedding batch");

    let response = self
      .http
      .post(self.embed_url())
      .timeout(REQUEST_TIMEOUT)
      .json(&request)
      .send()
      .await
      .map_err(|e| self.request_error(e))?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!(%status, "embedding request failed: {body}");
      return Err(EmbeddingError::Service(format!(
        "embedding service returned {status}: {body}"
      )));
    }

    let result: EmbedResponse = response.json().await.map_err(|e| self.request_error(e))?;

    if result.embeddings.len() != texts.len() {
      return Err(EmbeddingError::ShapeMismatch {
        expected: texts.len(),
        got: result.embeddings.len(),
      });
    }

    for embedding in &result.embeddings {
      if embedding.len() != self.dimensions {
        warn!(
          got = embedding.len(),
          expected = self.dimensions,
          "unexpected embedding dimensions"
        );
      }
    }

    Ok(result.embeddings)
  }

  fn request_error(&self, error: reqwest::Error) -> EmbeddingError {
    if error.is_timeout() {
      EmbeddingError::Timeout
    } else if error.is_connect() {
      EmbeddingError::Connection {
        host: self.host.clone(),
      }
    } else {
      EmbeddingError::Request(error)
    }
  }
}

impl Default for OllamaClient {
  fn default() -> Self {
    Self::new(&EmbeddingSettings::default()).with_host(DEFAULT_HOST)
  }
}

/// One entry from `/api/ps`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadedModel {
  pub name: String,
  #[serde(default)]
  pub size_vram: u64,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
  model: &'a str,
  input: &'a [&'a str],
  keep_alive: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
  embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct PsResponse {
  #[serde(default)]
  models: Vec<LoadedModel>,
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut embeddings = self.embed_inputs(&[text]).await?;
    embeddings.pop().ok_or(EmbeddingError::ShapeMismatch { expected: 1, got: 0 })
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    self.embed_inputs(texts).await
  }
}
