//! The hybrid search path.
//!
//! Stateless and safe to call concurrently: visible collections from the
//! user context, lexical and vector retrieval side by side, reciprocal-rank
//! fusion, hydration, and per-user path translation. The config snapshot
//! passed in is used for the whole request.

use crate::auth::UserContext;
use crate::path_map::{apply_forward, apply_forward_uri};
use crate::query_log::log_query;
use db::{IndexStore, escape_fts_query};
use embedding::{EmbeddingError, EmbeddingProvider};
use index::{IndexingProgress, ProgressSnapshot};
use ragling_core::{Config, Metadata, SourceType};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Reciprocal-rank fusion constant.
pub const RRF_K: usize = 60;

#[derive(Error, Debug)]
pub enum SearchError {
  #[error(transparent)]
  Embedding(#[from] EmbeddingError),
  #[error("store error: {0}")]
  Store(#[from] db::DbError),
  #[error("retrieval task failed: {0}")]
  Internal(String),
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
  pub query: String,
  pub top_k: usize,
  /// Restrict results to one source type.
  pub source_type: Option<SourceType>,
  /// Restrict results to one collection (intersected with visibility).
  pub collection: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
  pub title: String,
  pub source_path: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source_uri: Option<String>,
  pub source_type: String,
  pub collection: String,
  pub rrf_score: f64,
  pub text: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
  pub results: Vec<SearchResult>,
  /// Present while an indexing burst is in flight.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub indexing: Option<ProgressSnapshot>,
}

/// Fuse ranked id lists: `score(c) = Σ 1 / (60 + rank)`, rank 1-based per
/// list, missing rank contributing 0. Descending score, ties broken by
/// ascending id.
pub fn rrf_fuse(lists: &[Vec<i64>]) -> Vec<(i64, f64)> {
  let mut scores: HashMap<i64, f64> = HashMap::new();

  for list in lists {
    for (position, id) in list.iter().enumerate() {
      *scores.entry(*id).or_insert(0.0) += 1.0 / (RRF_K as f64 + (position + 1) as f64);
    }
  }

  let mut fused: Vec<(i64, f64)> = scores.into_iter().collect();
  fused.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
  fused
}

pub struct SearchEngine {
  store: Arc<IndexStore>,
  provider: Arc<dyn EmbeddingProvider>,
  progress: Arc<IndexingProgress>,
}

impl SearchEngine {
  pub fn new(store: Arc<IndexStore>, provider: Arc<dyn EmbeddingProvider>, progress: Arc<IndexingProgress>) -> Self {
    Self {
      store,
      provider,
      progress,
    }
  }

  pub async fn search(
    &self,
    request: &SearchRequest,
    ctx: &UserContext,
    config: &Config,
  ) -> Result<SearchResponse, SearchError> {
    let started = Instant::now();

    let mut collections = ctx.visible_collections(config.global_collection.as_deref());
    if let Some(filter) = &request.collection {
      collections.retain(|c| c == filter);
    }

    let k = request.top_k.max(1);
    let fetch_k = k.max(RRF_K);
    let query = request.query.trim().to_string();
    let phrase = escape_fts_query(&query);

    let query_vector = self.provider.embed(&query).await?;
    let (lexical_ids, vector_ids) = self
      .retrieve(collections.clone(), phrase, query_vector, fetch_k)
      .await?;

    let fused = rrf_fuse(&[lexical_ids, vector_ids]);
    let score_by_id: HashMap<i64, f64> = fused.iter().copied().collect();
    let top_ids: Vec<i64> = fused.iter().map(|(id, _)| *id).collect();

    let rows = self.store.fetch_chunks(&top_ids)?;
    let results: Vec<SearchResult> = rows
      .into_iter()
      .filter(|row| request.source_type.is_none_or(|st| row.source_type == st))
      .take(k)
      .map(|row| {
        let score = score_by_id.get(&row.chunk_id).copied().unwrap_or(0.0);
        SearchResult {
          title: row.title,
          source_path: apply_forward(&row.source_path, &ctx.path_mappings),
          source_uri: apply_forward_uri(row.source_uri.as_deref(), &ctx.path_mappings),
          source_type: row.source_type.as_str().to_string(),
          collection: row.collection,
          rrf_score: score,
          text: row.text,
          metadata: row.metadata,
        }
      })
      .collect();

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    debug!(
      query = %request.query,
      results = results.len(),
      duration_ms,
      "search complete"
    );

    // Telemetry never fails the query.
    let filters = filters_json(request);
    log_query(&config.query_log_path(), &request.query, &filters, k, &results, duration_ms);

    Ok(SearchResponse {
      results,
      indexing: self.progress.snapshot(),
    })
  }

  /// Lexical and vector retrieval, run side by side.
  ///
  /// An empty escaped phrase skips the lexical stage; vector retrieval
  /// always runs, so such a query degrades to vector-only.
  async fn retrieve(
    &self,
    collections: Vec<String>,
    phrase: String,
    query_vector: Vec<f32>,
    fetch_k: usize,
  ) -> Result<(Vec<i64>, Vec<i64>), SearchError> {
    let lexical_store = self.store.clone();
    let lexical_collections = collections.clone();
    let lexical_task = tokio::task::spawn_blocking(move || {
      if phrase.is_empty() {
        Ok(Vec::new())
      } else {
        lexical_store.search_lexical(&lexical_collections, &phrase, fetch_k)
      }
    });

    let vector_store = self.store.clone();
    let vector_task =
      tokio::task::spawn_blocking(move || vector_store.search_vector(&collections, &query_vector, fetch_k));

    let (lexical, vector) = tokio::join!(lexical_task, vector_task);
    let lexical = lexical.map_err(|e| SearchError::Internal(e.to_string()))??;
    let vector = vector.map_err(|e| SearchError::Internal(e.to_string()))??;

    Ok((
      lexical.into_iter().map(|(id, _)| id).collect(),
      vector.into_iter().map(|(id, _)| id).collect(),
    ))
  }
}

fn filters_json(request: &SearchRequest) -> serde_json::Value {
  let mut filters = serde_json::Map::new();
  if let Some(source_type) = request.source_type {
    filters.insert(
      "source_type".to_string(),
      serde_json::Value::String(source_type.as_str().to_string()),
    );
  }
  if let Some(collection) = &request.collection {
    filters.insert("collection".to_string(), serde_json::Value::String(collection.clone()));
  }
  serde_json::Value::Object(filters)
}
