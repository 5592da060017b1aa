//! Append-only query telemetry.
//!
//! One JSON object per line, fsync'd per record so `tail -f` consumers see
//! entries immediately. The OS append guarantee makes concurrent writers
//! safe without a lock. Logging is best-effort and never fails a query.

use crate::search::SearchResult;
use chrono::Utc;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::warn;

#[derive(Serialize)]
struct LogRecord<'a> {
  timestamp: String,
  query: &'a str,
  filters: &'a serde_json::Value,
  top_k: usize,
  results: Vec<LogResult<'a>>,
  duration_ms: f64,
}

#[derive(Serialize)]
struct LogResult<'a> {
  rank: usize,
  title: &'a str,
  source_path: &'a str,
  source_type: &'a str,
  collection: &'a str,
  rrf_score: f64,
}

/// Append one query record. Failures are logged and swallowed.
pub fn log_query(
  path: &Path,
  query: &str,
  filters: &serde_json::Value,
  top_k: usize,
  results: &[SearchResult],
  duration_ms: f64,
) {
  let record = LogRecord {
    timestamp: Utc::now().to_rfc3339(),
    query,
    filters,
    top_k,
    results: results
      .iter()
      .enumerate()
      .map(|(rank, result)| LogResult {
        rank,
        title: &result.title,
        source_path: &result.source_path,
        source_type: &result.source_type,
        collection: &result.collection,
        rrf_score: result.rrf_score,
      })
      .collect(),
    duration_ms: (duration_ms * 10.0).round() / 10.0,
  };

  if let Err(e) = append_record(path, &record) {
    warn!(path = %path.display(), "failed to write query log: {e}");
  }
}

fn append_record(path: &Path, record: &LogRecord<'_>) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }

  let mut file = open_append(path)?;
  let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
  writeln!(file, "{line}")?;
  file.sync_all()?;
  Ok(())
}

#[cfg(unix)]
fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
  use std::os::unix::fs::OpenOptionsExt;
  std::fs::OpenOptions::new()
    .append(true)
    .create(true)
    .mode(0o644)
    .open(path)
}

#[cfg(not(unix))]
fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
  std::fs::OpenOptions::new().append(true).create(true).open(path)
}
