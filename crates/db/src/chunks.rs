// Chunk table operations
//
// Chunks, their FTS rows, and their vectors are written and removed
// together: a reader never sees a partially indexed document.

use rusqlite::{params, types::Value};
use ragling_core::{Chunk, Metadata, SourceType};
use tracing::trace;

use crate::store::{DbError, IndexStore, Result};
use crate::vector::pack_vector;

/// A hydrated chunk joined with its parent document.
#[derive(Debug, Clone)]
pub struct ChunkRow {
  pub chunk_id: i64,
  pub document_id: i64,
  pub chunk_index: u32,
  pub text: String,
  pub token_count: u32,
  pub metadata: Option<Metadata>,
  pub title: String,
  pub collection: String,
  pub source_path: String,
  pub source_uri: Option<String>,
  pub source_type: SourceType,
}

impl IndexStore {
  /// Insert the chunk set of a document with its aligned vectors.
  ///
  /// All chunk rows, FTS rows, and vectors land in one transaction; on any
  /// failure nothing is written. `chunks` and `vectors` must be aligned and
  /// every vector must match the store dimension.
  pub fn insert_chunks(&self, document_id: i64, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    self.check_writable()?;

    if chunks.len() != vectors.len() {
      return Err(DbError::CountMismatch {
        chunks: chunks.len(),
        vectors: vectors.len(),
      });
    }
    for vector in vectors {
      if vector.len() != self.vector_dim() {
        return Err(DbError::DimensionMismatch {
          stored: self.vector_dim(),
          got: vector.len(),
        });
      }
    }

    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    for (chunk, vector) in chunks.iter().zip(vectors) {
      let metadata = if chunk.metadata.is_empty() {
        None
      } else {
        Some(serde_json::to_string(&chunk.metadata)?)
      };

      tx.execute(
        "INSERT INTO chunks (document_id, chunk_index, text, token_count, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![document_id, chunk.chunk_index, chunk.text, chunk.token_count, metadata],
      )?;
      let chunk_id = tx.last_insert_rowid();

      tx.execute(
        "INSERT INTO chunks_fts (rowid, text) VALUES (?1, ?2)",
        params![chunk_id, chunk.text],
      )?;
      tx.execute(
        "INSERT INTO vec_chunks (rowid, embedding) VALUES (?1, ?2)",
        params![chunk_id, pack_vector(vector)],
      )?;
    }

    tx.commit()?;
    trace!(document_id, chunks = chunks.len(), "inserted chunk batch");
    Ok(())
  }

  /// Hydrate chunks by id, joined with their documents, in input order.
  ///
  /// Unknown ids are silently skipped.
  pub fn fetch_chunks(&self, ids: &[i64]) -> Result<Vec<ChunkRow>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let conn = self.conn()?;
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
      "SELECT chunks.id, chunks.document_id, chunks.chunk_index, chunks.text, chunks.token_count, \
       chunks.metadata, documents.title, documents.collection, documents.source_path, documents.source_uri, \
       documents.source_type \
       FROM chunks JOIN documents ON documents.id = chunks.document_id \
       WHERE chunks.id IN ({placeholders})"
    );

    let mut stmt = conn.prepare(&sql)?;
    let values: Vec<Value> = ids.iter().map(|id| Value::Integer(*id)).collect();
    let mut by_id = std::collections::HashMap::with_capacity(ids.len());

    let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
      let metadata_json: Option<String> = row.get(5)?;
      let source_type: String = row.get(10)?;
      Ok((
        row.get::<_, i64>(0)?,
        ChunkRowParts {
          document_id: row.get(1)?,
          chunk_index: row.get(2)?,
          text: row.get(3)?,
          token_count: row.get(4)?,
          metadata_json,
          title: row.get(6)?,
          collection: row.get(7)?,
          source_path: row.get(8)?,
          source_uri: row.get(9)?,
          source_type,
        },
      ))
    })?;

    for row in rows {
      let (chunk_id, parts) = row?;
      let metadata = match parts.metadata_json {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
      };
      by_id.insert(
        chunk_id,
        ChunkRow {
          chunk_id,
          document_id: parts.document_id,
          chunk_index: parts.chunk_index,
          text: parts.text,
          token_count: parts.token_count,
          metadata,
          title: parts.title,
          collection: parts.collection,
          source_path: parts.source_path,
          source_uri: parts.source_uri,
          source_type: SourceType::parse(&parts.source_type).unwrap_or(SourceType::Project),
        },
      );
    }

    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
  }

  /// Number of chunks stored for one document.
  pub fn chunk_count_for_document(&self, document_id: i64) -> Result<u64> {
    let conn = self.conn()?;
    let count: u64 = conn.query_row(
      "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
      [document_id],
      |row| row.get(0),
    )?;
    Ok(count)
  }
}

struct ChunkRowParts {
  document_id: i64,
  chunk_index: u32,
  text: String,
  token_count: u32,
  metadata_json: Option<String>,
  title: String,
  collection: String,
  source_path: String,
  source_uri: Option<String>,
  source_type: String,
}
