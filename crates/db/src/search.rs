// Lexical and vector retrieval
//
// Both stages are collection-filtered with parameterised SQL and return
// (chunk_id, score) pairs for the fusion step upstream.

use rusqlite::types::Value;
use tracing::trace;

use crate::store::{DbError, IndexStore, Result};
use crate::vector::pack_vector;

/// Escape user input for the FTS MATCH phrase syntax.
///
/// The whole input becomes one literal phrase: internal double quotes are
/// doubled and the result is wrapped in double quotes. Parameterised SQL
/// stops injection; this stops FTS syntax abuse inside the parameter.
pub fn escape_fts_query(query: &str) -> String {
  let stripped = query.trim();
  if stripped.is_empty() {
    return String::new();
  }
  format!("\"{}\"", stripped.replace('"', "\"\""))
}

impl IndexStore {
  /// Phrase search over the FTS index, best match first.
  ///
  /// `query_phrase` must already be escaped; an empty phrase returns no
  /// results. Scores are negated bm25 so higher is better.
  pub fn search_lexical(&self, collections: &[String], query_phrase: &str, k: usize) -> Result<Vec<(i64, f64)>> {
    if query_phrase.is_empty() || collections.is_empty() {
      return Ok(Vec::new());
    }

    let conn = self.conn()?;
    let placeholders = vec!["?"; collections.len()].join(", ");
    let sql = format!(
      "SELECT chunks_fts.rowid, bm25(chunks_fts) \
       FROM chunks_fts \
       JOIN chunks ON chunks.id = chunks_fts.rowid \
       JOIN documents ON documents.id = chunks.document_id \
       WHERE chunks_fts MATCH ? AND documents.collection IN ({placeholders}) \
       ORDER BY bm25(chunks_fts) \
       LIMIT ?"
    );

    let mut values: Vec<Value> = Vec::with_capacity(collections.len() + 2);
    values.push(Value::Text(query_phrase.to_string()));
    values.extend(collections.iter().map(|c| Value::Text(c.clone())));
    values.push(Value::Integer(k as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
      Ok((row.get::<_, i64>(0)?, -row.get::<_, f64>(1)?))
    })?;

    let hits: Vec<(i64, f64)> = rows.collect::<std::result::Result<_, _>>()?;
    trace!(hits = hits.len(), k, "lexical search");
    Ok(hits)
  }

  /// KNN search over the vector index, nearest first.
  ///
  /// Returns (chunk_id, distance) pairs; lower distance is closer.
  pub fn search_vector(&self, collections: &[String], query_vector: &[f32], k: usize) -> Result<Vec<(i64, f64)>> {
    if collections.is_empty() || k == 0 {
      return Ok(Vec::new());
    }
    if query_vector.len() != self.vector_dim() {
      return Err(DbError::DimensionMismatch {
        stored: self.vector_dim(),
        got: query_vector.len(),
      });
    }

    let conn = self.conn()?;
    let placeholders = vec!["?"; collections.len()].join(", ");
    let sql = format!(
      "SELECT rowid, distance FROM vec_chunks \
       WHERE embedding MATCH ? AND k = ? \
       AND rowid IN ( \
         SELECT chunks.id FROM chunks \
         JOIN documents ON documents.id = chunks.document_id \
         WHERE documents.collection IN ({placeholders})) \
       ORDER BY distance"
    );

    let mut values: Vec<Value> = Vec::with_capacity(collections.len() + 2);
    values.push(Value::Blob(pack_vector(query_vector)));
    values.push(Value::Integer(k as i64));
    values.extend(collections.iter().map(|c| Value::Text(c.clone())));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
      Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
    })?;

    let hits: Vec<(i64, f64)> = rows.collect::<std::result::Result<_, _>>()?;
    trace!(hits = hits.len(), k, "vector search");
    Ok(hits)
  }
}
