// Document table operations
//
// Identity is (collection, source_path). A document whose digest and config
// hash both match the stored row is current: the upsert returns the existing
// id without touching the database.

use rusqlite::{OptionalExtension, Transaction, params};
use ragling_core::{SourceDocument, SourceType};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::store::{IndexStore, Result};

/// Metadata identifying and describing one document row.
#[derive(Debug, Clone)]
pub struct DocumentMeta<'a> {
  pub collection: &'a str,
  pub source_path: &'a str,
  pub title: &'a str,
  pub source_type: SourceType,
  pub source_uri: Option<&'a str>,
  pub digest: &'a str,
  pub mtime: i64,
  pub config_hash: &'a str,
}

impl<'a> From<&'a SourceDocument> for DocumentMeta<'a> {
  fn from(doc: &'a SourceDocument) -> Self {
    Self {
      collection: &doc.collection,
      source_path: &doc.source_path,
      title: &doc.title,
      source_type: doc.source_type,
      source_uri: doc.source_uri.as_deref(),
      digest: &doc.digest,
      mtime: doc.mtime,
      config_hash: &doc.config_hash,
    }
  }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
  pub document_id: i64,
  /// False when the stored row already matched digest and config hash.
  pub changed: bool,
}

impl IndexStore {
  /// Insert or replace a document row.
  ///
  /// An identical `(collection, source_path)` row with matching digest and
  /// config hash is returned as-is with no writes. Otherwise the row is
  /// replaced and its previous chunks, FTS rows, and vectors are deleted in
  /// the same transaction.
  pub fn upsert_document(&self, meta: &DocumentMeta<'_>) -> Result<UpsertOutcome> {
    self.check_writable()?;
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let existing: Option<(i64, String, String)> = tx
      .query_row(
        "SELECT id, content_digest, config_hash FROM documents WHERE collection = ?1 AND source_path = ?2",
        params![meta.collection, meta.source_path],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    let outcome = match existing {
      Some((id, digest, config_hash)) if digest == meta.digest && config_hash == meta.config_hash => {
        debug!(collection = meta.collection, path = meta.source_path, "document unchanged");
        UpsertOutcome {
          document_id: id,
          changed: false,
        }
      }
      Some((id, _, _)) => {
        delete_chunk_rows(&tx, id)?;
        tx.execute(
          "UPDATE documents SET title = ?1, source_type = ?2, source_uri = ?3, content_digest = ?4, \
           mtime = ?5, config_hash = ?6, indexed_at = ?7 WHERE id = ?8",
          params![
            meta.title,
            meta.source_type.as_str(),
            meta.source_uri,
            meta.digest,
            meta.mtime,
            meta.config_hash,
            now_secs(),
            id
          ],
        )?;
        UpsertOutcome {
          document_id: id,
          changed: true,
        }
      }
      None => {
        tx.execute(
          "INSERT INTO documents (collection, source_path, title, source_type, source_uri, content_digest, \
           mtime, config_hash, indexed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          params![
            meta.collection,
            meta.source_path,
            meta.title,
            meta.source_type.as_str(),
            meta.source_uri,
            meta.digest,
            meta.mtime,
            meta.config_hash,
            now_secs()
          ],
        )?;
        UpsertOutcome {
          document_id: tx.last_insert_rowid(),
          changed: true,
        }
      }
    };

    tx.commit()?;
    Ok(outcome)
  }

  /// Cheap pre-check: is the stored row already current for this content?
  pub fn document_is_current(
    &self,
    collection: &str,
    source_path: &str,
    digest: &str,
    config_hash: &str,
  ) -> Result<bool> {
    let conn = self.conn()?;
    let current: Option<i64> = conn
      .query_row(
        "SELECT id FROM documents WHERE collection = ?1 AND source_path = ?2 \
         AND content_digest = ?3 AND config_hash = ?4",
        params![collection, source_path, digest, config_hash],
        |row| row.get(0),
      )
      .optional()?;
    Ok(current.is_some())
  }

  /// Remove a document with its chunks and vectors. Returns whether a row
  /// existed.
  pub fn delete_document(&self, collection: &str, source_path: &str) -> Result<bool> {
    self.check_writable()?;
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let id: Option<i64> = tx
      .query_row(
        "SELECT id FROM documents WHERE collection = ?1 AND source_path = ?2",
        params![collection, source_path],
        |row| row.get(0),
      )
      .optional()?;

    let Some(id) = id else {
      return Ok(false);
    };

    delete_chunk_rows(&tx, id)?;
    tx.execute("DELETE FROM documents WHERE id = ?1", [id])?;
    tx.commit()?;

    debug!(collection, path = source_path, "deleted document");
    Ok(true)
  }

  /// Delete every row belonging to a collection. Returns the number of
  /// documents removed.
  pub fn prune(&self, collection: &str) -> Result<usize> {
    self.check_writable()?;
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let ids: Vec<i64> = {
      let mut stmt = tx.prepare("SELECT id FROM documents WHERE collection = ?1")?;
      let rows = stmt.query_map([collection], |row| row.get(0))?;
      rows.collect::<std::result::Result<_, _>>()?
    };

    for id in &ids {
      delete_chunk_rows(&tx, *id)?;
    }
    tx.execute("DELETE FROM documents WHERE collection = ?1", [collection])?;
    tx.commit()?;

    debug!(collection, documents = ids.len(), "pruned collection");
    Ok(ids.len())
  }

  /// Source paths currently indexed for a collection.
  pub fn indexed_paths(&self, collection: &str) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT source_path FROM documents WHERE collection = ?1 ORDER BY source_path")?;
    let rows = stmt.query_map([collection], |row| row.get(0))?;
    Ok(rows.collect::<std::result::Result<_, _>>()?)
  }
}

/// Delete the chunks of a document together with their FTS and vector rows.
pub(crate) fn delete_chunk_rows(tx: &Transaction<'_>, document_id: i64) -> Result<()> {
  let ids: Vec<i64> = {
    let mut stmt = tx.prepare("SELECT id FROM chunks WHERE document_id = ?1")?;
    let rows = stmt.query_map([document_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<_, _>>()?
  };

  for id in &ids {
    tx.execute("DELETE FROM chunks_fts WHERE rowid = ?1", [id])?;
    tx.execute("DELETE FROM vec_chunks WHERE rowid = ?1", [id])?;
  }
  tx.execute("DELETE FROM chunks WHERE document_id = ?1", [document_id])?;
  Ok(())
}

pub(crate) fn now_secs() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs() as i64
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::DbError;
  use tempfile::TempDir;

  fn meta<'a>() -> DocumentMeta<'a> {
    DocumentMeta {
      collection: "kitchen",
      source_path: "/vault/note.md",
      title: "Note",
      source_type: SourceType::Obsidian,
      source_uri: Some("obsidian://open?vault=vault&file=note"),
      digest: "digest-1",
      mtime: 1_700_000_000,
      config_hash: "hash-1",
    }
  }

  #[test]
  fn test_upsert_then_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = IndexStore::open(&dir.path().join("index.db"), 4).unwrap();

    let first = store.upsert_document(&meta()).unwrap();
    assert!(first.changed);

    let second = store.upsert_document(&meta()).unwrap();
    assert!(!second.changed);
    assert_eq!(second.document_id, first.document_id);
    assert_eq!(store.document_count().unwrap(), 1);
  }

  #[test]
  fn test_upsert_replaces_on_digest_change() {
    let dir = TempDir::new().unwrap();
    let store = IndexStore::open(&dir.path().join("index.db"), 4).unwrap();

    let first = store.upsert_document(&meta()).unwrap();

    let changed = DocumentMeta {
      digest: "digest-2",
      ..meta()
    };
    let second = store.upsert_document(&changed).unwrap();
    assert!(second.changed);
    assert_eq!(second.document_id, first.document_id);
  }

  #[test]
  fn test_upsert_replaces_on_config_hash_change() {
    let dir = TempDir::new().unwrap();
    let store = IndexStore::open(&dir.path().join("index.db"), 4).unwrap();

    store.upsert_document(&meta()).unwrap();
    let changed = DocumentMeta {
      config_hash: "hash-2",
      ..meta()
    };
    assert!(store.upsert_document(&changed).unwrap().changed);
  }

  #[test]
  fn test_document_is_current() {
    let dir = TempDir::new().unwrap();
    let store = IndexStore::open(&dir.path().join("index.db"), 4).unwrap();

    assert!(!store.document_is_current("kitchen", "/vault/note.md", "digest-1", "hash-1").unwrap());
    store.upsert_document(&meta()).unwrap();
    assert!(store.document_is_current("kitchen", "/vault/note.md", "digest-1", "hash-1").unwrap());
    assert!(!store.document_is_current("kitchen", "/vault/note.md", "digest-2", "hash-1").unwrap());
  }

  #[test]
  fn test_delete_document() {
    let dir = TempDir::new().unwrap();
    let store = IndexStore::open(&dir.path().join("index.db"), 4).unwrap();

    store.upsert_document(&meta()).unwrap();
    assert!(store.delete_document("kitchen", "/vault/note.md").unwrap());
    assert!(!store.delete_document("kitchen", "/vault/note.md").unwrap());
    assert_eq!(store.document_count().unwrap(), 0);
  }

  #[test]
  fn test_prune_collection() {
    let dir = TempDir::new().unwrap();
    let store = IndexStore::open(&dir.path().join("index.db"), 4).unwrap();

    store.upsert_document(&meta()).unwrap();
    let other = DocumentMeta {
      collection: "garage",
      source_path: "/repo/readme.md",
      ..meta()
    };
    store.upsert_document(&other).unwrap();

    assert_eq!(store.prune("kitchen").unwrap(), 1);
    assert_eq!(store.document_count().unwrap(), 1);
    assert_eq!(store.indexed_paths("garage").unwrap(), vec!["/repo/readme.md"]);
  }

  #[test]
  fn test_read_only_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.db");
    drop(IndexStore::open(&path, 4).unwrap());

    let follower = IndexStore::open_read_only(&path).unwrap();
    let err = follower.upsert_document(&meta()).unwrap_err();
    assert!(matches!(err, DbError::ReadOnly));
  }
}
