//! The per-group index store: one SQLite database holding documents, chunks,
//! the FTS index, and packed embedding vectors (via the sqlite-vec
//! extension).
//!
//! The leader opens read-write and is the only mutator; followers open
//! read-only and rely on WAL snapshot isolation.

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DbError {
  #[error("SQLite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("vector dimension mismatch: store holds {stored}, got {got}")]
  DimensionMismatch { stored: usize, got: usize },
  #[error("chunk/vector count mismatch: {chunks} chunks, {vectors} vectors")]
  CountMismatch { chunks: usize, vectors: usize },
  #[error("store is read-only")]
  ReadOnly,
  #[error("store lock poisoned")]
  Poisoned,
}

pub type Result<T> = std::result::Result<T, DbError>;

static REGISTER_VEC: Once = Once::new();

/// Load sqlite-vec into every connection opened by this process.
fn register_vec_extension() {
  REGISTER_VEC.call_once(|| unsafe {
    rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
      *const (),
      unsafe extern "C" fn(
        *mut rusqlite::ffi::sqlite3,
        *mut *mut i8,
        *const rusqlite::ffi::sqlite3_api_routines,
      ) -> i32,
    >(sqlite_vec::sqlite3_vec_init as *const ())));
  });
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
  id INTEGER PRIMARY KEY,
  collection TEXT NOT NULL,
  source_path TEXT NOT NULL,
  title TEXT NOT NULL,
  source_type TEXT NOT NULL,
  source_uri TEXT,
  content_digest TEXT NOT NULL,
  mtime INTEGER NOT NULL,
  config_hash TEXT NOT NULL,
  indexed_at INTEGER NOT NULL,
  UNIQUE (collection, source_path)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection);

CREATE TABLE IF NOT EXISTS chunks (
  id INTEGER PRIMARY KEY,
  document_id INTEGER NOT NULL REFERENCES documents (id),
  chunk_index INTEGER NOT NULL,
  text TEXT NOT NULL,
  token_count INTEGER NOT NULL,
  metadata TEXT,
  UNIQUE (document_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks (document_id);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(text);
";

/// Handle to one group's index database.
pub struct IndexStore {
  conn: Mutex<Connection>,
  path: PathBuf,
  vector_dim: usize,
  read_only: bool,
}

impl std::fmt::Debug for IndexStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("IndexStore")
      .field("path", &self.path)
      .field("vector_dim", &self.vector_dim)
      .field("read_only", &self.read_only)
      .finish()
  }
}

impl IndexStore {
  /// Open (or create) the store read-write with a fixed vector dimension.
  ///
  /// The dimension is recorded on first open; later opens must match.
  pub fn open(path: &Path, vector_dim: usize) -> Result<Self> {
    register_vec_extension();

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    // These pragmas report their new value as a result row.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.query_row("PRAGMA busy_timeout = 5000", [], |_| Ok(()))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;

    match read_meta_dim(&conn)? {
      Some(stored) if stored != vector_dim => {
        return Err(DbError::DimensionMismatch {
          stored,
          got: vector_dim,
        });
      }
      Some(_) => {}
      None => {
        conn.execute(
          "INSERT INTO meta (key, value) VALUES ('vector_dim', ?1)",
          [vector_dim.to_string()],
        )?;
      }
    }

    conn.execute_batch(&format!(
      "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding float[{vector_dim}]);"
    ))?;

    info!(path = %path.display(), vector_dim, "opened index store");

    Ok(Self {
      conn: Mutex::new(conn),
      path: path.to_path_buf(),
      vector_dim,
      read_only: false,
    })
  }

  /// Open an existing store read-only (follower mode).
  pub fn open_read_only(path: &Path) -> Result<Self> {
    register_vec_extension();

    let conn = Connection::open_with_flags(
      path,
      OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.query_row("PRAGMA busy_timeout = 5000", [], |_| Ok(()))?;

    let vector_dim = read_meta_dim(&conn)?.unwrap_or(0);
    debug!(path = %path.display(), vector_dim, "opened index store read-only");

    Ok(Self {
      conn: Mutex::new(conn),
      path: path.to_path_buf(),
      vector_dim,
      read_only: true,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn vector_dim(&self) -> usize {
    self.vector_dim
  }

  pub fn is_read_only(&self) -> bool {
    self.read_only
  }

  pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| DbError::Poisoned)
  }

  pub(crate) fn check_writable(&self) -> Result<()> {
    if self.read_only { Err(DbError::ReadOnly) } else { Ok(()) }
  }

  /// Total number of documents, across all collections.
  pub fn document_count(&self) -> Result<u64> {
    let conn = self.conn()?;
    let count: u64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
    Ok(count)
  }

  /// Total number of chunks, across all collections.
  pub fn chunk_count(&self) -> Result<u64> {
    let conn = self.conn()?;
    let count: u64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
    Ok(count)
  }
}

fn read_meta_dim(conn: &Connection) -> Result<Option<usize>> {
  let stored: Option<String> = conn
    .query_row("SELECT value FROM meta WHERE key = 'vector_dim'", [], |row| row.get(0))
    .optional()?;
  Ok(stored.and_then(|v| v.parse().ok()))
}
