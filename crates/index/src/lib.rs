pub mod bridge;
pub mod chunker;
pub mod detect;
pub mod indexers;
pub mod markdown;
pub mod parser;
pub mod progress;
pub mod queue;

pub use chunker::{ChunkParams, chunk_tree};
pub use detect::{
  DiscoveredSource, DiscoveryResult, IndexerType, collect_indexable_directories, detect_directory_type,
  detect_indexer_type_for_file, discover_sources,
};
pub use progress::{IndexingProgress, ProgressSnapshot};
pub use queue::{ConfigSource, IndexingQueue, PendingKind, QueueConfig, StaticConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("database error: {0}")]
  Db(#[from] db::DbError),
  #[error("embedding error: {0}")]
  Embedding(#[from] embedding::EmbeddingError),
  #[error("watch error: {0}")]
  Watch(#[from] notify::Error),
  #[error("no parser for {0}")]
  Unsupported(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
