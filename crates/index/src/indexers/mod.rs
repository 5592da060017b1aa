//! Typed indexers sharing one contract: turn a source into `SourceDocument`s.
//!
//! Directory-shaped sources (vaults, repos, plain projects) walk the
//! filesystem; email and RSS indexers receive records from their external
//! parsers instead.

pub mod code;
pub mod email;
pub mod obsidian;
pub mod project;
pub mod rss;

pub use code::CodeIndexer;
pub use email::{EmailMessage, index_email};
pub use obsidian::ObsidianIndexer;
pub use project::ProjectIndexer;
pub use rss::{FeedArticle, index_article};

use crate::chunker::{ChunkParams, chunk_tree};
use crate::detect::IndexerType;
use crate::parser::{DocumentParser, parser_for};
use crate::Result;
use ragling_core::{Config, SourceDocument, SourceType, content_digest};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Files larger than this are skipped by the directory indexers.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

pub trait Indexer: Send + Sync {
  fn source_type(&self) -> SourceType;

  /// Files under `root` this indexer would process.
  fn candidate_files(&self, root: &Path) -> Vec<PathBuf>;

  /// Index every candidate file under `root` into `collection`.
  fn index(&self, root: &Path, collection: &str, config: &Config) -> Result<Vec<SourceDocument>>;
}

/// Dispatch a detected directory type to its indexer.
pub fn indexer_for(kind: IndexerType) -> Option<Box<dyn Indexer>> {
  match kind {
    IndexerType::Obsidian => Some(Box::new(ObsidianIndexer)),
    IndexerType::Code => Some(Box::new(CodeIndexer)),
    IndexerType::Project => Some(Box::new(ProjectIndexer)),
    _ => None,
  }
}

/// Build one `SourceDocument` from a file on disk.
///
/// Returns `Ok(None)` when no parser is registered for the file. `parser`
/// overrides the extension registry (the code indexer reads source files as
/// plain text).
pub fn document_from_file(
  path: &Path,
  collection: &str,
  source_type: SourceType,
  source_uri: Option<String>,
  config: &Config,
  parser: Option<&dyn DocumentParser>,
) -> Result<Option<SourceDocument>> {
  let parser = match parser.or_else(|| parser_for(path)) {
    Some(parser) => parser,
    None => {
      debug!(path = %path.display(), "no parser registered, skipping");
      return Ok(None);
    }
  };

  let bytes = std::fs::read(path)?;
  let digest = content_digest(&bytes);
  let mtime = file_mtime(path)?;

  let parsed = parser.parse(path)?;
  let chunks = chunk_tree(
    &parsed.tree,
    &parsed.title,
    &ChunkParams::from_config(config),
    &parsed.metadata,
  );

  Ok(Some(SourceDocument {
    collection: collection.to_string(),
    source_path: path.display().to_string(),
    source_uri,
    title: parsed.title,
    source_type,
    digest,
    mtime,
    config_hash: config.config_hash(),
    chunks,
  }))
}

pub(crate) fn file_mtime(path: &Path) -> std::io::Result<i64> {
  let modified = std::fs::metadata(path)?.modified()?;
  Ok(
    modified
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs() as i64,
  )
}

pub(crate) fn now_secs() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs() as i64
}

/// Walk `root`, skipping hidden entries, yielding files that pass `keep`.
pub(crate) fn walk_files(root: &Path, respect_gitignore: bool, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
  let mut walker = ignore::WalkBuilder::new(root);
  walker
    .hidden(true)
    .git_ignore(respect_gitignore)
    .git_global(false)
    .git_exclude(respect_gitignore)
    .require_git(false);

  let mut files: Vec<PathBuf> = walker
    .build()
    .flatten()
    .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
    .map(|entry| entry.into_path())
    .filter(|path| keep(path))
    .filter(|path| {
      std::fs::metadata(path)
        .map(|m| m.len() <= MAX_FILE_SIZE)
        .unwrap_or(false)
    })
    .collect();
  files.sort();
  files
}
