//! Source discovery and indexer dispatch.
//!
//! Directories are classified by marker: `.obsidian/` makes a vault, `.git/`
//! makes a code repository, anything else is a plain project. A vault under
//! git tracking is still a vault, so obsidian wins ties.

use ragling_core::SourceType;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The indexer families ragling routes work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerType {
  Project,
  Code,
  Obsidian,
  Email,
  Calibre,
  Rss,
  Prune,
}

impl IndexerType {
  pub fn as_str(&self) -> &'static str {
    match self {
      IndexerType::Project => "project",
      IndexerType::Code => "code",
      IndexerType::Obsidian => "obsidian",
      IndexerType::Email => "email",
      IndexerType::Calibre => "calibre",
      IndexerType::Rss => "rss",
      IndexerType::Prune => "prune",
    }
  }

  pub fn source_type(&self) -> SourceType {
    match self {
      IndexerType::Obsidian => SourceType::Obsidian,
      IndexerType::Code => SourceType::Code,
      IndexerType::Email => SourceType::Email,
      IndexerType::Rss => SourceType::Rss,
      IndexerType::Calibre => SourceType::Calibre,
      IndexerType::Project | IndexerType::Prune => SourceType::Project,
    }
  }
}

impl std::fmt::Display for IndexerType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Classify a directory by its marker entries.
pub fn detect_directory_type(directory: &Path) -> IndexerType {
  if directory.join(".obsidian").is_dir() {
    return IndexerType::Obsidian;
  }
  if directory.join(".git").is_dir() {
    return IndexerType::Code;
  }
  IndexerType::Project
}

/// Classify a single file by walking its ancestors toward the root.
///
/// Returns on the first directory that carries a marker; obsidian beats code
/// when both markers sit at the same level.
pub fn detect_indexer_type_for_file(path: &Path) -> IndexerType {
  for ancestor in path.ancestors().skip(1) {
    if ancestor.join(".obsidian").is_dir() {
      return IndexerType::Obsidian;
    }
    if ancestor.join(".git").is_dir() {
      return IndexerType::Code;
    }
  }
  IndexerType::Project
}

/// Directories under `home` that belong to configured users.
///
/// Dot-prefixed usernames and missing directories are skipped.
pub fn collect_indexable_directories(home: &Path, usernames: &[String]) -> Vec<PathBuf> {
  let mut dirs = Vec::new();
  for username in usernames {
    if username.starts_with('.') {
      continue;
    }
    let user_dir = home.join(username);
    if user_dir.is_dir() {
      dirs.push(user_dir);
    } else {
      debug!(dir = %user_dir.display(), "user directory not found");
    }
  }
  dirs
}

/// A classified directory found under a group root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
  pub path: PathBuf,
  pub relative_name: String,
  pub source_type: IndexerType,
}

/// Shallow classification of a directory's immediate children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryResult {
  pub vaults: Vec<DiscoveredSource>,
  pub repos: Vec<DiscoveredSource>,
  pub leftover_paths: Vec<PathBuf>,
}

/// Classify the immediate subdirectories of `root` into vaults, repos, and
/// plain leftovers. Dot-prefixed entries are skipped.
pub fn discover_sources(root: &Path) -> DiscoveryResult {
  let mut result = DiscoveryResult::default();

  let Ok(entries) = std::fs::read_dir(root) else {
    return result;
  };

  let mut children: Vec<PathBuf> = entries
    .flatten()
    .map(|entry| entry.path())
    .filter(|path| path.is_dir())
    .filter(|path| {
      path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.'))
    })
    .collect();
  children.sort();

  for path in children {
    let relative_name = path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or_default()
      .to_string();

    match detect_directory_type(&path) {
      IndexerType::Obsidian => result.vaults.push(DiscoveredSource {
        path,
        relative_name,
        source_type: IndexerType::Obsidian,
      }),
      IndexerType::Code => result.repos.push(DiscoveredSource {
        path,
        relative_name,
        source_type: IndexerType::Code,
      }),
      _ => result.leftover_paths.push(path),
    }
  }

  result
}
