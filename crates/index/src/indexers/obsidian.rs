// Obsidian vault indexer
//
// Walks markdown notes in a vault and emits obsidian:// source URIs so
// results deep-link back into the app.

use super::{Indexer, document_from_file, walk_files};
use crate::Result;
use ragling_core::{Config, SourceDocument, SourceType};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct ObsidianIndexer;

impl ObsidianIndexer {
  /// `obsidian://open?vault=<name>&file=<relative path without .md>`
  pub fn source_uri(vault_root: &Path, note: &Path) -> Option<String> {
    let vault = vault_root.file_name()?.to_str()?;
    let relative = note.strip_prefix(vault_root).ok()?;
    let file = relative.with_extension("");
    Some(format!("obsidian://open?vault={}&file={}", vault, file.display()))
  }
}

impl Indexer for ObsidianIndexer {
  fn source_type(&self) -> SourceType {
    SourceType::Obsidian
  }

  fn candidate_files(&self, root: &Path) -> Vec<PathBuf> {
    walk_files(root, false, |path| {
      path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md"))
    })
  }

  fn index(&self, root: &Path, collection: &str, config: &Config) -> Result<Vec<SourceDocument>> {
    let mut documents = Vec::new();

    for path in self.candidate_files(root) {
      let uri = Self::source_uri(root, &path);
      match document_from_file(&path, collection, SourceType::Obsidian, uri, config, None) {
        Ok(Some(doc)) => documents.push(doc),
        Ok(None) => {}
        Err(e) => warn!(path = %path.display(), "skipping note: {e}"),
      }
    }

    info!(vault = %root.display(), documents = documents.len(), "indexed vault");
    Ok(documents)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn make_vault() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(".obsidian")).unwrap();
    fs::write(dir.path().join("Pasta.md"), "# Pasta\n\nBoil water. Add salt.").unwrap();
    fs::create_dir(dir.path().join("daily")).unwrap();
    fs::write(
      dir.path().join("daily/2025-01-01.md"),
      "---\ntags: [journal]\n---\nWrote some notes about [[Pasta]].",
    )
    .unwrap();
    fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
    dir
  }

  #[test]
  fn test_vault_candidates_are_markdown_only() {
    let vault = make_vault();
    let indexer = ObsidianIndexer;
    let files = indexer.candidate_files(vault.path());
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.extension().unwrap() == "md"));
  }

  #[test]
  fn test_index_vault() {
    let vault = make_vault();
    let indexer = ObsidianIndexer;
    let docs = indexer.index(vault.path(), "kitchen", &Config::default()).unwrap();

    assert_eq!(docs.len(), 2);
    for doc in &docs {
      assert_eq!(doc.collection, "kitchen");
      assert_eq!(doc.source_type, SourceType::Obsidian);
      assert!(!doc.chunks.is_empty());
      assert_eq!(doc.config_hash, Config::default().config_hash());
    }

    let pasta = docs.iter().find(|d| d.title == "Pasta").unwrap();
    let vault_name = vault.path().file_name().unwrap().to_str().unwrap();
    assert_eq!(
      pasta.source_uri.as_deref(),
      Some(format!("obsidian://open?vault={vault_name}&file=Pasta").as_str())
    );
  }

  #[test]
  fn test_source_uri_for_nested_note() {
    let vault = make_vault();
    let note = vault.path().join("daily/2025-01-01.md");
    let uri = ObsidianIndexer::source_uri(vault.path(), &note).unwrap();
    assert!(uri.ends_with("&file=daily/2025-01-01"));
  }
}
