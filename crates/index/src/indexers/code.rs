// Git repository indexer
//
// Walks a repo honouring .gitignore and indexes text-like files as plain
// documents. Source files are deliberately read as text, not parsed; the
// lexical index does the heavy lifting for code search.

use super::{Indexer, document_from_file, walk_files};
use crate::parser::PlaintextParser;
use crate::Result;
use ragling_core::{Config, SourceDocument, SourceType};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const TEXT_EXTENSIONS: &[&str] = &[
  "md", "markdown", "txt", "rst", "org", "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp", "hpp",
  "rb", "php", "sh", "bash", "sql", "toml", "yaml", "yml", "json", "css", "html",
];

pub struct CodeIndexer;

impl Indexer for CodeIndexer {
  fn source_type(&self) -> SourceType {
    SourceType::Code
  }

  fn candidate_files(&self, root: &Path) -> Vec<PathBuf> {
    walk_files(root, true, |path| {
      path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
    })
  }

  fn index(&self, root: &Path, collection: &str, config: &Config) -> Result<Vec<SourceDocument>> {
    let parser = PlaintextParser;
    let mut documents = Vec::new();

    for path in self.candidate_files(root) {
      let uri = Some(format!("vscode://file{}", path.display()));
      match document_from_file(&path, collection, SourceType::Code, uri, config, Some(&parser)) {
        Ok(Some(doc)) => documents.push(doc),
        Ok(None) => {}
        // Binary-ish or unreadable files are logged and skipped.
        Err(e) => warn!(path = %path.display(), "skipping file: {e}"),
      }
    }

    info!(repo = %root.display(), documents = documents.len(), "indexed repository");
    Ok(documents)
  }
}
