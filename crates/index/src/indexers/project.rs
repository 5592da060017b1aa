// Plain project directory indexer
//
// Routes mixed document folders through the parser registry; anything
// without a registered parser is left alone.

use super::{Indexer, document_from_file, walk_files};
use crate::parser::parser_for;
use crate::Result;
use ragling_core::{Config, SourceDocument, SourceType};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct ProjectIndexer;

impl Indexer for ProjectIndexer {
  fn source_type(&self) -> SourceType {
    SourceType::Project
  }

  fn candidate_files(&self, root: &Path) -> Vec<PathBuf> {
    walk_files(root, false, |path| parser_for(path).is_some())
  }

  fn index(&self, root: &Path, collection: &str, config: &Config) -> Result<Vec<SourceDocument>> {
    let mut documents = Vec::new();

    for path in self.candidate_files(root) {
      let uri = Some(format!("file://{}", path.display()));
      match document_from_file(&path, collection, SourceType::Project, uri, config, None) {
        Ok(Some(doc)) => documents.push(doc),
        Ok(None) => {}
        Err(e) => warn!(path = %path.display(), "skipping document: {e}"),
      }
    }

    info!(project = %root.display(), documents = documents.len(), "indexed project directory");
    Ok(documents)
  }
}
