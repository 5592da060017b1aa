// End-to-end fixture flow: discover -> parse -> chunk -> persist -> hydrate.

use db::IndexStore;
use index::chunker::{ChunkParams, chunk_tree};
use index::indexers::{Indexer, ProjectIndexer};
use ragling_core::{Config, GroupName, Metadata};
use std::fs;
use tempfile::TempDir;

fn fixture_config(dir: &TempDir) -> Config {
  let mut config = Config::default();
  config.group_name = GroupName("fixtures".to_string());
  config.paths.home = dir.path().join("groups");
  config.paths.db_dir = dir.path().join("db");
  config.defaults.chunk_size_tokens = 256;
  config.defaults.chunk_overlap_tokens = 50;
  config
}

#[test]
fn test_fixture_directory_round_trip() {
  let dir = TempDir::new().unwrap();
  let config = fixture_config(&dir);

  let project = config.paths.home.join("kitchen/docs");
  fs::create_dir_all(&project).unwrap();
  fs::write(project.join("test.txt"), "Hello world. ".repeat(200)).unwrap();
  fs::write(
    project.join("test.md"),
    "# Fixtures\n\nTop-level prose.\n\n## Details\n\nNested prose about fixtures.\n",
  )
  .unwrap();

  let documents = ProjectIndexer.index(&project, "kitchen", &config).unwrap();
  assert_eq!(documents.len(), 2);

  // Every document yields at least one chunk, and markdown chunks open with
  // their ancestral headings.
  let markdown = documents.iter().find(|d| d.source_path.ends_with("test.md")).unwrap();
  assert!(!markdown.chunks.is_empty());
  assert!(markdown.chunks.iter().all(|c| c.text.starts_with("Fixtures")));
  assert!(markdown.chunks.iter().any(|c| c.text.starts_with("Fixtures\nDetails\n\n")));

  let plain = documents.iter().find(|d| d.source_path.ends_with("test.txt")).unwrap();
  assert!(!plain.chunks.is_empty());
  assert!(plain.chunks.iter().all(|c| c.token_count <= 256));

  // Persist both documents with stand-in vectors and hydrate everything.
  let store = IndexStore::open(&config.index_db_path(), 4).unwrap();
  for doc in &documents {
    let outcome = store.upsert_document(&db::DocumentMeta::from(doc)).unwrap();
    assert!(outcome.changed);
    let vectors: Vec<Vec<f32>> = doc.chunks.iter().map(|_| vec![0.5; 4]).collect();
    store.insert_chunks(outcome.document_id, &doc.chunks, &vectors).unwrap();
  }

  let total_chunks: usize = documents.iter().map(|d| d.chunks.len()).sum();
  assert_eq!(store.chunk_count().unwrap() as usize, total_chunks);

  let ids: Vec<i64> = (1..=total_chunks as i64).collect();
  let rows = store.fetch_chunks(&ids).unwrap();
  assert_eq!(rows.len(), total_chunks);

  // Rows hydrate against both parent documents.
  let mut parents: Vec<i64> = rows.iter().map(|r| r.document_id).collect();
  parents.sort();
  parents.dedup();
  assert_eq!(parents.len(), 2);

  // Re-indexing the unchanged fixture writes nothing.
  let again = ProjectIndexer.index(&project, "kitchen", &config).unwrap();
  for doc in &again {
    let outcome = store.upsert_document(&db::DocumentMeta::from(doc)).unwrap();
    assert!(!outcome.changed);
  }
  assert_eq!(store.chunk_count().unwrap() as usize, total_chunks);
}

#[test]
fn test_chunker_matches_indexer_output() {
  let dir = TempDir::new().unwrap();
  let config = fixture_config(&dir);

  let project = config.paths.home.join("kitchen/docs");
  fs::create_dir_all(&project).unwrap();
  fs::write(project.join("note.md"), "# Heading\n\nBody text for the chunker.\n").unwrap();

  let documents = ProjectIndexer.index(&project, "kitchen", &config).unwrap();
  let doc = &documents[0];

  let tree = index::bridge::markdown_to_tree("# Heading\n\nBody text for the chunker.\n");
  let direct = chunk_tree(&tree, &doc.title, &ChunkParams::from_config(&config), &Metadata::new());

  assert_eq!(doc.chunks.len(), direct.len());
  assert_eq!(doc.chunks[0].text, direct[0].text);
}
