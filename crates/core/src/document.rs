//! Document model shared by parsing, chunking, and persistence.
//!
//! Parsers produce a `DocTree` of headings and paragraphs; the chunker turns
//! trees into `Chunk` records; indexers wrap chunks in a `SourceDocument`
//! for the persistence layer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A single metadata value.
///
/// Parsers emit free-form dictionaries (page numbers, senders, feed names);
/// the store and search path pass these through opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
}

impl From<&str> for Scalar {
  fn from(value: &str) -> Self {
    Scalar::String(value.to_string())
  }
}

impl From<String> for Scalar {
  fn from(value: String) -> Self {
    Scalar::String(value)
  }
}

impl From<i64> for Scalar {
  fn from(value: i64) -> Self {
    Scalar::Int(value)
  }
}

impl From<f64> for Scalar {
  fn from(value: f64) -> Self {
    Scalar::Float(value)
  }
}

impl From<bool> for Scalar {
  fn from(value: bool) -> Self {
    Scalar::Bool(value)
  }
}

/// Free-form chunk metadata, ordered for stable serialization.
pub type Metadata = BTreeMap<String, Scalar>;

/// Index into a `DocTree` arena.
pub type NodeId = usize;

/// A node in a parsed document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
  Heading {
    /// Heading level, 1-6.
    level: u8,
    text: String,
    children: Vec<NodeId>,
  },
  Paragraph {
    text: String,
  },
}

/// A parsed document as a single rooted heading/paragraph tree.
///
/// Nodes live in one owned arena and children are indices into it, so trees
/// stay cheaply movable. Top-level nodes (preamble paragraphs and level-1
/// headings) are collected in `roots`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocTree {
  nodes: Vec<Node>,
  roots: Vec<NodeId>,
}

impl DocTree {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn roots(&self) -> &[NodeId] {
    &self.roots
  }

  pub fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id]
  }

  /// Add a heading under `parent` (or at top level), returning its id.
  ///
  /// Level is clamped to 1-6. `parent` must refer to a heading.
  pub fn add_heading(&mut self, level: u8, text: impl Into<String>, parent: Option<NodeId>) -> NodeId {
    let id = self.nodes.len();
    self.nodes.push(Node::Heading {
      level: level.clamp(1, 6),
      text: text.into(),
      children: Vec::new(),
    });
    self.attach(id, parent);
    id
  }

  /// Add a paragraph under `parent` (or at top level), returning its id.
  pub fn add_paragraph(&mut self, text: impl Into<String>, parent: Option<NodeId>) -> NodeId {
    let id = self.nodes.len();
    self.nodes.push(Node::Paragraph { text: text.into() });
    self.attach(id, parent);
    id
  }

  fn attach(&mut self, id: NodeId, parent: Option<NodeId>) {
    match parent {
      Some(parent_id) => match &mut self.nodes[parent_id] {
        Node::Heading { children, .. } => children.push(id),
        // Paragraphs cannot have children; fall back to top level.
        Node::Paragraph { .. } => self.roots.push(id),
      },
      None => self.roots.push(id),
    }
  }
}

/// What kind of source a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
  Obsidian,
  Code,
  Project,
  Email,
  Rss,
  Calibre,
}

impl SourceType {
  pub fn as_str(&self) -> &'static str {
    match self {
      SourceType::Obsidian => "obsidian",
      SourceType::Code => "code",
      SourceType::Project => "project",
      SourceType::Email => "email",
      SourceType::Rss => "rss",
      SourceType::Calibre => "calibre",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "obsidian" => Some(SourceType::Obsidian),
      "code" => Some(SourceType::Code),
      "project" => Some(SourceType::Project),
      "email" => Some(SourceType::Email),
      "rss" => Some(SourceType::Rss),
      "calibre" => Some(SourceType::Calibre),
      _ => None,
    }
  }
}

impl fmt::Display for SourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A bounded, heading-contextualised fragment of a document.
///
/// Chunks are immutable; re-indexing a document replaces its chunks as a
/// set. `chunk_index` is dense and zero-based within the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
  /// Chunk text with ancestral heading context already prepended.
  pub text: String,
  /// Title of the owning document.
  pub title: String,
  pub chunk_index: u32,
  /// Approximate token count of `text`.
  pub token_count: u32,
  #[serde(default)]
  pub metadata: Metadata,
}

/// A fully prepared document flowing from an indexer to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
  pub collection: String,
  /// Canonical path (or stable id for email/RSS sources).
  pub source_path: String,
  pub source_uri: Option<String>,
  pub title: String,
  pub source_type: SourceType,
  /// Byte-level content digest at index time.
  pub digest: String,
  /// Source mtime observed at index time, seconds since epoch.
  pub mtime: i64,
  /// Hash of the enrichment settings the document was converted under.
  pub config_hash: String,
  pub chunks: Vec<Chunk>,
}

/// SHA-256 hex digest of raw content bytes.
pub fn content_digest(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}
