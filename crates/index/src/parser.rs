//! The parser seam: one operation, "produce a document tree from a file".
//!
//! Markdown and plain text are handled here. Heavier formats (PDF, DOCX,
//! HTML, EPUB, audio transcripts) are external converters that plug into the
//! same trait; files without a registered parser are skipped upstream.

use crate::bridge::{markdown_to_tree, plaintext_to_tree};
use crate::markdown::MarkdownNote;
use crate::{IndexError, Result};
use ragling_core::{DocTree, Metadata, Scalar};
use std::path::Path;

/// Output of a format parser, ready for chunking.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
  pub title: String,
  pub tree: DocTree,
  /// Format-specific metadata attached to every chunk of the document.
  pub metadata: Metadata,
  /// Link targets referenced by the document, when the format has links.
  pub links: Vec<String>,
}

pub trait DocumentParser: Send + Sync {
  fn parse(&self, path: &Path) -> Result<ParsedDocument>;
}

/// Obsidian-flavored markdown.
pub struct MarkdownParser;

impl DocumentParser for MarkdownParser {
  fn parse(&self, path: &Path) -> Result<ParsedDocument> {
    let text = std::fs::read_to_string(path)?;
    let filename = path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or("untitled.md");
    let note = MarkdownNote::parse(&text, filename);

    let mut metadata = Metadata::new();
    if !note.tags.is_empty() {
      metadata.insert("tags".to_string(), Scalar::String(note.tags.join(", ")));
    }
    if !note.embeds.is_empty() {
      metadata.insert("embeds".to_string(), Scalar::String(note.embeds.join(", ")));
    }

    Ok(ParsedDocument {
      title: note.title,
      tree: markdown_to_tree(&note.body),
      metadata,
      links: note.links,
    })
  }
}

/// Plain text, paragraphs on blank lines. Also used for source code files.
pub struct PlaintextParser;

impl DocumentParser for PlaintextParser {
  fn parse(&self, path: &Path) -> Result<ParsedDocument> {
    let text = std::fs::read_to_string(path)?;
    let title = path
      .file_stem()
      .and_then(|s| s.to_str())
      .unwrap_or("untitled")
      .to_string();

    Ok(ParsedDocument {
      title,
      tree: plaintext_to_tree(&text),
      metadata: Metadata::new(),
      links: Vec::new(),
    })
  }
}

static MARKDOWN: MarkdownParser = MarkdownParser;
static PLAINTEXT: PlaintextParser = PlaintextParser;

/// Look up a parser for a path by extension.
pub fn parser_for(path: &Path) -> Option<&'static dyn DocumentParser> {
  let ext = path.extension().and_then(|e| e.to_str())?.to_ascii_lowercase();
  match ext.as_str() {
    "md" | "markdown" => Some(&MARKDOWN),
    "txt" | "text" | "rst" | "org" | "log" => Some(&PLAINTEXT),
    _ => None,
  }
}

/// Parse a file with its registered parser.
pub fn parse_file(path: &Path) -> Result<ParsedDocument> {
  match parser_for(path) {
    Some(parser) => parser.parse(path),
    None => Err(IndexError::Unsupported(path.display().to_string())),
  }
}
