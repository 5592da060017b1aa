//! Heading-contextualised chunking over document trees.
//!
//! Each chunk carries its ancestral heading texts as a prefix so retrieval
//! sees "where in the document" a fragment lives. Token counts are
//! approximated by whitespace words; chunks never span heading boundaries.

use ragling_core::{Chunk, Config, DocTree, Metadata, Node, NodeId};

/// Chunking knobs, normally taken from the config's `[defaults]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
  pub chunk_size_tokens: usize,
  pub chunk_overlap_tokens: usize,
}

impl ChunkParams {
  pub fn from_config(config: &Config) -> Self {
    Self {
      chunk_size_tokens: config.defaults.chunk_size_tokens,
      chunk_overlap_tokens: config.defaults.chunk_overlap_tokens,
    }
  }
}

impl Default for ChunkParams {
  fn default() -> Self {
    Self {
      chunk_size_tokens: 256,
      chunk_overlap_tokens: 50,
    }
  }
}

/// Chunk a document tree.
///
/// Consecutive paragraphs under the same heading path form one segment;
/// segments longer than the chunk budget are windowed with
/// `chunk_overlap_tokens` words carried between consecutive windows.
/// `extra_metadata` is attached verbatim to every chunk.
pub fn chunk_tree(tree: &DocTree, title: &str, params: &ChunkParams, extra_metadata: &Metadata) -> Vec<Chunk> {
  let mut builder = ChunkBuilder {
    params,
    title,
    extra_metadata,
    chunks: Vec::new(),
  };

  let mut path = Vec::new();
  builder.walk(tree, tree.roots(), &mut path);
  builder.chunks
}

struct ChunkBuilder<'a> {
  params: &'a ChunkParams,
  title: &'a str,
  extra_metadata: &'a Metadata,
  chunks: Vec<Chunk>,
}

impl ChunkBuilder<'_> {
  fn walk(&mut self, tree: &DocTree, ids: &[NodeId], path: &mut Vec<String>) {
    let mut paragraphs: Vec<&str> = Vec::new();

    for &id in ids {
      match tree.node(id) {
        Node::Paragraph { text } => paragraphs.push(text),
        Node::Heading { text, children, .. } => {
          self.flush_segment(&paragraphs, path);
          paragraphs.clear();

          path.push(text.clone());
          self.walk(tree, children, path);
          path.pop();
        }
      }
    }

    self.flush_segment(&paragraphs, path);
  }

  /// Emit chunks for one run of paragraphs under a single heading path.
  fn flush_segment(&mut self, paragraphs: &[&str], path: &[String]) {
    if paragraphs.is_empty() {
      return;
    }

    let context = path.join("\n");
    let context_tokens = context.split_whitespace().count();
    let body = paragraphs.join("\n\n");
    let words: Vec<&str> = body.split_whitespace().collect();

    // Body budget after the heading prefix; must exceed the overlap so
    // windows always advance.
    let budget = self
      .params
      .chunk_size_tokens
      .saturating_sub(context_tokens)
      .max(self.params.chunk_overlap_tokens + 1);

    if words.len() <= budget {
      // Fits whole: keep the original paragraph breaks.
      self.push_chunk(&context, &body, context_tokens + words.len());
      return;
    }

    let mut start = 0;
    while start < words.len() {
      let end = (start + budget).min(words.len());
      let window = words[start..end].join(" ");
      self.push_chunk(&context, &window, context_tokens + (end - start));

      if end == words.len() {
        break;
      }
      start = end - self.params.chunk_overlap_tokens;
    }
  }

  fn push_chunk(&mut self, context: &str, body: &str, token_count: usize) {
    let text = if context.is_empty() {
      body.to_string()
    } else {
      format!("{context}\n\n{body}")
    };

    self.chunks.push(Chunk {
      text,
      title: self.title.to_string(),
      chunk_index: self.chunks.len() as u32,
      token_count: token_count as u32,
      metadata: self.extra_metadata.clone(),
    });
  }
}
