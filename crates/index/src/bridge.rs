//! Bridges parser output into the common document tree.
//!
//! Every format funnels into a `DocTree` of headings and paragraphs so one
//! chunker handles markdown, e-books, and plain text alike.

use ragling_core::{DocTree, NodeId};
use regex::Regex;
use std::sync::LazyLock;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.+)$").unwrap());
static PARAGRAPH_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Split text on blank lines and add the non-empty paragraphs under `parent`.
fn add_paragraphs(tree: &mut DocTree, text: &str, parent: Option<NodeId>) {
  for para in PARAGRAPH_SPLIT_RE.split(text.trim()) {
    let para = para.trim();
    if !para.is_empty() {
      tree.add_paragraph(para, parent);
    }
  }
}

/// Convert markdown body text into a tree preserving heading hierarchy.
///
/// The body is partitioned at ATX headings; each segment nests under the
/// nearest shallower heading. Text before the first heading becomes
/// top-level paragraphs.
pub fn markdown_to_tree(text: &str) -> DocTree {
  let mut tree = DocTree::new();

  if text.trim().is_empty() {
    return tree;
  }

  // level 1-6 -> most recent heading node at that level
  let mut heading_stack: [Option<NodeId>; 7] = [None; 7];

  let matches: Vec<_> = HEADING_RE.captures_iter(text).collect();

  let preamble_end = matches
    .first()
    .and_then(|caps| caps.get(0))
    .map(|m| m.start())
    .unwrap_or(text.len());
  if !text[..preamble_end].trim().is_empty() {
    add_paragraphs(&mut tree, &text[..preamble_end], None);
  }

  for (i, caps) in matches.iter().enumerate() {
    let level = caps[1].len().min(6) as u8;
    let heading_text = caps[2].trim();

    let body_start = caps.get(0).map(|m| m.end()).unwrap_or(text.len());
    let body_end = matches
      .get(i + 1)
      .and_then(|next| next.get(0))
      .map(|m| m.start())
      .unwrap_or(text.len());
    let body = &text[body_start..body_end];

    // Parent is the nearest shallower heading still on the stack.
    let parent = (1..level).rev().find_map(|lv| heading_stack[lv as usize]);
    let heading_id = tree.add_heading(level, heading_text, parent);

    heading_stack[level as usize] = Some(heading_id);
    for deeper in (level as usize + 1)..7 {
      heading_stack[deeper] = None;
    }

    if !body.trim().is_empty() {
      add_paragraphs(&mut tree, body, Some(heading_id));
    }
  }

  tree
}

/// Convert parsed e-book chapters into a tree with one level-1 heading per
/// chapter.
pub fn epub_to_tree(chapters: &[(u32, String)]) -> DocTree {
  let mut tree = DocTree::new();

  for (chapter_num, text) in chapters {
    let heading = tree.add_heading(1, format!("Chapter {chapter_num}"), None);
    if !text.trim().is_empty() {
      add_paragraphs(&mut tree, text, Some(heading));
    }
  }

  tree
}

/// Convert plain text into a flat tree of paragraphs split on blank lines.
pub fn plaintext_to_tree(text: &str) -> DocTree {
  let mut tree = DocTree::new();

  if text.trim().is_empty() {
    return tree;
  }

  add_paragraphs(&mut tree, text, None);
  tree
}
