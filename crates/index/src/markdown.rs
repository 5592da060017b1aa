//! Obsidian-flavored Markdown note parsing.
//!
//! Strips frontmatter and dataview blocks, rewrites wikilinks and
//! transclusions to searchable text, and collects tags and link targets as
//! metadata.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static FRONTMATTER_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)\A---[ \t]*\n(.*?\n)---[ \t]*\n?").unwrap());
static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());
static EMBED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[\[([^\]]+)\]\]").unwrap());
static DATAVIEW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```dataview[ \t]*\n.*?\n```").unwrap());
static INLINE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s)#(\w[\w/-]*)").unwrap());
static CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`]+`").unwrap());
static HEADING_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Parsed representation of an Obsidian markdown note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkdownNote {
  pub title: String,
  /// Body text with frontmatter, dataview blocks, and transclusions removed
  /// and wikilinks rewritten.
  pub body: String,
  pub tags: Vec<String>,
  /// Wikilink targets referenced by the note.
  pub links: Vec<String>,
  /// Transclusion targets (`![[target]]`).
  pub embeds: Vec<String>,
}

impl MarkdownNote {
  /// Parse note text. `filename` supplies the fallback title.
  pub fn parse(text: &str, filename: &str) -> Self {
    let (frontmatter, body) = extract_frontmatter(text);

    let body = DATAVIEW_RE.replace_all(&body, "").into_owned();
    let (body, embeds) = extract_embeds(&body);
    let (body, links) = convert_wikilinks(&body);
    let tags = extract_tags(&body, frontmatter.as_ref());

    let title = frontmatter
      .as_ref()
      .and_then(|fm| fm.get("title"))
      .and_then(|v| v.as_str())
      .filter(|t| !t.is_empty())
      .map(str::to_string)
      .unwrap_or_else(|| file_stem(filename));

    let body = BLANK_RUN_RE.replace_all(&body, "\n\n").trim().to_string();

    Self {
      title,
      body,
      tags,
      links,
      embeds,
    }
  }
}

fn file_stem(filename: &str) -> String {
  std::path::Path::new(filename)
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or(filename)
    .to_string()
}

/// Split YAML frontmatter off the beginning of the text.
fn extract_frontmatter(text: &str) -> (Option<serde_yaml_ng::Mapping>, String) {
  let Some(captures) = FRONTMATTER_RE.captures(text) else {
    return (None, text.to_string());
  };

  let yaml_str = &captures[1];
  let remaining = text[captures.get(0).map(|m| m.end()).unwrap_or(0)..].to_string();

  match serde_yaml_ng::from_str::<serde_yaml_ng::Value>(yaml_str) {
    Ok(serde_yaml_ng::Value::Mapping(mapping)) => (Some(mapping), remaining),
    Ok(_) => (None, remaining),
    Err(e) => {
      warn!("failed to parse frontmatter: {e}");
      (None, remaining)
    }
  }
}

/// Strip `![[embed]]` references, collecting their targets.
fn extract_embeds(text: &str) -> (String, Vec<String>) {
  let mut embeds = Vec::new();
  let cleaned = EMBED_RE
    .replace_all(text, |caps: &regex::Captures<'_>| {
      embeds.push(caps[1].trim().to_string());
      String::new()
    })
    .into_owned();
  (cleaned, embeds)
}

/// Rewrite `[[target|display]]` and `[[target]]` to plain text, collecting
/// targets. Both target and display stay searchable.
fn convert_wikilinks(text: &str) -> (String, Vec<String>) {
  let mut links = Vec::new();
  let converted = WIKILINK_RE
    .replace_all(text, |caps: &regex::Captures<'_>| {
      let inner = &caps[1];
      match inner.split_once('|') {
        Some((target, display)) => {
          let target = target.trim();
          links.push(target.to_string());
          format!("{} ({})", display.trim(), target)
        }
        None => {
          let target = inner.trim();
          links.push(target.to_string());
          target.to_string()
        }
      }
    })
    .into_owned();
  (converted, links)
}

/// Tags from frontmatter plus inline `#tags`.
///
/// Inline tags inside code blocks, inline code, and heading markers are
/// ignored.
fn extract_tags(body: &str, frontmatter: Option<&serde_yaml_ng::Mapping>) -> Vec<String> {
  let mut tags: Vec<String> = Vec::new();

  if let Some(fm_tags) = frontmatter.and_then(|fm| fm.get("tags")) {
    match fm_tags {
      serde_yaml_ng::Value::Sequence(seq) => {
        for value in seq {
          if let Some(tag) = value.as_str() {
            tags.push(tag.to_string());
          }
        }
      }
      serde_yaml_ng::Value::String(s) => {
        tags.extend(s.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string));
      }
      _ => {}
    }
  }

  let cleaned = CODE_BLOCK_RE.replace_all(body, "");
  let cleaned = INLINE_CODE_RE.replace_all(&cleaned, "");
  let cleaned = HEADING_MARKER_RE.replace_all(&cleaned, "");

  for caps in INLINE_TAG_RE.captures_iter(&cleaned) {
    let tag = caps[1].to_string();
    if !tags.contains(&tag) {
      tags.push(tag);
    }
  }

  tags
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_plain_note() {
    let note = MarkdownNote::parse("# Title\n\nSome body text.", "My Note.md");
    assert_eq!(note.title, "My Note");
    assert_eq!(note.body, "# Title\n\nSome body text.");
    assert!(note.tags.is_empty());
    assert!(note.links.is_empty());
  }

  #[test]
  fn test_frontmatter_title_and_tags() {
    let text = "---\ntitle: Better Title\ntags: [cooking, recipes]\n---\n# Heading\nBody.";
    let note = MarkdownNote::parse(text, "note.md");
    assert_eq!(note.title, "Better Title");
    assert_eq!(note.tags, vec!["cooking", "recipes"]);
    assert!(!note.body.contains("Better Title"));
    assert!(note.body.starts_with("# Heading"));
  }

  #[test]
  fn test_frontmatter_comma_tags() {
    let text = "---\ntags: cooking, recipes\n---\nBody.";
    let note = MarkdownNote::parse(text, "note.md");
    assert_eq!(note.tags, vec!["cooking", "recipes"]);
  }

  #[test]
  fn test_bad_frontmatter_is_dropped() {
    let text = "---\n: [unbalanced\n---\nBody text.";
    let note = MarkdownNote::parse(text, "note.md");
    assert_eq!(note.title, "note");
    assert_eq!(note.body, "Body text.");
  }

  #[test]
  fn test_wikilinks_rewritten() {
    let note = MarkdownNote::parse("See [[Other Note]] and [[target|the display]].", "note.md");
    assert_eq!(note.body, "See Other Note and the display (target).");
    assert_eq!(note.links, vec!["Other Note", "target"]);
  }

  #[test]
  fn test_embeds_stripped_and_collected() {
    let note = MarkdownNote::parse("Before ![[image.png]] after.", "note.md");
    assert_eq!(note.body, "Before  after.");
    assert_eq!(note.embeds, vec!["image.png"]);
    assert!(note.links.is_empty());
  }

  #[test]
  fn test_dataview_blocks_removed() {
    let text = "Intro.\n\n```dataview\nLIST FROM #recipes\n```\n\nOutro.";
    let note = MarkdownNote::parse(text, "note.md");
    assert!(!note.body.contains("dataview"));
    assert!(note.body.contains("Intro."));
    assert!(note.body.contains("Outro."));
  }

  #[test]
  fn test_inline_tags() {
    let note = MarkdownNote::parse("Tagged #cooking and #meal/dinner here.", "note.md");
    assert_eq!(note.tags, vec!["cooking", "meal/dinner"]);
  }

  #[test]
  fn test_tags_in_code_ignored() {
    let text = "Real #tag.\n\n```\n#not-a-tag\n```\n\nAnd `#inline` too.";
    let note = MarkdownNote::parse(text, "note.md");
    assert_eq!(note.tags, vec!["tag"]);
  }

  #[test]
  fn test_heading_hashes_are_not_tags() {
    let note = MarkdownNote::parse("# Heading\n\nBody #real.", "note.md");
    assert_eq!(note.tags, vec!["real"]);
  }

  #[test]
  fn test_blank_runs_collapsed() {
    let note = MarkdownNote::parse("a\n\n\n\n\nb", "note.md");
    assert_eq!(note.body, "a\n\nb");
  }
}
