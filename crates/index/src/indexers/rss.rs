// RSS feed indexer
//
// Feed fetching and XML parsing are external; articles arrive decoded and
// are chunked with their feed provenance attached.

use super::now_secs;
use crate::bridge::plaintext_to_tree;
use crate::chunker::{ChunkParams, chunk_tree};
use ragling_core::{Config, Metadata, Scalar, SourceDocument, SourceType, content_digest};

/// One decoded article from the feed parser.
#[derive(Debug, Clone, Default)]
pub struct FeedArticle {
  pub title: String,
  pub body_text: String,
  /// Stable id used as the document's source path.
  pub article_id: String,
  pub url: String,
  pub feed_name: String,
  pub date_published: String,
  pub feed_category: String,
  pub authors: String,
}

/// Chunk an article into a document for the store.
pub fn index_article(article: &FeedArticle, collection: &str, config: &Config) -> SourceDocument {
  let mut extra = Metadata::new();
  extra.insert("url".to_string(), Scalar::String(article.url.clone()));
  extra.insert("feed_name".to_string(), Scalar::String(article.feed_name.clone()));
  extra.insert("date".to_string(), Scalar::String(article.date_published.clone()));
  extra.insert("feed_category".to_string(), Scalar::String(article.feed_category.clone()));
  extra.insert("authors".to_string(), Scalar::String(article.authors.clone()));

  let tree = plaintext_to_tree(&article.body_text);
  let chunks = chunk_tree(&tree, &article.title, &ChunkParams::from_config(config), &extra);

  SourceDocument {
    collection: collection.to_string(),
    source_path: article.article_id.clone(),
    source_uri: Some(article.url.clone()),
    title: article.title.clone(),
    source_type: SourceType::Rss,
    digest: content_digest(article.body_text.as_bytes()),
    mtime: now_secs(),
    config_hash: config.config_hash(),
    chunks,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn article() -> FeedArticle {
    FeedArticle {
      title: "News Article".to_string(),
      body_text: "Some news happened today.".to_string(),
      article_id: "art-456".to_string(),
      url: "https://example.com/news".to_string(),
      feed_name: "News Feed".to_string(),
      date_published: "2025-06-01T12:00:00".to_string(),
      feed_category: "Politics".to_string(),
      authors: "Bob".to_string(),
    }
  }

  #[test]
  fn test_article_metadata_on_every_chunk() {
    let doc = index_article(&article(), "kitchen", &Config::default());

    assert_eq!(doc.source_type, SourceType::Rss);
    assert_eq!(doc.source_path, "art-456");
    assert_eq!(doc.source_uri.as_deref(), Some("https://example.com/news"));
    assert!(!doc.chunks.is_empty());

    for chunk in &doc.chunks {
      assert_eq!(chunk.metadata["url"], Scalar::String("https://example.com/news".to_string()));
      assert_eq!(chunk.metadata["feed_name"], Scalar::String("News Feed".to_string()));
      assert_eq!(chunk.metadata["date"], Scalar::String("2025-06-01T12:00:00".to_string()));
      assert_eq!(chunk.metadata["feed_category"], Scalar::String("Politics".to_string()));
      assert_eq!(chunk.metadata["authors"], Scalar::String("Bob".to_string()));
    }
  }
}
