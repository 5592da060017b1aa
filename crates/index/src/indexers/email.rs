// Email archive indexer
//
// The mailbox parser is an external collaborator; it hands over decoded
// messages and this module turns each one into a chunked document keyed by
// message id.

use super::now_secs;
use crate::bridge::plaintext_to_tree;
use crate::chunker::{ChunkParams, chunk_tree};
use ragling_core::{Config, Metadata, Scalar, SourceDocument, SourceType, content_digest};

/// One decoded message from the mailbox parser.
#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
  pub subject: String,
  pub body_text: String,
  /// Stable id used as the document's source path.
  pub message_id: String,
  pub sender: String,
  pub recipients: String,
  pub date: String,
  pub folder: String,
}

/// Chunk a message into a document for the store.
///
/// Sender, recipients, date, and folder travel on every chunk so search
/// results can show provenance without a second lookup.
pub fn index_email(message: &EmailMessage, collection: &str, config: &Config) -> SourceDocument {
  let mut extra = Metadata::new();
  extra.insert("sender".to_string(), Scalar::String(message.sender.clone()));
  extra.insert("recipients".to_string(), Scalar::String(message.recipients.clone()));
  extra.insert("date".to_string(), Scalar::String(message.date.clone()));
  extra.insert("folder".to_string(), Scalar::String(message.folder.clone()));

  let tree = plaintext_to_tree(&message.body_text);
  let chunks = chunk_tree(&tree, &message.subject, &ChunkParams::from_config(config), &extra);

  SourceDocument {
    collection: collection.to_string(),
    source_path: message.message_id.clone(),
    source_uri: None,
    title: message.subject.clone(),
    source_type: SourceType::Email,
    digest: content_digest(message.body_text.as_bytes()),
    mtime: now_secs(),
    config_hash: config.config_hash(),
    chunks,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn message() -> EmailMessage {
    EmailMessage {
      subject: "Meeting".to_string(),
      body_text: "Let's meet on Tuesday.\n\nBring the notes.".to_string(),
      message_id: "msg-456".to_string(),
      sender: "alice@example.com".to_string(),
      recipients: "bob@example.com".to_string(),
      date: "2025-01-01T00:00:00".to_string(),
      folder: "Sent".to_string(),
    }
  }

  #[test]
  fn test_email_metadata_on_every_chunk() {
    let doc = index_email(&message(), "kitchen", &Config::default());

    assert_eq!(doc.source_type, SourceType::Email);
    assert_eq!(doc.source_path, "msg-456");
    assert_eq!(doc.title, "Meeting");
    assert!(!doc.chunks.is_empty());

    for chunk in &doc.chunks {
      assert_eq!(chunk.metadata["sender"], Scalar::String("alice@example.com".to_string()));
      assert_eq!(chunk.metadata["recipients"], Scalar::String("bob@example.com".to_string()));
      assert_eq!(chunk.metadata["date"], Scalar::String("2025-01-01T00:00:00".to_string()));
      assert_eq!(chunk.metadata["folder"], Scalar::String("Sent".to_string()));
    }
  }

  #[test]
  fn test_email_digest_tracks_body() {
    let config = Config::default();
    let a = index_email(&message(), "kitchen", &config);
    let mut changed = message();
    changed.body_text.push_str(" PS: bring coffee.");
    let b = index_email(&changed, "kitchen", &config);

    assert_ne!(a.digest, b.digest);
  }
}
