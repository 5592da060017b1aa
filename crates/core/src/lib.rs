pub mod config;
pub mod document;
pub mod error;

pub use config::{
  ChunkDefaults, Config, ConfigError, DEFAULT_GROUP, EmbeddingSettings, EnrichmentConfig, GroupName, PathsConfig,
  UserConfig, converter_config_hash, load_config,
};
pub use document::{Chunk, DocTree, Metadata, Node, NodeId, Scalar, SourceDocument, SourceType, content_digest};
pub use error::{Error, Result};
