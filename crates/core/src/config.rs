//! Configuration for a ragling index group.
//!
//! A `Config` is an immutable snapshot loaded from a TOML file. Reload never
//! mutates an existing snapshot; the config watcher parses a fresh one and
//! swaps the shared reference.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_GROUP: &str = "default";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// Per-user record from the `[users.<name>]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
  /// API key presented by the user's client. Compared in constant time.
  pub api_key: String,
  /// Extra system collections this user may search (e.g. a shared corpus).
  pub system_collections: Vec<String>,
  /// Host-prefix to container-prefix path translations for this user.
  pub path_mappings: BTreeMap<String, String>,
}

/// Chunking defaults from the `[defaults]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkDefaults {
  pub chunk_size_tokens: usize,
  pub chunk_overlap_tokens: usize,
}

impl Default for ChunkDefaults {
  fn default() -> Self {
    Self {
      chunk_size_tokens: 256,
      chunk_overlap_tokens: 50,
    }
  }
}

/// Embedding service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
  /// Model name passed to the embedding endpoint.
  pub model: String,
  /// Vector dimensions produced by the model. Fixed per database instance.
  pub dimensions: usize,
  /// Remote Ollama host (e.g. "http://gpu:11434"). None means localhost.
  pub ollama_host: Option<String>,
  /// keep_alive value forwarded with embed requests.
  pub keep_alive: String,
}

impl EmbeddingSettings {
  /// The host embed requests are sent to.
  pub fn host(&self) -> &str {
    self.ollama_host.as_deref().unwrap_or("http://localhost:11434")
  }
}

impl Default for EmbeddingSettings {
  fn default() -> Self {
    Self {
      model: "mxbai-embed-large".to_string(),
      dimensions: 1024,
      ollama_host: None,
      keep_alive: "5m".to_string(),
    }
  }
}

/// Document conversion enrichment flags.
///
/// These settings change what the converters emit, so they are folded into
/// the config hash that pins each indexed document to its settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
  pub image_description: bool,
  pub code_enrichment: bool,
  pub formula_enrichment: bool,
  pub table_structure: bool,
}

impl Default for EnrichmentConfig {
  fn default() -> Self {
    Self {
      image_description: true,
      code_enrichment: true,
      formula_enrichment: true,
      table_structure: true,
    }
  }
}

/// Filesystem locations from the `[paths]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
  /// Group root containing one subdirectory per configured user.
  pub home: PathBuf,
  /// Directory holding index databases and the query log.
  pub db_dir: PathBuf,
}

impl Default for PathsConfig {
  fn default() -> Self {
    let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    Self {
      home: base.join("ragling"),
      db_dir: base.join(".ragling"),
    }
  }
}

/// Group name newtype so the serde default is "default" rather than "".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(pub String);

impl Default for GroupName {
  fn default() -> Self {
    Self(DEFAULT_GROUP.to_string())
  }
}

impl std::ops::Deref for GroupName {
  type Target = str;

  fn deref(&self) -> &str {
    &self.0
  }
}

/// Immutable configuration snapshot for one ragling process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub group_name: GroupName,
  pub paths: PathsConfig,
  pub defaults: ChunkDefaults,
  pub embedding: EmbeddingSettings,
  pub enrichments: EnrichmentConfig,
  /// Collection every user may search in addition to their own.
  pub global_collection: Option<String>,
  pub users: BTreeMap<String, UserConfig>,
}

impl Config {
  /// Path of this group's index database.
  pub fn index_db_path(&self) -> PathBuf {
    if *self.group_name == *DEFAULT_GROUP {
      self.paths.db_dir.join("ragling.db")
    } else {
      self.paths.db_dir.join(format!("ragling-{}.db", &*self.group_name))
    }
  }

  /// Path of the append-only query log.
  pub fn query_log_path(&self) -> PathBuf {
    self.paths.db_dir.join("queries.jsonl")
  }

  /// Usernames in stable order.
  pub fn usernames(&self) -> Vec<String> {
    self.users.keys().cloned().collect()
  }

  /// Hash pinning documents to the enrichment settings and conversion
  /// backend that produced them.
  pub fn config_hash(&self) -> String {
    let backend = self.embedding.ollama_host.as_deref().map(|_| "ollama");
    converter_config_hash(&self.enrichments, backend)
  }
}

/// Deterministic digest over the enrichment flags and conversion backend.
///
/// Two flag sets hash equal iff they are field-equal; any change invalidates
/// previously indexed documents. Truncated SHA-256, 16 hex digits.
pub fn converter_config_hash(enrichments: &EnrichmentConfig, vlm_backend: Option<&str>) -> String {
  let canonical = format!(
    "image_description={}|code_enrichment={}|formula_enrichment={}|table_structure={}|vlm_backend={}",
    enrichments.image_description,
    enrichments.code_enrichment,
    enrichments.formula_enrichment,
    enrichments.table_structure,
    vlm_backend.unwrap_or("local"),
  );
  let digest = Sha256::digest(canonical.as_bytes());
  hex::encode(&digest[..8])
}

/// Load a configuration snapshot from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  toml::from_str(&content).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn two_user_config() -> Config {
    let toml_str = r#"
group_name = "house"

[defaults]
chunk_size_tokens = 256
chunk_overlap_tokens = 50

[users.kitchen]
api_key = "rag_test123"
system_collections = ["recipes"]

[users.kitchen.path_mappings]
"/Users/me/NanoClaw/" = "/workspace/"

[users.garage]
api_key = "rag_xyz"
"#;
    toml::from_str(toml_str).unwrap()
  }

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(&*config.group_name, "default");
    assert_eq!(config.defaults.chunk_size_tokens, 256);
    assert_eq!(config.defaults.chunk_overlap_tokens, 50);
    assert_eq!(config.embedding.dimensions, 1024);
    assert!(config.embedding.ollama_host.is_none());
    assert!(config.users.is_empty());
    assert!(config.enrichments.image_description);
  }

  #[test]
  fn test_parse_users() {
    let config = two_user_config();
    assert_eq!(config.users.len(), 2);
    let kitchen = &config.users["kitchen"];
    assert_eq!(kitchen.api_key, "rag_test123");
    assert_eq!(kitchen.system_collections, vec!["recipes".to_string()]);
    assert_eq!(kitchen.path_mappings["/Users/me/NanoClaw/"], "/workspace/");
    assert_eq!(config.users["garage"].api_key, "rag_xyz");
  }

  #[test]
  fn test_index_db_path_by_group() {
    let mut config = Config::default();
    config.paths.db_dir = PathBuf::from("/data");
    assert_eq!(config.index_db_path(), PathBuf::from("/data/ragling.db"));

    config.group_name = GroupName("house".to_string());
    assert_eq!(config.index_db_path(), PathBuf::from("/data/ragling-house.db"));
  }

  #[test]
  fn test_config_hash_is_16_hex() {
    let hash = converter_config_hash(&EnrichmentConfig::default(), None);
    assert_eq!(hash.len(), 16);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_config_hash_deterministic() {
    let a = converter_config_hash(&EnrichmentConfig::default(), None);
    let b = converter_config_hash(&EnrichmentConfig::default(), None);
    assert_eq!(a, b);
  }

  #[test]
  fn test_config_hash_tracks_fields() {
    let base = EnrichmentConfig::default();
    let baseline = converter_config_hash(&base, None);

    let flipped = EnrichmentConfig {
      image_description: false,
      ..base.clone()
    };
    assert_ne!(converter_config_hash(&flipped, None), baseline);

    let same = base.clone();
    assert_eq!(converter_config_hash(&same, None), baseline);
  }

  #[test]
  fn test_vlm_backend_changes_hash() {
    let enrichments = EnrichmentConfig::default();
    let local = converter_config_hash(&enrichments, None);
    let remote = converter_config_hash(&enrichments, Some("ollama"));
    assert_ne!(local, remote);
  }

  #[test]
  fn test_config_hash_follows_ollama_host() {
    let mut config = Config::default();
    let local = config.config_hash();

    config.embedding.ollama_host = Some("http://gpu:11434".to_string());
    let remote = config.config_hash();
    assert_ne!(local, remote);
    assert_eq!(remote, converter_config_hash(&config.enrichments, Some("ollama")));
  }

  #[test]
  fn test_load_config_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
      &path,
      r#"
[embedding]
model = "custom-embed"
dimensions = 768

[users.kitchen]
api_key = "rag_test123"
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.embedding.model, "custom-embed");
    assert_eq!(config.embedding.dimensions, 768);
    assert_eq!(config.users["kitchen"].api_key, "rag_test123");
  }

  #[test]
  fn test_load_config_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = load_config(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
  }

  #[test]
  fn test_load_config_bad_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "group_name = [not valid").unwrap();

    let result = load_config(&path);
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
  }
}
