//! API-key authentication and per-user visibility.

use ragling_core::Config;
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

/// Resolved user context for one authenticated request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserContext {
  pub username: String,
  pub system_collections: Vec<String>,
  pub path_mappings: BTreeMap<String, String>,
}

impl UserContext {
  /// Collections this user may search: own collection, then the global
  /// collection if configured, then system collections. The order is fixed.
  pub fn visible_collections(&self, global_collection: Option<&str>) -> Vec<String> {
    let mut collections = vec![self.username.clone()];
    if let Some(global) = global_collection {
      collections.push(global.to_string());
    }
    collections.extend(self.system_collections.iter().cloned());
    collections
  }
}

/// Resolve an API key to a user context.
///
/// Returns `None` for an empty key, an empty user table, or no match. Key
/// comparison is constant-time so the match position does not leak.
pub fn resolve_api_key(api_key: &str, config: &Config) -> Option<UserContext> {
  if api_key.is_empty() || config.users.is_empty() {
    return None;
  }

  for (username, user) in &config.users {
    if bool::from(user.api_key.as_bytes().ct_eq(api_key.as_bytes())) {
      return Some(UserContext {
        username: username.clone(),
        system_collections: user.system_collections.clone(),
        path_mappings: user.path_mappings.clone(),
      });
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use ragling_core::UserConfig;

  fn config() -> Config {
    let mut config = Config::default();
    config.users.insert(
      "kitchen".to_string(),
      UserConfig {
        api_key: "rag_test123".to_string(),
        system_collections: vec!["recipes".to_string()],
        path_mappings: BTreeMap::from([(
          "/Users/me/NanoClaw/".to_string(),
          "/workspace/".to_string(),
        )]),
      },
    );
    config.users.insert(
      "garage".to_string(),
      UserConfig {
        api_key: "rag_xyz".to_string(),
        ..Default::default()
      },
    );
    config
  }

  #[test]
  fn test_resolve_valid_key() {
    let ctx = resolve_api_key("rag_test123", &config()).unwrap();
    assert_eq!(ctx.username, "kitchen");
    assert_eq!(ctx.system_collections, vec!["recipes"]);
    assert_eq!(ctx.path_mappings["/Users/me/NanoClaw/"], "/workspace/");

    let ctx = resolve_api_key("rag_xyz", &config()).unwrap();
    assert_eq!(ctx.username, "garage");
  }

  #[test]
  fn test_resolve_invalid_key() {
    assert!(resolve_api_key("rag_wrong", &config()).is_none());
    assert!(resolve_api_key("rag_test12", &config()).is_none());
    assert!(resolve_api_key("rag_test1234", &config()).is_none());
  }

  #[test]
  fn test_empty_key_or_no_users() {
    assert!(resolve_api_key("", &config()).is_none());
    assert!(resolve_api_key("rag_test123", &Config::default()).is_none());
  }

  #[test]
  fn test_visible_collections_order() {
    let ctx = resolve_api_key("rag_test123", &config()).unwrap();
    assert_eq!(
      ctx.visible_collections(Some("global")),
      vec!["kitchen", "global", "recipes"]
    );
    assert_eq!(ctx.visible_collections(None), vec!["kitchen", "recipes"]);
  }
}
