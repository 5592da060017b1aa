//! Per-user path translation between host and container views.
//!
//! Pure longest-prefix string replacement; ties are impossible because
//! equal-length prefixes that both match must be equal.

use std::collections::BTreeMap;

/// Map a host path to a container path.
pub fn apply_forward(path: &str, mappings: &BTreeMap<String, String>) -> String {
  let mut best_prefix = "";
  let mut best_replacement = "";
  for (host_prefix, container_prefix) in mappings {
    if path.starts_with(host_prefix.as_str()) && host_prefix.len() > best_prefix.len() {
      best_prefix = host_prefix;
      best_replacement = container_prefix;
    }
  }
  if best_prefix.is_empty() {
    return path.to_string();
  }
  format!("{}{}", best_replacement, &path[best_prefix.len()..])
}

/// Map a container path back to a host path.
pub fn apply_reverse(path: &str, mappings: &BTreeMap<String, String>) -> String {
  let mut best_container = "";
  let mut best_host = "";
  for (host_prefix, container_prefix) in mappings {
    if path.starts_with(container_prefix.as_str()) && container_prefix.len() > best_container.len() {
      best_container = container_prefix;
      best_host = host_prefix;
    }
  }
  if best_container.is_empty() {
    return path.to_string();
  }
  format!("{}{}", best_host, &path[best_container.len()..])
}

/// Apply the forward mapping to a source URI.
///
/// `file://` and `vscode://file` URIs get their path portion translated;
/// other schemes (obsidian://, https://) pass through unchanged.
pub fn apply_forward_uri(uri: Option<&str>, mappings: &BTreeMap<String, String>) -> Option<String> {
  let uri = uri?;

  if let Some(path) = uri.strip_prefix("file://").filter(|p| p.starts_with('/')) {
    return Some(format!("file://{}", apply_forward(path, mappings)));
  }
  if let Some(path) = uri.strip_prefix("vscode://file") {
    return Some(format!("vscode://file{}", apply_forward(path, mappings)));
  }
  Some(uri.to_string())
}
