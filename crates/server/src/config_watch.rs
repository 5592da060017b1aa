//! Debounced config reload with atomic snapshot swap.
//!
//! Readers take an `Arc<Config>` out and treat it as immutable; a reader
//! needing a consistent view across several operations captures the pointer
//! once. Reload parses a fresh snapshot and swaps the reference under the
//! mutex; a parse failure keeps the previous snapshot.

use index::ConfigSource;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use ragling_core::{Config, load_config};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

type ReloadCallback = Box<dyn Fn(Arc<Config>) + Send + Sync>;

pub struct ConfigWatcher {
  config: Mutex<Arc<Config>>,
  config_path: PathBuf,
  debounce: Duration,
  /// Bumped on every change notification; a pending timer only fires if its
  /// generation is still current, which cancels superseded timers.
  generation: Arc<AtomicU64>,
  on_reload: Option<ReloadCallback>,
}

impl ConfigWatcher {
  pub fn new(initial: Config, config_path: PathBuf) -> Self {
    Self {
      config: Mutex::new(Arc::new(initial)),
      config_path,
      debounce: DEFAULT_DEBOUNCE,
      generation: Arc::new(AtomicU64::new(0)),
      on_reload: None,
    }
  }

  pub fn with_debounce(mut self, debounce: Duration) -> Self {
    self.debounce = debounce;
    self
  }

  /// Invoke `callback` with each new snapshot after a successful swap.
  pub fn with_reload_callback(mut self, callback: impl Fn(Arc<Config>) + Send + Sync + 'static) -> Self {
    self.on_reload = Some(Box::new(callback));
    self
  }

  /// Current snapshot. Callers must treat it as immutable.
  pub fn get(&self) -> Arc<Config> {
    self.lock().clone()
  }

  pub fn config_path(&self) -> &Path {
    &self.config_path
  }

  /// Reload from disk now, swapping the snapshot on success.
  pub fn reload(&self) {
    let new_config = match load_config(&self.config_path) {
      Ok(config) => Arc::new(config),
      Err(e) => {
        error!(path = %self.config_path.display(), "config reload failed, keeping previous snapshot: {e}");
        return;
      }
    };

    *self.lock() = new_config.clone();
    info!(path = %self.config_path.display(), "config reloaded");

    if let Some(callback) = &self.on_reload {
      callback(new_config);
    }
  }

  /// Note that the config file changed; resets the debounce timer.
  pub fn notify_change(self: &Arc<Self>) {
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let watcher = self.clone();

    std::thread::spawn(move || {
      std::thread::sleep(watcher.debounce);
      if watcher.generation.load(Ordering::SeqCst) == generation {
        watcher.reload();
      }
    });
  }

  /// Cancel any pending debounced reload.
  pub fn stop(&self) {
    self.generation.fetch_add(1, Ordering::SeqCst);
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Arc<Config>> {
    self.config.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl ConfigSource for ConfigWatcher {
  fn get(&self) -> Arc<Config> {
    ConfigWatcher::get(self)
  }
}

/// Watch the config file on disk and feed change notifications into the
/// debounce. Keep the returned watcher alive for as long as reloads should
/// happen.
pub fn watch_config_file(watcher: &Arc<ConfigWatcher>) -> Result<RecommendedWatcher, notify::Error> {
  let config_path = watcher.config_path().to_path_buf();
  let watch_dir = config_path.parent().map(Path::to_path_buf).unwrap_or_else(|| config_path.clone());
  let target = watcher.clone();

  let config_name = config_path.file_name().map(|n| n.to_os_string());
  let mut fs_watcher = RecommendedWatcher::new(
    move |result: Result<notify::Event, notify::Error>| match result {
      Ok(event) => {
        // Compare file names: some platforms report canonicalized paths.
        let touched = event
          .paths
          .iter()
          .any(|p| p.file_name().map(|n| n.to_os_string()) == config_name);
        if touched {
          target.notify_change();
        }
      }
      Err(e) => warn!("config watch error: {e}"),
    },
    notify::Config::default(),
  )?;

  fs_watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
  Ok(fs_watcher)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use tempfile::TempDir;

  fn write_config(path: &Path, model: &str) {
    std::fs::write(path, format!("[embedding]\nmodel = \"{model}\"\n")).unwrap();
  }

  fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
      if condition() {
        return;
      }
      std::thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached in time");
  }

  #[test]
  fn test_get_returns_initial_snapshot() {
    let watcher = ConfigWatcher::new(Config::default(), PathBuf::from("/nope.toml"));
    assert_eq!(watcher.get().embedding.model, "mxbai-embed-large");
  }

  #[test]
  fn test_reload_swaps_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, "new-model");

    let watcher = ConfigWatcher::new(Config::default(), path);
    watcher.reload();
    assert_eq!(watcher.get().embedding.model, "new-model");
  }

  #[test]
  fn test_reload_failure_keeps_previous() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "not [valid toml").unwrap();

    let watcher = ConfigWatcher::new(Config::default(), path);
    watcher.reload();
    assert_eq!(watcher.get().embedding.model, "mxbai-embed-large");
  }

  #[test]
  fn test_notify_change_debounces() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, "debounced-model");

    let watcher = Arc::new(ConfigWatcher::new(Config::default(), path).with_debounce(Duration::from_millis(20)));

    watcher.notify_change();
    // Inside the debounce window nothing has been swapped yet.
    assert_eq!(watcher.get().embedding.model, "mxbai-embed-large");

    wait_for(|| watcher.get().embedding.model == "debounced-model");
  }

  #[test]
  fn test_repeated_notifications_reload_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, "latest");

    let reloads = Arc::new(AtomicUsize::new(0));
    let counter = reloads.clone();
    let watcher = Arc::new(
      ConfigWatcher::new(Config::default(), path)
        .with_debounce(Duration::from_millis(30))
        .with_reload_callback(move |_| {
          counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    // Every notification resets the timer; only the last generation fires.
    watcher.notify_change();
    std::thread::sleep(Duration::from_millis(5));
    watcher.notify_change();
    std::thread::sleep(Duration::from_millis(5));
    watcher.notify_change();

    wait_for(|| reloads.load(Ordering::SeqCst) > 0);
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(reloads.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_stop_cancels_pending_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, "never-applied");

    let watcher = Arc::new(ConfigWatcher::new(Config::default(), path).with_debounce(Duration::from_millis(20)));
    watcher.notify_change();
    watcher.stop();

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(watcher.get().embedding.model, "mxbai-embed-large");
  }

  #[test]
  fn test_file_watcher_triggers_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    write_config(&path, "initial");

    let watcher = Arc::new(
      ConfigWatcher::new(Config::default(), path.clone()).with_debounce(Duration::from_millis(20)),
    );
    let _fs_watcher = watch_config_file(&watcher).unwrap();

    write_config(&path, "from-disk");
    wait_for(|| watcher.get().embedding.model == "from-disk");
  }
}
