//! Leader-only indexing queue.
//!
//! Watcher threads record (path, deadline) pairs keyed by canonical path;
//! the worker drains only entries whose debounce deadline expired, then runs
//! each file through parse -> bridge -> chunk -> batched embed -> upsert.
//! Newer events for a path replace older ones, so bursts coalesce without
//! dropping distinct paths.

use crate::detect::{IndexerType, detect_indexer_type_for_file};
use crate::indexers::{ObsidianIndexer, document_from_file};
use crate::parser::{DocumentParser, PlaintextParser};
use crate::progress::IndexingProgress;
use crate::Result;
use db::{DocumentMeta, IndexStore};
use embedding::EmbeddingProvider;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use ragling_core::{Config, SourceDocument, SourceType};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the queue reads its configuration snapshot from.
///
/// The server's config watcher implements this; tests pin a snapshot.
pub trait ConfigSource: Send + Sync {
  fn get(&self) -> Arc<Config>;
}

/// A fixed configuration snapshot.
pub struct StaticConfig(pub Arc<Config>);

impl ConfigSource for StaticConfig {
  fn get(&self) -> Arc<Config> {
    self.0.clone()
  }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
  /// Quiet period a path must observe before it is drained.
  pub debounce: Duration,
  /// Worker poll interval.
  pub tick: Duration,
  /// Chunk texts per embedding request.
  pub embed_batch_size: usize,
  /// Pending entries that force an early drain regardless of deadlines.
  pub max_pending: usize,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(500),
      tick: Duration::from_millis(200),
      embed_batch_size: 32,
      max_pending: 1024,
    }
  }
}

/// What a drained path needs done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
  Upsert,
  Delete,
}

#[derive(Debug)]
struct PendingEvent {
  kind: PendingKind,
  deadline: Instant,
}

pub struct IndexingQueue {
  store: Arc<IndexStore>,
  provider: Arc<dyn EmbeddingProvider>,
  progress: Arc<IndexingProgress>,
  config: Arc<dyn ConfigSource>,
  queue_config: QueueConfig,
  pending: Mutex<HashMap<PathBuf, PendingEvent>>,
  shutdown: AtomicBool,
  watchers: Mutex<Vec<RecommendedWatcher>>,
  worker: Mutex<Option<JoinHandle<()>>>,
}

impl IndexingQueue {
  pub fn new(
    store: Arc<IndexStore>,
    provider: Arc<dyn EmbeddingProvider>,
    progress: Arc<IndexingProgress>,
    config: Arc<dyn ConfigSource>,
    queue_config: QueueConfig,
  ) -> Arc<Self> {
    Arc::new(Self {
      store,
      provider,
      progress,
      config,
      queue_config,
      pending: Mutex::new(HashMap::new()),
      shutdown: AtomicBool::new(false),
      watchers: Mutex::new(Vec::new()),
      worker: Mutex::new(None),
    })
  }

  /// Start watching a root recursively. Events feed the pending map.
  pub fn watch_root(self: &Arc<Self>, root: &Path) -> Result<()> {
    let queue: Weak<Self> = Arc::downgrade(self);

    let mut watcher = RecommendedWatcher::new(
      move |result: std::result::Result<notify::Event, notify::Error>| {
        let Some(queue) = queue.upgrade() else {
          return;
        };
        match result {
          Ok(event) => queue.handle_event(event),
          Err(e) => warn!("watch error: {e}"),
        }
      },
      notify::Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    self.lock_watchers().push(watcher);
    info!(root = %root.display(), "watching for file events");
    Ok(())
  }

  /// Record a path for indexing after the debounce period.
  ///
  /// A newer event replaces the older entry for the same path; the queue
  /// refuses new events once shutdown has begun.
  pub fn enqueue(&self, path: PathBuf, kind: PendingKind) {
    if self.shutdown.load(Ordering::SeqCst) {
      debug!(path = %path.display(), "queue shutting down, event refused");
      return;
    }

    let path = path.canonicalize().unwrap_or(path);
    let deadline = Instant::now() + self.queue_config.debounce;
    self.lock_pending().insert(path, PendingEvent { kind, deadline });
  }

  pub fn pending_count(&self) -> usize {
    self.lock_pending().len()
  }

  /// Spawn the worker task. Must be called within a tokio runtime.
  pub fn start(self: &Arc<Self>) {
    let queue = self.clone();
    let handle = tokio::spawn(async move {
      queue.run().await;
    });
    *self.lock_worker() = Some(handle);
  }

  /// Stop the watchers, drain in-flight work with a bounded wait, and stop
  /// the worker.
  pub async fn shutdown(&self) {
    self.shutdown.store(true, Ordering::SeqCst);
    self.lock_watchers().clear();

    let handle = self.lock_worker().take();
    if let Some(handle) = handle
      && tokio::time::timeout(Duration::from_secs(30), handle).await.is_err()
    {
      warn!("indexing worker did not drain in time");
    }
  }

  async fn run(&self) {
    loop {
      if self.shutdown.load(Ordering::SeqCst) {
        self.drain_now().await;
        self.progress.finish();
        info!("indexing queue stopped");
        return;
      }

      tokio::time::sleep(self.queue_config.tick).await;

      let force = self.pending_count() >= self.queue_config.max_pending;
      let ready = self.take_ready(force);
      for (path, kind) in ready {
        self.process(&path, kind).await;
        self.progress.decrement();
      }
    }
  }

  /// Process everything pending regardless of deadlines.
  pub async fn drain_now(&self) {
    let ready = self.take_ready(true);
    for (path, kind) in ready {
      self.process(&path, kind).await;
      self.progress.decrement();
    }
  }

  fn take_ready(&self, force: bool) -> Vec<(PathBuf, PendingKind)> {
    let now = Instant::now();
    let mut pending = self.lock_pending();

    let keys: Vec<PathBuf> = pending
      .iter()
      .filter(|(_, event)| force || event.deadline <= now)
      .map(|(path, _)| path.clone())
      .collect();

    let mut ready: Vec<(PathBuf, PendingKind)> = keys
      .into_iter()
      .filter_map(|path| pending.remove(&path).map(|event| (path, event.kind)))
      .collect();
    ready.sort_by(|a, b| a.0.cmp(&b.0));
    ready
  }

  fn handle_event(&self, event: notify::Event) {
    let kind = match event.kind {
      EventKind::Create(_) | EventKind::Modify(_) => PendingKind::Upsert,
      EventKind::Remove(_) => PendingKind::Delete,
      _ => return,
    };

    for path in event.paths {
      if path.is_dir() || has_hidden_component(&path) {
        continue;
      }
      self.enqueue(path, kind);
    }
  }

  async fn process(&self, path: &Path, kind: PendingKind) {
    let config = self.config.get();
    let Some(collection) = collection_for(path, &config.paths.home) else {
      debug!(path = %path.display(), "outside group home, ignoring");
      return;
    };

    match kind {
      PendingKind::Delete => {
        match self.store.delete_document(&collection, &path.display().to_string()) {
          Ok(true) => info!(path = %path.display(), "removed deleted document"),
          Ok(false) => {}
          Err(e) => warn!(path = %path.display(), "delete failed: {e}"),
        }
      }
      PendingKind::Upsert => {
        if let Err(e) = self.index_file(path, &collection, &config).await {
          // One bad file must never stall the queue.
          warn!(path = %path.display(), "indexing failed, skipping: {e}");
        }
      }
    }
  }

  async fn index_file(&self, path: &Path, collection: &str, config: &Config) -> Result<()> {
    let Some(doc) = build_document(path, collection, config)? else {
      return Ok(());
    };

    if self
      .store
      .document_is_current(&doc.collection, &doc.source_path, &doc.digest, &doc.config_hash)?
    {
      debug!(path = %path.display(), "document already current");
      return Ok(());
    }

    // Embed before touching the store so a service failure leaves the
    // previous version intact.
    let texts: Vec<&str> = doc.chunks.iter().map(|c| c.text.as_str()).collect();
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(self.queue_config.embed_batch_size.max(1)) {
      vectors.extend(self.provider.embed_batch(batch).await?);
    }

    let outcome = self.store.upsert_document(&DocumentMeta::from(&doc))?;
    self.store.insert_chunks(outcome.document_id, &doc.chunks, &vectors)?;

    info!(
      path = %path.display(),
      collection,
      chunks = doc.chunks.len(),
      "indexed document"
    );
    Ok(())
  }

  fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, PendingEvent>> {
    self.pending.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_watchers(&self) -> std::sync::MutexGuard<'_, Vec<RecommendedWatcher>> {
    self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    self.worker.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Build the chunked document for a file, resolving its indexer family from
/// directory ancestry.
fn build_document(path: &Path, collection: &str, config: &Config) -> Result<Option<SourceDocument>> {
  let kind = detect_indexer_type_for_file(path);
  let source_type = kind.source_type();

  static PLAINTEXT: PlaintextParser = PlaintextParser;
  let parser_override: Option<&dyn DocumentParser> = match kind {
    IndexerType::Code => Some(&PLAINTEXT),
    _ => None,
  };

  let source_uri = match source_type {
    SourceType::Obsidian => vault_root_of(path).and_then(|vault| ObsidianIndexer::source_uri(&vault, path)),
    SourceType::Code => Some(format!("vscode://file{}", path.display())),
    _ => Some(format!("file://{}", path.display())),
  };

  document_from_file(path, collection, source_type, source_uri, config, parser_override)
}

/// Nearest ancestor directory carrying an `.obsidian` marker.
fn vault_root_of(path: &Path) -> Option<PathBuf> {
  path
    .ancestors()
    .skip(1)
    .find(|dir| dir.join(".obsidian").is_dir())
    .map(Path::to_path_buf)
}

/// The collection a path belongs to: the user directory directly under the
/// group home.
fn collection_for(path: &Path, home: &Path) -> Option<String> {
  let home = home.canonicalize().unwrap_or_else(|_| home.to_path_buf());
  let relative = path.strip_prefix(&home).ok()?;
  match relative.components().next()? {
    Component::Normal(name) => name.to_str().map(str::to_string),
    _ => None,
  }
}

fn has_hidden_component(path: &Path) -> bool {
  path.components().any(|component| match component {
    Component::Normal(name) => name.to_str().is_some_and(|n| n.starts_with('.')),
    _ => false,
  })
}
