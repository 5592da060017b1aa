//! Process wiring: leadership, stores, queue, and the search surface.
//!
//! One process per group wins the advisory lock and runs the indexing queue;
//! everyone else serves read-only queries and retries for promotion. The
//! transport in front of `search` (SSE, MCP, whatever) is not this crate's
//! concern.

use crate::auth::resolve_api_key;
use crate::config_watch::{ConfigWatcher, watch_config_file};
use crate::leader::{LeaderError, LeaderLock, lock_path_for};
use crate::search::{SearchEngine, SearchError, SearchRequest, SearchResponse};
use db::IndexStore;
use embedding::{EmbeddingProvider, OllamaClient, Retrying};
use index::indexers::indexer_for;
use index::{
  ConfigSource, IndexingProgress, IndexingQueue, PendingKind, QueueConfig, collect_indexable_directories,
  detect_directory_type,
};
use ragling_core::{ConfigError, load_config};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// How often followers retry for the leader lock.
const RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum RuntimeError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Db(#[from] db::DbError),
  #[error(transparent)]
  Leader(#[from] LeaderError),
  #[error(transparent)]
  Index(#[from] index::IndexError),
  #[error(transparent)]
  Search(#[from] SearchError),
  #[error("missing or invalid API key")]
  Unauthorized,
}

pub struct Runtime {
  config: Arc<ConfigWatcher>,
  lock: Arc<LeaderLock>,
  store: Mutex<Arc<IndexStore>>,
  provider: Arc<dyn EmbeddingProvider>,
  progress: Arc<IndexingProgress>,
  queue: Mutex<Option<Arc<IndexingQueue>>>,
  handle: tokio::runtime::Handle,
  fs_watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

impl Runtime {
  /// Load config, elect a leader, open the store, and (on the leader) start
  /// the indexing queue over the group's user directories.
  pub async fn start(config_path: &Path) -> Result<Arc<Self>, RuntimeError> {
    let initial = load_config(config_path)?;
    let index_db = initial.index_db_path();
    let vector_dim = initial.embedding.dimensions;

    let provider: Arc<dyn EmbeddingProvider> = Arc::new(Retrying::new(OllamaClient::new(&initial.embedding)));
    let config = Arc::new(ConfigWatcher::new(initial, config_path.to_path_buf()));
    let fs_watcher = match watch_config_file(&config) {
      Ok(watcher) => Some(watcher),
      Err(e) => {
        warn!("config file watching unavailable: {e}");
        None
      }
    };

    let lock = Arc::new(LeaderLock::new(lock_path_for(&index_db)));
    let is_leader = lock.try_acquire()?;

    let store = if is_leader {
      IndexStore::open(&index_db, vector_dim)?
    } else {
      match IndexStore::open_read_only(&index_db) {
        Ok(store) => store,
        // First process on this host: lay down the schema, then reopen.
        Err(_) => {
          drop(IndexStore::open(&index_db, vector_dim)?);
          IndexStore::open_read_only(&index_db)?
        }
      }
    };

    let runtime = Arc::new(Self {
      config,
      lock,
      store: Mutex::new(Arc::new(store)),
      provider,
      progress: Arc::new(IndexingProgress::new()),
      queue: Mutex::new(None),
      handle: tokio::runtime::Handle::current(),
      fs_watcher: Mutex::new(fs_watcher),
    });

    if is_leader {
      runtime.start_indexing()?;
    } else {
      info!("follower mode: serving read-only queries");
      runtime.spawn_promotion_retry();
    }

    Ok(runtime)
  }

  pub fn is_leader(&self) -> bool {
    self.lock.is_leader()
  }

  fn current_store(&self) -> Arc<IndexStore> {
    self.store.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Authenticated search against the current config snapshot.
  pub async fn search(&self, request: &SearchRequest, api_key: &str) -> Result<SearchResponse, RuntimeError> {
    let config = self.config.get();
    let ctx = resolve_api_key(api_key, &config).ok_or(RuntimeError::Unauthorized)?;

    let engine = SearchEngine::new(self.current_store(), self.provider.clone(), self.progress.clone());
    Ok(engine.search(request, &ctx, &config).await?)
  }

  /// Stop the queue (draining), release leadership, and cancel timers.
  pub async fn shutdown(&self) {
    let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(queue) = queue {
      queue.shutdown().await;
    }

    self.fs_watcher.lock().unwrap_or_else(PoisonError::into_inner).take();
    self.config.stop();
    self.lock.close();
    info!("runtime stopped");
  }

  /// Start watchers and seed the queue with every indexable file.
  fn start_indexing(self: &Arc<Self>) -> Result<(), RuntimeError> {
    let config = self.config.get();
    let config_source: Arc<dyn ConfigSource> = self.config.clone();
    let queue = IndexingQueue::new(
      self.current_store(),
      self.provider.clone(),
      self.progress.clone(),
      config_source,
      QueueConfig::default(),
    );

    let mut total: u64 = 0;
    for dir in collect_indexable_directories(&config.paths.home, &config.usernames()) {
      queue.watch_root(&dir)?;

      let kind = detect_directory_type(&dir);
      if let Some(indexer) = indexer_for(kind) {
        for file in indexer.candidate_files(&dir) {
          queue.enqueue(file, PendingKind::Upsert);
          total += 1;
        }
      }
    }

    self.progress.set_remaining(total);
    queue.start();
    *self.queue.lock().unwrap_or_else(PoisonError::into_inner) = Some(queue);

    info!(files = total, "leader indexing started");
    Ok(())
  }

  fn spawn_promotion_retry(self: &Arc<Self>) {
    let weak = Arc::downgrade(self);
    let handle = self.handle.clone();

    self.lock.start_retry(RETRY_INTERVAL, move || {
      let Some(runtime) = weak.upgrade() else {
        return;
      };
      handle.spawn(async move {
        runtime.on_promoted();
      });
    });
  }

  /// Reopen the store read-write and take over indexing.
  fn on_promoted(self: &Arc<Self>) {
    info!("promoted to leader, taking over indexing");

    let config = self.config.get();
    match IndexStore::open(&config.index_db_path(), config.embedding.dimensions) {
      Ok(store) => {
        *self.store.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(store);
      }
      Err(e) => {
        error!("cannot reopen store read-write after promotion: {e}");
        return;
      }
    }

    if let Err(e) = self.start_indexing() {
      error!("failed to start indexing after promotion: {e}");
    }
  }
}
