//! Per-group leader election over an advisory file lock.
//!
//! Each serve process takes a non-blocking exclusive `flock` on the group's
//! lock file. The winner runs the indexing queue and watchers; losers serve
//! read-only queries and retry in the background. The kernel drops the lock
//! when the holder dies, so there are no PID files, heartbeats, or stale
//! locks to recover.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LeaderError {
  #[error("IO error on lock file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Lock file path for a group: `<index_db>.lock`, adjacent to the database.
pub fn lock_path_for(index_db: &Path) -> PathBuf {
  let mut name = index_db.file_name().unwrap_or_default().to_os_string();
  name.push(".lock");
  index_db.with_file_name(name)
}

struct RetryThread {
  stop: Sender<()>,
  handle: JoinHandle<()>,
}

/// Exclusive per-group lock.
///
/// `try_acquire` either wins leadership or leaves this process a follower;
/// `start_retry` polls for promotion in the background. `close` is
/// idempotent and releases everything.
pub struct LeaderLock {
  lock_path: PathBuf,
  file: Mutex<Option<File>>,
  is_leader: AtomicBool,
  retry: Mutex<Option<RetryThread>>,
}

impl LeaderLock {
  pub fn new(lock_path: PathBuf) -> Self {
    Self {
      lock_path,
      file: Mutex::new(None),
      is_leader: AtomicBool::new(false),
      retry: Mutex::new(None),
    }
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  pub fn is_leader(&self) -> bool {
    self.is_leader.load(Ordering::SeqCst)
  }

  /// Attempt to acquire the exclusive lock without blocking.
  ///
  /// Returns `true` when this process is now the leader. Contention is not
  /// an error.
  pub fn try_acquire(&self) -> Result<bool, LeaderError> {
    if let Some(parent) = self.lock_path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| LeaderError::Io {
        path: self.lock_path.clone(),
        source,
      })?;
    }

    let mut guard = self.lock_file();
    let file = match guard.as_mut() {
      Some(file) => file,
      None => {
        let file = open_lock_file(&self.lock_path).map_err(|source| LeaderError::Io {
          path: self.lock_path.clone(),
          source,
        })?;
        guard.insert(file)
      }
    };

    let acquired = try_lock_exclusive(file).map_err(|source| LeaderError::Io {
      path: self.lock_path.clone(),
      source,
    })?;

    self.is_leader.store(acquired, Ordering::SeqCst);
    if acquired {
      info!(path = %self.lock_path.display(), "acquired leader lock");
    } else {
      info!(path = %self.lock_path.display(), "leader lock held by another process");
    }
    Ok(acquired)
  }

  /// Poll `try_acquire` every `interval` in a background thread.
  ///
  /// On success `on_promote` runs once and the thread exits. The retry is
  /// cancelled by `stop_retry` or `close`.
  pub fn start_retry<F>(self: &Arc<Self>, interval: Duration, on_promote: F)
  where
    F: FnOnce() + Send + 'static,
  {
    self.stop_retry();

    let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = channel();
    let lock = self.clone();

    let handle = std::thread::spawn(move || {
      let mut on_promote = Some(on_promote);
      loop {
        match stop_rx.recv_timeout(interval) {
          Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
          Err(RecvTimeoutError::Timeout) => {}
        }

        match lock.try_acquire() {
          Ok(true) => {
            info!("promoted to leader via retry");
            if let Some(callback) = on_promote.take() {
              callback();
            }
            return;
          }
          Ok(false) => {}
          Err(e) => warn!("leader retry failed: {e}"),
        }
      }
    });

    *self.lock_retry() = Some(RetryThread { stop: stop_tx, handle });
  }

  /// Stop the retry thread if running.
  pub fn stop_retry(&self) {
    if let Some(retry) = self.lock_retry().take() {
      let _ = retry.stop.send(());
      let _ = retry.handle.join();
    }
  }

  /// Stop retrying, release the lock, and close the descriptor. Idempotent.
  pub fn close(&self) {
    self.stop_retry();

    if let Some(file) = self.lock_file().take() {
      if let Err(e) = unlock(&file) {
        warn!(path = %self.lock_path.display(), "unlock failed: {e}");
      }
      drop(file);
      info!(path = %self.lock_path.display(), "released leader lock");
    }
    self.is_leader.store(false, Ordering::SeqCst);
  }

  fn lock_file(&self) -> std::sync::MutexGuard<'_, Option<File>> {
    self.file.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_retry(&self) -> std::sync::MutexGuard<'_, Option<RetryThread>> {
    self.retry.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Drop for LeaderLock {
  fn drop(&mut self) {
    self.close();
  }
}

#[cfg(unix)]
fn open_lock_file(path: &Path) -> std::io::Result<File> {
  use std::os::unix::fs::OpenOptionsExt;
  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .mode(0o644)
    .open(path)
}

#[cfg(not(unix))]
fn open_lock_file(path: &Path) -> std::io::Result<File> {
  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(path)
}

/// Non-blocking exclusive advisory lock. `Ok(false)` means another process
/// (or another open descriptor) holds it.
#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
  use std::os::fd::AsRawFd;

  let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
  if rc == 0 {
    return Ok(true);
  }
  let err = std::io::Error::last_os_error();
  if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
    Ok(false)
  } else {
    Err(err)
  }
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
  use std::os::fd::AsRawFd;

  let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
  if rc == 0 { Ok(()) } else { Err(std::io::Error::last_os_error()) }
}

// Single-process platforms: acquisition always succeeds.
#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<bool> {
  Ok(true)
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> std::io::Result<()> {
  Ok(())
}
