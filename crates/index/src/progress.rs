//! Thread-safe indexing progress tracker.
//!
//! The search endpoint attaches the snapshot to responses while an indexing
//! burst is in flight, so clients can tell results may still be incomplete.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Remaining-files counter shared between the indexing queue and the search
/// path. All mutation is serialised by one lock.
#[derive(Debug, Default)]
pub struct IndexingProgress {
  remaining: Mutex<u64>,
}

/// Snapshot of indexing activity, present only while active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
  pub active: bool,
  pub remaining: u64,
}

impl IndexingProgress {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the number of files remaining to index.
  pub fn set_remaining(&self, count: u64) {
    *self.lock() = count;
  }

  /// Decrement the remaining count, saturating at zero.
  pub fn decrement(&self) {
    let mut remaining = self.lock();
    *remaining = remaining.saturating_sub(1);
  }

  /// Mark indexing as complete.
  pub fn finish(&self) {
    *self.lock() = 0;
  }

  pub fn is_active(&self) -> bool {
    *self.lock() > 0
  }

  /// Current state, or `None` when idle.
  pub fn snapshot(&self) -> Option<ProgressSnapshot> {
    let remaining = *self.lock();
    (remaining > 0).then_some(ProgressSnapshot {
      active: true,
      remaining,
    })
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
    self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn test_idle_snapshot_is_none() {
    let progress = IndexingProgress::new();
    assert!(!progress.is_active());
    assert!(progress.snapshot().is_none());
  }

  #[test]
  fn test_set_and_decrement() {
    let progress = IndexingProgress::new();
    progress.set_remaining(3);

    assert_eq!(
      progress.snapshot(),
      Some(ProgressSnapshot {
        active: true,
        remaining: 3
      })
    );

    progress.decrement();
    progress.decrement();
    assert_eq!(progress.snapshot().unwrap().remaining, 1);

    progress.decrement();
    assert!(progress.snapshot().is_none());
  }

  #[test]
  fn test_decrement_saturates() {
    let progress = IndexingProgress::new();
    progress.decrement();
    assert!(progress.snapshot().is_none());

    progress.set_remaining(1);
    progress.decrement();
    progress.decrement();
    assert!(!progress.is_active());
  }

  #[test]
  fn test_finish_clears() {
    let progress = IndexingProgress::new();
    progress.set_remaining(100);
    progress.finish();
    assert!(progress.snapshot().is_none());
  }

  #[test]
  fn test_concurrent_decrements() {
    let progress = Arc::new(IndexingProgress::new());
    progress.set_remaining(1000);

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let progress = progress.clone();
        std::thread::spawn(move || {
          for _ in 0..100 {
            progress.decrement();
          }
        })
      })
      .collect();

    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(progress.snapshot().unwrap().remaining, 200);
  }
}
