//! Per-stream write serialization.
//!
//! Used by the [`Repository`](crate::repository::Repository) when the backend
//! cannot guarantee a single winner for concurrent compare-and-append calls.
//! Each stream id maps to its own async mutex, so writers on different
//! streams never wait for each other.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Table of per-stream async mutexes.
///
/// An entry lives while some writer holds or waits on its lock; the last
/// guard to be released removes it.
#[derive(Clone, Default)]
pub struct StreamLocks {
    locks: LockTable,
}

/// Exclusive access to one stream. Released on drop.
pub struct StreamGuard {
    stream_id: String,
    locks: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl StreamLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `stream_id`.
    pub async fn lock(&self, stream_id: &str) -> StreamGuard {
        let lock = self
            .locks
            .lock()
            .expect("stream lock table poisoned")
            .entry(stream_id.to_string())
            .or_default()
            .clone();
        tracing::trace!(stream_id, "waiting for stream lock");
        StreamGuard {
            stream_id: stream_id.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of streams with a held or awaited lock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .expect("stream lock table poisoned")
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries in the table, including ones left behind by waiters
    /// that were cancelled.
    #[cfg(test)]
    fn entries(&self) -> usize {
        self.locks.lock().expect("stream lock table poisoned").len()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        // Release the mutex first so its `Arc` no longer counts as a holder.
        drop(self.guard.take());
        let mut locks = self.locks.lock().expect("stream lock table poisoned");
        if locks
            .get(&self.stream_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.stream_id);
        }
    }
}

impl std::fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGuard")
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

impl std::fmt::Debug for StreamLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLocks")
            .field("active", &self.len())
            .finish()
    }
}
