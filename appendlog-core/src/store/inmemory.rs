//! In-memory versioned store.
//!
//! This module provides [`Store`], a thread-safe in-process implementation of
//! [`VersionedStore`](super::VersionedStore). It is suitable for tests,
//! examples and single-process deployments that do not need durability.
//!
//! # Example
//!
//! ```
//! use appendlog_core::store::inmemory;
//!
//! let store = inmemory::Store::new();
//! ```

use std::{
    collections::HashMap,
    convert::Infallible,
    future::Future,
    sync::{Arc, RwLock},
};

use crate::{
    event::EventEnvelope,
    store::{CompareAndAppend, ReadRange, StreamState, VersionedStore},
};

/// Version and events of one stream.
#[derive(Default)]
struct Cell {
    version: u64,
    events: Vec<EventEnvelope>,
}

/// A stream's cell. Each stream has its own lock so writers on different
/// streams never wait on each other.
type SharedCell = Arc<RwLock<Cell>>;

/// In-memory store keyed by stream id.
///
/// The outer map is only locked long enough to look up or insert a stream's
/// cell; version checks and appends happen under that stream's own lock.
/// Reads copy the requested slice out, so later writes never affect a slice a
/// caller already holds.
#[derive(Clone, Default)]
pub struct Store {
    streams: Arc<RwLock<HashMap<String, SharedCell>>>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, stream_id: &str) -> Option<SharedCell> {
        self.streams
            .read()
            .expect("in-memory store lock poisoned")
            .get(stream_id)
            .cloned()
    }

    fn cell_or_insert(&self, stream_id: &str) -> SharedCell {
        if let Some(cell) = self.cell(stream_id) {
            return cell;
        }
        self.streams
            .write()
            .expect("in-memory store lock poisoned")
            .entry(stream_id.to_string())
            .or_default()
            .clone()
    }

    fn load(&self, stream_id: &str, range: ReadRange) -> Option<StreamState> {
        let cell = self.cell(stream_id)?;
        let cell = cell.read().expect("in-memory stream lock poisoned");
        // A cell is inserted just before its first append; until that append
        // lands it holds version 0 and counts as absent.
        if cell.version == 0 {
            return None;
        }
        let bounds = range.bounds(cell.events.len());
        Some(StreamState {
            version: cell.version,
            events: cell.events[bounds].to_vec(),
        })
    }

    fn append(
        &self,
        stream_id: &str,
        expected_version: u64,
        events: &[EventEnvelope],
    ) -> CompareAndAppend {
        let cell = if expected_version == 0 {
            self.cell_or_insert(stream_id)
        } else {
            match self.cell(stream_id) {
                Some(cell) => cell,
                None => return CompareAndAppend::Conflict { actual_version: 0 },
            }
        };

        let mut cell = cell.write().expect("in-memory stream lock poisoned");
        if cell.version != expected_version {
            tracing::debug!(
                expected_version,
                actual_version = cell.version,
                "version mismatch, rejecting append"
            );
            return CompareAndAppend::Conflict {
                actual_version: cell.version,
            };
        }

        cell.events.extend_from_slice(events);
        cell.version += 1;
        let version = cell.version;
        drop(cell);

        tracing::debug!(version, "events appended to stream");
        CompareAndAppend::Applied { version }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stream_count = self
            .streams
            .read()
            .map_or(0, |streams| streams.len());
        f.debug_struct("Store")
            .field("stream_count", &stream_count)
            .finish()
    }
}

impl VersionedStore for Store {
    type Error = Infallible;

    #[tracing::instrument(skip(self))]
    fn load_state<'a>(
        &'a self,
        stream_id: &'a str,
        range: ReadRange,
    ) -> impl Future<Output = Result<Option<StreamState>, Self::Error>> + Send + 'a {
        let state = self.load(stream_id, range);
        tracing::trace!(
            found = state.is_some(),
            events_loaded = state.as_ref().map_or(0, |s| s.events.len()),
            "loaded stream"
        );
        std::future::ready(Ok(state))
    }

    fn stream_version<'a>(
        &'a self,
        stream_id: &'a str,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a {
        let version = self.cell(stream_id).map_or(0, |cell| {
            cell.read().expect("in-memory stream lock poisoned").version
        });
        std::future::ready(Ok(version))
    }

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    fn compare_and_append<'a>(
        &'a self,
        stream_id: &'a str,
        expected_version: u64,
        events: &'a [EventEnvelope],
    ) -> impl Future<Output = Result<CompareAndAppend, Self::Error>> + Send + 'a {
        std::future::ready(Ok(self.append(stream_id, expected_version, events)))
    }

    fn exists<'a>(
        &'a self,
        stream_id: &'a str,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a {
        let exists = self.cell(stream_id).is_some_and(|cell| {
            cell.read().expect("in-memory stream lock poisoned").version > 0
        });
        std::future::ready(Ok(exists))
    }
}
