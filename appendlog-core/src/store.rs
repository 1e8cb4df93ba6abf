//! Persistence layer abstractions.
//!
//! This module describes the contract a backend must satisfy
//! ([`VersionedStore`]), the shapes that cross it ([`StreamState`],
//! [`ReadRange`], [`CompareAndAppend`]), and a reference in-memory
//! implementation.
//!
//! The contract is deliberately narrow: load a stream's version and a slice of
//! its events, compare-and-append keyed by the expected prior version, and an
//! existence check. Write conditions are evaluated by the
//! [`Repository`](crate::repository::Repository), never by the backend.
use std::future::Future;

use crate::event::EventEnvelope;

pub mod inmemory;

/// Positional slice of a stream.
///
/// `skip` and `limit` clamp to the stored events: skipping past the end
/// yields an empty slice, and a limit larger than what remains yields the
/// remainder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadRange {
    pub skip: usize,
    /// `None` means unbounded.
    pub limit: Option<usize>,
}

impl ReadRange {
    /// The whole stream.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            skip: 0,
            limit: None,
        }
    }

    /// Skip the first `skip` events.
    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Return at most `limit` events.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn is_all(&self) -> bool {
        self.skip == 0 && self.limit.is_none()
    }

    /// Index bounds of this range within a stream of `len` events.
    #[must_use]
    pub fn bounds(&self, len: usize) -> std::ops::Range<usize> {
        let start = self.skip.min(len);
        let end = self
            .limit
            .map_or(len, |limit| start.saturating_add(limit).min(len));
        start..end
    }
}

/// Version and events of a stream as loaded from a backend.
///
/// Both fields come from the same committed write: a backend must never pair
/// a version with events from a different point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamState {
    pub version: u64,
    pub events: Vec<EventEnvelope>,
}

/// Outcome of [`VersionedStore::compare_and_append`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareAndAppend {
    /// The batch was appended; `version` is the stream's new version.
    Applied { version: u64 },
    /// The stream was not at the expected version. Nothing was written.
    Conflict { actual_version: u64 },
}

/// Result of a successful write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AppendResult {
    /// Stream version after the write.
    pub version: u64,
}

/// Abstraction over the persistence layer for versioned streams.
///
/// Versions count successful writes, not events: one call to
/// [`compare_and_append`](Self::compare_and_append) that applies moves the
/// stream from `expected_version` to `expected_version + 1`, whatever the
/// batch size. A stream that has never been written has version `0` and no
/// events; backends report it as absent rather than storing it.
// ANCHOR: versioned_store_trait
pub trait VersionedStore: Send + Sync {
    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether [`compare_and_append`](Self::compare_and_append) is atomic
    /// under contention (exactly one winner per expected version).
    ///
    /// Backends that can only offer weaker guarantees set this to `false`;
    /// the repository then serializes writers per stream before delegating.
    const ATOMIC_APPEND: bool = true;

    /// Load the version and a slice of events for a stream.
    ///
    /// Returns `None` for streams that have never been written.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn load_state<'a>(
        &'a self,
        stream_id: &'a str,
        range: ReadRange,
    ) -> impl Future<Output = Result<Option<StreamState>, Self::Error>> + Send + 'a;

    /// Get the current version of a stream, `0` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn stream_version<'a>(
        &'a self,
        stream_id: &'a str,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

    /// Append `events` if and only if the stream is at `expected_version`.
    ///
    /// `expected_version == 0` creates the stream. On conflict nothing is
    /// written and the actual version is reported.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when persistence fails. A version
    /// mismatch is not an error; it is [`CompareAndAppend::Conflict`].
    fn compare_and_append<'a>(
        &'a self,
        stream_id: &'a str,
        expected_version: u64,
        events: &'a [EventEnvelope],
    ) -> impl Future<Output = Result<CompareAndAppend, Self::Error>> + Send + 'a;

    /// Whether at least one write has been applied to the stream.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn exists<'a>(
        &'a self,
        stream_id: &'a str,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
// ANCHOR_END: versioned_store_trait
