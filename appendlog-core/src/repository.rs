//! The stream engine.
//!
//! [`Repository`] is the single entry point for reading and writing streams.
//! It evaluates [`WriteCondition`]s against the stream's actual version and
//! delegates the append to the backend's compare-and-append, so a write is
//! applied only if the version it was checked against is still current.
//!
//! For backends whose compare-and-append is atomic the engine takes no locks
//! of its own: losing a race surfaces as [`CompareAndAppend::Conflict`], and
//! the condition is re-evaluated against the version that won. Backends that
//! declare [`VersionedStore::ATOMIC_APPEND`] `false` get per-stream mutual
//! exclusion from [`StreamLocks`] around the check-then-append.

use thiserror::Error;

use crate::{
    concurrency::WriteRejected,
    condition::WriteCondition,
    event::EventEnvelope,
    lock::StreamLocks,
    store::{AppendResult, CompareAndAppend, ReadRange, StreamState, VersionedStore},
};

/// Error type for writes.
#[derive(Debug, Error)]
pub enum WriteError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// The write condition did not hold. Nothing was written.
    #[error(transparent)]
    Rejected(#[from] WriteRejected),
    /// The backend failed. The write may be retried by the caller.
    #[error("failed to persist events: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError: std::error::Error + 'static> WriteError<StoreError> {
    /// The rejection, if this error is one.
    #[must_use]
    pub const fn as_rejected(&self) -> Option<&WriteRejected> {
        match self {
            Self::Rejected(rejected) => Some(rejected),
            Self::Store(_) => None,
        }
    }
}

/// Result type alias for writes against a store `S`.
pub type WriteResult<S> = Result<AppendResult, WriteError<<S as VersionedStore>::Error>>;

/// Result type alias for [`Repository::write_with_retry`].
pub type RetryResult<S> = Result<RetryOutcome, WriteError<<S as VersionedStore>::Error>>;

/// Snapshot of a stream returned by a read.
///
/// The version and events come from the same committed write. The events are
/// owned by the snapshot; later writes to the stream never change them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventStream {
    id: String,
    version: u64,
    events: Vec<EventEnvelope>,
}

impl EventStream {
    fn new(id: &str, state: Option<StreamState>) -> Self {
        let StreamState { version, events } = state.unwrap_or_default();
        Self {
            id: id.to_string(),
            version,
            events,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Version of the stream at read time. `0` if it does not exist.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// The requested slice of events, in append order.
    #[must_use]
    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<EventEnvelope> {
        self.events
    }
}

/// Outcome of [`Repository::write_with_retry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Stream version after the successful write.
    pub version: u64,
    /// Number of attempts, including the successful one.
    pub attempts: usize,
}

/// Reads and conditionally appends to versioned streams.
///
/// # Example
///
/// ```
/// use appendlog_core::{
///     condition::WriteCondition, event::EventEnvelope, repository::Repository,
///     store::inmemory,
/// };
///
/// # tokio_test_block_on(async {
/// let repo = Repository::new(inmemory::Store::new());
/// let event = EventEnvelope::new("e-1", b"opened".to_vec());
///
/// let result = repo
///     .write("account-1", &WriteCondition::stream_version_eq(0), &[event])
///     .await
///     .unwrap();
/// assert_eq!(result.version, 1);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Repository<S> {
    store: S,
    locks: StreamLocks,
}

impl<S: VersionedStore> Repository<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: StreamLocks::new(),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Read a slice of a stream together with its current version.
    ///
    /// A stream that was never written reads as version `0` with no events.
    ///
    /// # Errors
    ///
    /// Returns the backend error if loading fails.
    #[tracing::instrument(skip(self))]
    pub async fn read(&self, stream_id: &str, range: ReadRange) -> Result<EventStream, S::Error> {
        let state = self.store.load_state(stream_id, range).await?;
        let stream = EventStream::new(stream_id, state);
        tracing::trace!(
            version = stream.version,
            events_loaded = stream.events.len(),
            "read stream"
        );
        Ok(stream)
    }

    /// Read every event of a stream.
    ///
    /// # Errors
    ///
    /// Returns the backend error if loading fails.
    pub async fn read_all(&self, stream_id: &str) -> Result<EventStream, S::Error> {
        self.read(stream_id, ReadRange::all()).await
    }

    /// Whether at least one write has been applied to the stream.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the lookup fails.
    pub async fn exists(&self, stream_id: &str) -> Result<bool, S::Error> {
        self.store.exists(stream_id).await
    }

    /// Current version of a stream, `0` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the lookup fails.
    pub async fn version(&self, stream_id: &str) -> Result<u64, S::Error> {
        self.store.stream_version(stream_id).await
    }

    /// Append `events` to a stream if `condition` holds for its version.
    ///
    /// On success the version advances by exactly one, whatever the number of
    /// events, and the new version is returned. On rejection nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Rejected`] if the condition does not hold, or
    /// [`WriteError::Store`] if the backend fails.
    #[tracing::instrument(
        skip(self, condition, events),
        fields(condition = %condition, event_count = events.len())
    )]
    pub async fn write(
        &self,
        stream_id: &str,
        condition: &WriteCondition,
        events: &[EventEnvelope],
    ) -> WriteResult<S> {
        let _guard = if S::ATOMIC_APPEND {
            None
        } else {
            Some(self.locks.lock(stream_id).await)
        };

        let mut actual = self
            .store
            .stream_version(stream_id)
            .await
            .map_err(WriteError::Store)?;

        loop {
            if !condition.is_fulfilled_by(actual) {
                tracing::debug!(actual_version = actual, "write condition not fulfilled");
                return Err(WriteRejected::new(stream_id, condition.clone(), actual).into());
            }

            match self
                .store
                .compare_and_append(stream_id, actual, events)
                .await
                .map_err(WriteError::Store)?
            {
                CompareAndAppend::Applied { version } => {
                    tracing::debug!(version, "write committed");
                    return Ok(AppendResult { version });
                }
                CompareAndAppend::Conflict { actual_version } => {
                    tracing::trace!(
                        expected_version = actual,
                        actual_version,
                        "lost compare-and-append race; re-evaluating condition"
                    );
                    actual = actual_version;
                }
            }
        }
    }

    /// Read the stream, derive new events from it with `decide`, and write
    /// them expecting the version that was read. Retries after a rejection,
    /// up to `max_retries` times.
    ///
    /// `decide` is called once per attempt with a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns the last [`WriteError::Rejected`] once retries are exhausted,
    /// or a backend error immediately.
    pub async fn write_with_retry<F>(
        &self,
        stream_id: &str,
        max_retries: usize,
        mut decide: F,
    ) -> RetryResult<S>
    where
        F: FnMut(&EventStream) -> Vec<EventEnvelope>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let stream = self.read_all(stream_id).await.map_err(WriteError::Store)?;
            let events = decide(&stream);
            let condition = WriteCondition::stream_version_eq(stream.version());

            match self.write(stream_id, &condition, &events).await {
                Ok(AppendResult { version }) => return Ok(RetryOutcome { version, attempts }),
                Err(WriteError::Rejected(rejected)) if attempts <= max_retries => {
                    tracing::trace!(
                        attempts,
                        actual_version = rejected.actual_version,
                        "write rejected; retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
