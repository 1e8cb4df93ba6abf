mod append;
mod load;

use appendlog_core::{
    event::EventEnvelope,
    store::{CompareAndAppend, ReadRange, StreamState, VersionedStore},
};
use sqlx::PgPool;

use crate::Error;

/// A PostgreSQL-backed [`VersionedStore`].
///
/// Layout:
/// - `appendlog_streams` holds one row per stream with its version and event
///   count. Conditional writes on this row are what make compare-and-append
///   atomic.
/// - `appendlog_events` holds event ids and payloads (`BYTEA`, stored
///   verbatim), keyed by `(stream_id, seq)` where `seq` is the event's
///   position in its stream.
#[derive(Clone, Debug)]
pub struct Store {
    pub(crate) pool: PgPool,
}

impl Store {
    /// Construct a `PostgreSQL` store from a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the initial schema (idempotent).
    ///
    /// This uses `CREATE TABLE IF NOT EXISTS` style DDL so it can be run on
    /// startup.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if any of the schema creation queries fail.
    #[tracing::instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS appendlog_streams (
                stream_id   TEXT PRIMARY KEY,
                version     BIGINT NOT NULL CHECK (version > 0),
                event_count BIGINT NOT NULL CHECK (event_count >= 0)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS appendlog_events (
                stream_id  TEXT NOT NULL REFERENCES appendlog_streams (stream_id),
                seq        BIGINT NOT NULL,
                event_id   TEXT NOT NULL,
                payload    BYTEA NOT NULL,
                PRIMARY KEY (stream_id, seq)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl VersionedStore for Store {
    type Error = Error;

    #[tracing::instrument(skip(self))]
    async fn load_state<'a>(
        &'a self,
        stream_id: &'a str,
        range: ReadRange,
    ) -> Result<Option<StreamState>, Self::Error> {
        let mut tx = self.pool.begin().await?;
        // Version and events must come from one snapshot.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(version) = Self::fetch_version(&mut tx, stream_id).await? else {
            tx.commit().await?;
            return Ok(None);
        };
        let events = Self::fetch_events(&mut tx, stream_id, range).await?;
        tx.commit().await?;

        tracing::trace!(version, events_loaded = events.len(), "loaded stream");
        Ok(Some(StreamState { version, events }))
    }

    async fn stream_version<'a>(&'a self, stream_id: &'a str) -> Result<u64, Self::Error> {
        let version: Option<i64> =
            sqlx::query_scalar(r"SELECT version FROM appendlog_streams WHERE stream_id = $1")
                .bind(stream_id)
                .fetch_optional(&self.pool)
                .await?;

        version.map_or(Ok(0), decode_version)
    }

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    async fn compare_and_append<'a>(
        &'a self,
        stream_id: &'a str,
        expected_version: u64,
        events: &'a [EventEnvelope],
    ) -> Result<CompareAndAppend, Self::Error> {
        let batch_len =
            i64::try_from(events.len()).map_err(|_| Error::BatchTooLarge(events.len()))?;
        // No stream can be at a version a BIGINT cannot hold.
        let Ok(expected) = i64::try_from(expected_version) else {
            let actual_version = self.stream_version(stream_id).await?;
            return Ok(CompareAndAppend::Conflict { actual_version });
        };

        let mut tx = self.pool.begin().await?;

        let Some((version, event_count)) =
            Self::advance_stream_row(&mut tx, stream_id, expected, batch_len).await?
        else {
            tx.rollback().await?;
            let actual_version = self.stream_version(stream_id).await?;
            tracing::debug!(
                expected_version,
                actual_version,
                "version mismatch, rejecting append"
            );
            return Ok(CompareAndAppend::Conflict { actual_version });
        };

        Self::insert_events(&mut tx, stream_id, event_count - batch_len, events).await?;
        tx.commit().await?;

        let version = decode_version(version)?;
        tracing::debug!(version, "events appended to stream");
        Ok(CompareAndAppend::Applied { version })
    }

    async fn exists<'a>(&'a self, stream_id: &'a str) -> Result<bool, Self::Error> {
        let exists: bool = sqlx::query_scalar(
            r"SELECT EXISTS (SELECT 1 FROM appendlog_streams WHERE stream_id = $1)",
        )
        .bind(stream_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

pub(crate) fn decode_version(version: i64) -> Result<u64, Error> {
    u64::try_from(version).map_err(|_| Error::InvalidVersion(version))
}
