use appendlog_core::event::EventEnvelope;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::Store;
use crate::Error;

/// Bind parameters per event row.
const BINDS_PER_ROW: usize = 4;

/// Rows per `INSERT`. A statement carries at most `u16::MAX` bind parameters.
const INSERT_CHUNK_ROWS: usize = u16::MAX as usize / BINDS_PER_ROW;

impl Store {
    /// Move the stream row from `expected` to the next version, creating it
    /// when `expected` is 0.
    ///
    /// Returns the new `(version, event_count)`, or `None` if the row was not
    /// at `expected`.
    pub(in crate::store) async fn advance_stream_row(
        conn: &mut PgConnection,
        stream_id: &str,
        expected: i64,
        batch_len: i64,
    ) -> Result<Option<(i64, i64)>, Error> {
        let row: Option<(i64, i64)> = if expected == 0 {
            sqlx::query_as(
                r"
                INSERT INTO appendlog_streams (stream_id, version, event_count)
                VALUES ($1, 1, $2)
                ON CONFLICT (stream_id) DO NOTHING
                RETURNING version, event_count
                ",
            )
            .bind(stream_id)
            .bind(batch_len)
            .fetch_optional(&mut *conn)
            .await?
        } else {
            sqlx::query_as(
                r"
                UPDATE appendlog_streams
                SET version = version + 1, event_count = event_count + $3
                WHERE stream_id = $1 AND version = $2
                RETURNING version, event_count
                ",
            )
            .bind(stream_id)
            .bind(expected)
            .bind(batch_len)
            .fetch_optional(&mut *conn)
            .await?
        };
        Ok(row)
    }

    /// Insert `events` at consecutive positions starting at `first_seq`.
    ///
    /// Large batches are split over several statements on the same
    /// connection, so they still commit or roll back together.
    pub(in crate::store) async fn insert_events(
        conn: &mut PgConnection,
        stream_id: &str,
        first_seq: i64,
        events: &[EventEnvelope],
    ) -> Result<(), Error> {
        let mut seqs = first_seq..;
        for chunk in events.chunks(INSERT_CHUNK_ROWS) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO appendlog_events (stream_id, seq, event_id, payload) ",
            );
            // Chunk first: `zip` stops on it without drawing an extra seq.
            qb.push_values(chunk.iter().zip(seqs.by_ref()), |mut b, (event, seq)| {
                b.push_bind(stream_id)
                    .push_bind(seq)
                    .push_bind(event.id().as_str())
                    .push_bind(event.payload());
            });
            qb.build().execute(&mut *conn).await?;
            tracing::trace!(rows = chunk.len(), "inserted event chunk");
        }
        Ok(())
    }
}
