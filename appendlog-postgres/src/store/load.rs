use appendlog_core::{event::EventEnvelope, store::ReadRange};
use sqlx::{PgConnection, Row, postgres::PgRow};

use super::{Store, decode_version};
use crate::Error;

impl Store {
    pub(in crate::store) async fn fetch_version(
        conn: &mut PgConnection,
        stream_id: &str,
    ) -> Result<Option<u64>, Error> {
        let version: Option<i64> =
            sqlx::query_scalar(r"SELECT version FROM appendlog_streams WHERE stream_id = $1")
                .bind(stream_id)
                .fetch_optional(&mut *conn)
                .await?;
        version.map(decode_version).transpose()
    }

    /// Load the events of `stream_id` selected by `range`, in append order.
    pub(in crate::store) async fn fetch_events(
        conn: &mut PgConnection,
        stream_id: &str,
        range: ReadRange,
    ) -> Result<Vec<EventEnvelope>, Error> {
        // Offsets past BIGINT range select nothing either way.
        let offset = i64::try_from(range.skip).unwrap_or(i64::MAX);
        let limit = range.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = sqlx::query(
            r"
            SELECT event_id, payload
            FROM appendlog_events
            WHERE stream_id = $1
            ORDER BY seq ASC
            OFFSET $2
            LIMIT $3
            ",
        )
        .bind(stream_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        Self::decode_rows(rows)
    }

    pub(in crate::store) fn decode_rows(rows: Vec<PgRow>) -> Result<Vec<EventEnvelope>, Error> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let event_id: String = row.try_get("event_id")?;
            let payload: Vec<u8> = row.try_get("payload")?;
            out.push(EventEnvelope::new(event_id, payload));
        }
        Ok(out)
    }
}
