/// Error type for `PostgreSQL` store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Query execution or transaction failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A version or event count read from the database was negative.
    #[error("invalid version value from database: {0}")]
    InvalidVersion(i64),
    /// The batch has more events than a `BIGINT` sequence can address.
    #[error("event batch too large: {0} events")]
    BatchTooLarge(usize),
}
