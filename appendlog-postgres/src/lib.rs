//! Postgres-backed stream storage.
//!
//! This crate provides [`Store`], a `PostgreSQL` implementation of
//! [`appendlog_core::store::VersionedStore`]. Compare-and-append is a single
//! transaction guarded by a conditional write on the stream row, so it is
//! atomic under contention and the repository needs no locks of its own.
//!
//! ```ignore
//! use appendlog_core::repository::Repository;
//! use appendlog_postgres::Store;
//!
//! let pool = sqlx::PgPool::connect(&database_url).await?;
//! let store = Store::new(pool);
//! store.migrate().await?;
//! let repo = Repository::new(store);
//! ```

mod error;
mod store;

pub use error::Error;
pub use store::Store;
