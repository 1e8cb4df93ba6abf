//! Core traits and types for the appendlog event-stream store.
//!
//! This crate provides the building blocks of an append-only, versioned
//! stream store with optimistic concurrency:
//!
//! - [`event`] - The immutable unit appended to a stream (`EventEnvelope`)
//! - [`condition`] - Write conditions over a stream version (`Condition`, `WriteCondition`)
//! - [`store`] - Backend contract (`VersionedStore`) and an in-memory backend
//! - [`repository`] - The stream engine (`Repository`): reads, conditional writes, existence checks
//! - [`concurrency`] - The recoverable rejection raised when a condition fails (`WriteRejected`)
//! - [`lock`] - Per-stream write serialization for backends without atomic appends
//!
//! # Example
//!
//! ```
//! use appendlog_core::{repository::Repository, store::inmemory};
//!
//! // Create an in-memory store and repository
//! let repo = Repository::new(inmemory::Store::new());
//! ```
//!
//! Most users should depend on the [`appendlog`](https://docs.rs/appendlog) crate,
//! which re-exports these types with a flatter API surface.

pub mod concurrency;
pub mod condition;
pub mod event;
pub mod lock;
pub mod repository;
pub mod store;
