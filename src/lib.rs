#![doc = include_str!("../README.md")]

#[cfg(feature = "test-util")]
pub use appendlog_core::test;
pub use appendlog_core::{
    concurrency,
    concurrency::WriteRejected,
    condition,
    condition::{Condition, MultiOperationName, OperationName, WriteCondition},
    event,
    event::{EventEnvelope, EventId},
    repository,
    repository::{EventStream, Repository, RetryOutcome, WriteError},
};

pub mod store {

    pub use appendlog_core::store::{
        AppendResult, ReadRange, StreamState, VersionedStore,
    };

    // Backend-facing outcome of a single compare-and-append attempt.
    // Most users should interact with the Repository API instead.
    #[doc(hidden)]
    pub use appendlog_core::store::CompareAndAppend;

    #[cfg(feature = "postgres")]
    #[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
    pub mod postgres {
        pub use appendlog_postgres::{Error, Store};
    }

    pub use appendlog_core::store::inmemory;
}

pub mod lock {
    pub use appendlog_core::lock::{StreamGuard, StreamLocks};
}
