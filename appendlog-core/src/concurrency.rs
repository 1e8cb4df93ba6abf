//! Optimistic concurrency failures.
//!
//! Writes carry a [`WriteCondition`] on the stream version. When the
//! condition does not hold at commit time the write is rejected with
//! [`WriteRejected`], and nothing is persisted. Rejection is recoverable: the
//! caller reloads the stream and decides whether to try again.

use thiserror::Error;

use crate::condition::WriteCondition;

/// The write condition did not hold against the stream's actual version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_rejection(.stream_id, .condition, .actual_version))]
pub struct WriteRejected {
    /// Stream the write targeted.
    pub stream_id: String,
    /// The condition that failed.
    pub condition: WriteCondition,
    /// Version of the stream when the condition was evaluated. `0` means the
    /// stream did not exist.
    pub actual_version: u64,
}

impl WriteRejected {
    #[must_use]
    pub fn new(stream_id: impl Into<String>, condition: WriteCondition, actual_version: u64) -> Self {
        Self {
            stream_id: stream_id.into(),
            condition,
            actual_version,
        }
    }
}

/// Build a human-readable message for a [`WriteRejected`], including an
/// actionable hint for the caller.
fn format_rejection(stream_id: &str, condition: &WriteCondition, actual_version: &u64) -> String {
    if *actual_version == 0 {
        format!(
            "write condition not fulfilled for stream `{stream_id}`: expected {condition}, but \
             the stream does not exist (hint: write without a condition or expect version 0)"
        )
    } else {
        format!(
            "write condition not fulfilled for stream `{stream_id}`: expected {condition}, found \
             version {actual_version} (hint: stream was modified; reload and retry)"
        )
    }
}
