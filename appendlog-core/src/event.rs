//! Event envelope.
//!
//! [`EventEnvelope`] is the unit appended to a stream. It is an opaque,
//! immutable record: an identity chosen by the caller plus a byte payload
//! whose format belongs to whoever produced it. Encoding is not a concern of
//! this crate; stores persist the bytes verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-assigned identifier of an event.
///
/// Uniqueness is the caller's responsibility; stores never generate or
/// rewrite ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An immutable event: identity plus opaque payload bytes.
///
/// Fields are private so an envelope cannot change after construction.
/// Equality compares both the id and the payload bytes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventEnvelope {
    id: EventId,
    payload: Vec<u8>,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(id: impl Into<EventId>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &EventId {
        &self.id
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Split the envelope into its id and payload.
    #[must_use]
    pub fn into_parts(self) -> (EventId, Vec<u8>) {
        (self.id, self.payload)
    }
}

// Payloads can be large and binary; log the size only.
impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
