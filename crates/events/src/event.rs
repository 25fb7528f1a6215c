use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A domain event handed to deferred listeners.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **typed** via a stable name (e.g. "order.placed")
pub trait DomainEvent: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier.
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Serialized event payload as held by the publication ledger.
///
/// Opaque to the registry: the payload is stored and returned verbatim,
/// never interpreted. The type tag exists so operators and resolvers can
/// tell payloads apart without deserializing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    event_type: String,
    payload: JsonValue,
}

impl EventPayload {
    pub fn new(event_type: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Wrap a typed domain event into its stored form.
    ///
    /// Keeps the ledger decoupled from business types while preserving the
    /// type tag needed for later deserialization.
    pub fn from_typed<E>(event: &E) -> Result<Self, serde_json::Error>
    where
        E: DomainEvent + Serialize,
    {
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload: serde_json::to_value(event)?,
        })
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    /// Deserialize the payload back into a typed event.
    pub fn deserialize_into<E>(&self) -> Result<E, serde_json::Error>
    where
        E: DeserializeOwned,
    {
        serde_json::from_value(self.payload.clone())
    }
}
