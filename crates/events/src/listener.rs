use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::event::EventPayload;

/// Stable identity of a deferred listener.
///
/// Derived from the listener's name plus the event type it handles, so two
/// listeners consuming the same event stay distinguishable in the ledger
/// (e.g. `"notifier::order.placed"`). The identity must remain stable across
/// process restarts; it is the key recovery uses to find the listener again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(String);

impl ListenerId {
    pub fn new(listener_name: &str, event_type: &str) -> Self {
        Self(format!("{listener_name}::{event_type}"))
    }

    /// Use a pre-formed identity (e.g. read back from storage).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deferred listener: runs only after its triggering unit of work has
/// committed.
///
/// Listeners are registered explicitly — there is no reflective discovery.
/// `invoke` is called synchronously by the dispatch path and again by
/// recovery when a publication is redriven, so implementations must tolerate
/// duplicate invocations (at-least-once delivery).
pub trait EventListener: Send + Sync {
    /// Stable identity used to key publications and resolve redrives.
    fn listener_id(&self) -> ListenerId;

    /// Handle the event. An error leaves the publication incomplete.
    fn invoke(&self, event: &EventPayload) -> anyhow::Result<()>;
}

impl<L> EventListener for Arc<L>
where
    L: EventListener + ?Sized,
{
    fn listener_id(&self) -> ListenerId {
        (**self).listener_id()
    }

    fn invoke(&self, event: &EventPayload) -> anyhow::Result<()> {
        (**self).invoke(event)
    }
}
