//! The durable record of one (event, listener) delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use publedger_core::PublicationId;

use crate::event::EventPayload;
use crate::listener::ListenerId;

/// Delivery state of a publication.
///
/// Two states, one forward transition, no reversal: a publication is PENDING
/// until its listener finishes without error, COMPLETED forever after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    Pending,
    Completed,
}

/// Immutable record of one (event, target-listener) pairing plus its
/// completion state.
///
/// Created at the moment the dispatcher decides to deliver to a given
/// listener, before the listener runs. The record outlives the originating
/// transaction; as long as it is pending it is queryable and redrivable.
/// Completion is monotonic — `mark_completed` is first-write-wins and
/// re-completion is a no-op, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPublication {
    id: PublicationId,
    event: EventPayload,
    listener_id: ListenerId,
    published_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl EventPublication {
    /// Create a fresh PENDING publication with a new identifier.
    pub fn new(event: EventPayload, listener_id: ListenerId) -> Self {
        Self {
            id: PublicationId::new(),
            event,
            listener_id,
            published_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Reassemble a publication from stored fields (e.g. a database row).
    pub fn from_parts(
        id: PublicationId,
        event: EventPayload,
        listener_id: ListenerId,
        published_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            event,
            listener_id,
            published_at,
            completed_at,
        }
    }

    pub fn id(&self) -> PublicationId {
        self.id
    }

    pub fn event(&self) -> &EventPayload {
        &self.event
    }

    pub fn listener_id(&self) -> &ListenerId {
        &self.listener_id
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn status(&self) -> PublicationStatus {
        match self.completed_at {
            None => PublicationStatus::Pending,
            Some(_) => PublicationStatus::Completed,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Record completion. First write wins: once a completion time is set it
    /// is never changed, and further calls are no-ops.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        if self.completed_at.is_none() {
            self.completed_at = Some(at);
        }
    }
}
