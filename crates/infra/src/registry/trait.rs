use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use publedger_core::PublicationId;
use publedger_events::EventPublication;

/// Registry operation error.
///
/// `DuplicatePublication` and `NotFound` signal caller defects or tolerated
/// races; `Storage` means the backend itself failed and must always
/// propagate — swallowing it would break the at-least-once guarantee.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Insert collided with an existing identifier. Treated as an
    /// id-generation defect, never retried.
    #[error("publication already exists: {0}")]
    DuplicatePublication(PublicationId),

    /// Completion referenced an unknown identifier.
    #[error("publication not found: {0}")]
    NotFound(PublicationId),

    /// The backend is unavailable or rejected the operation.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable, queryable store of `EventPublication` records.
///
/// ## Contract
///
/// - Mutations are durable before they return: once `insert` succeeds the
///   record survives a crash.
/// - `mark_completed` is idempotent: the first completion time wins and a
///   second call is a success, not an error.
/// - A PENDING record is never deleted; only COMPLETED records are eligible
///   for compaction via `delete_completed`.
/// - Queries reflect a consistent snapshot — no record is observed
///   mid-insert.
///
/// ## Thread Safety
///
/// Implementations must be safe for concurrent `insert` / `mark_completed` /
/// `find_incomplete` calls from multiple dispatching threads and a
/// concurrently running recovery runner. Operations on different
/// identifiers must not block each other beyond the backend's own locking.
pub trait PublicationRegistry: Send + Sync {
    /// Store a new PENDING record.
    ///
    /// Fails with `DuplicatePublication` if the identifier already exists —
    /// an existing record is never silently overwritten.
    fn insert(&self, publication: EventPublication) -> Result<(), RegistryError>;

    /// Record completion on the matching publication.
    ///
    /// `NotFound` if no record with that identifier exists. Calling this
    /// twice for the same identifier succeeds and leaves the original
    /// completion time intact (tolerates duplicate completion signals).
    fn mark_completed(
        &self,
        id: PublicationId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RegistryError>;

    /// All PENDING publications, in insertion order.
    ///
    /// This is the crash-recovery entry point.
    fn find_incomplete(&self) -> Result<Vec<EventPublication>, RegistryError>;

    /// PENDING publications published strictly before `cutoff`.
    ///
    /// Lets recovery focus on work that has been stuck for a while instead
    /// of racing dispatches that are still in flight.
    fn find_incomplete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EventPublication>, RegistryError>;

    /// Remove COMPLETED publications, optionally only those completed before
    /// `older_than`. Never touches PENDING records. Returns the number of
    /// records removed.
    ///
    /// Purely a maintenance operation with no effect on delivery
    /// correctness.
    fn delete_completed(&self, older_than: Option<DateTime<Utc>>) -> Result<u64, RegistryError>;
}

impl<R> PublicationRegistry for Arc<R>
where
    R: PublicationRegistry + ?Sized,
{
    fn insert(&self, publication: EventPublication) -> Result<(), RegistryError> {
        (**self).insert(publication)
    }

    fn mark_completed(
        &self,
        id: PublicationId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        (**self).mark_completed(id, completed_at)
    }

    fn find_incomplete(&self) -> Result<Vec<EventPublication>, RegistryError> {
        (**self).find_incomplete()
    }

    fn find_incomplete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EventPublication>, RegistryError> {
        (**self).find_incomplete_older_than(cutoff)
    }

    fn delete_completed(&self, older_than: Option<DateTime<Utc>>) -> Result<u64, RegistryError> {
        (**self).delete_completed(older_than)
    }
}
