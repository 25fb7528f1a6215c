//! Redriving incomplete publications.
//!
//! After a crash, or after a listener failed during the original dispatch,
//! its publications sit in the registry as pending work. The recovery
//! runner drains that queue: it resolves each publication's listener from
//! its stable identity, re-invokes it with the stored payload, and
//! completes the same record on success. Because the original record is
//! reused, a logical delivery never shows up twice in `find_incomplete`
//! once it has succeeded through any path.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use publedger_core::PublicationId;
use publedger_events::{EventListener, EventPublication, ListenerId};

use crate::multicaster::FailedDelivery;
use crate::registry::{PublicationRegistry, RegistryError};

/// Reconstructs a listener reference from its stored identity.
///
/// The ledger stores only `ListenerId` strings; something has to map those
/// back to live listeners at redrive time. Returning `None` means the
/// listener no longer exists — the runner skips and reports it, it never
/// crashes over it.
pub trait ListenerResolver: Send + Sync {
    fn resolve(&self, listener_id: &ListenerId) -> Option<Arc<dyn EventListener>>;
}

/// Resolver over a fixed set of listeners registered at construction time.
#[derive(Default)]
pub struct StaticListenerResolver {
    listeners: HashMap<ListenerId, Arc<dyn EventListener>>,
}

impl StaticListenerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener under its own identity.
    pub fn register(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.insert(listener.listener_id(), listener);
        self
    }
}

impl ListenerResolver for StaticListenerResolver {
    fn resolve(&self, listener_id: &ListenerId) -> Option<Arc<dyn EventListener>> {
        self.listeners.get(listener_id).cloned()
    }
}

/// Outcome of one redrive pass.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Publications completed by this pass.
    pub recovered: Vec<PublicationId>,
    /// Publications whose listener could not be resolved; left pending.
    pub skipped: Vec<PublicationId>,
    /// Listeners that failed again; their publications stay pending.
    pub failed: Vec<FailedDelivery>,
}

impl RecoveryReport {
    pub fn fully_recovered(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Re-invokes listeners for publications found incomplete.
///
/// Typically driven by a scheduler or an operator command; each call is one
/// pass over the currently incomplete work. Safe to run concurrently with
/// live dispatches: a completion that races the original dispatch path is
/// treated as success.
pub struct RecoveryRunner<R, L> {
    registry: R,
    resolver: L,
}

impl<R, L> RecoveryRunner<R, L> {
    pub fn new(registry: R, resolver: L) -> Self {
        Self { registry, resolver }
    }
}

impl<R, L> RecoveryRunner<R, L>
where
    R: PublicationRegistry,
    L: ListenerResolver,
{
    /// Redrive every incomplete publication.
    pub fn redrive_incomplete(&self) -> Result<RecoveryReport, RegistryError> {
        let pending = self.registry.find_incomplete()?;
        self.redrive(pending)
    }

    /// Redrive only publications that have been pending since before
    /// `older_than` — avoids racing dispatches still in flight.
    pub fn redrive_stale(&self, older_than: DateTime<Utc>) -> Result<RecoveryReport, RegistryError> {
        let pending = self.registry.find_incomplete_older_than(older_than)?;
        self.redrive(pending)
    }

    fn redrive(
        &self,
        publications: Vec<EventPublication>,
    ) -> Result<RecoveryReport, RegistryError> {
        let mut report = RecoveryReport::default();

        for publication in publications {
            let id = publication.id();
            let listener_id = publication.listener_id();

            let Some(listener) = self.resolver.resolve(listener_id) else {
                warn!(
                    listener = %listener_id,
                    publication = %id,
                    "no listener registered for incomplete publication; skipping"
                );
                report.skipped.push(id);
                continue;
            };

            match listener.invoke(publication.event()) {
                Ok(()) => match self.registry.mark_completed(id, Utc::now()) {
                    Ok(()) => report.recovered.push(id),
                    // The original dispatch path (or compaction) won the
                    // race; the delivery is done either way.
                    Err(RegistryError::NotFound(_)) => report.recovered.push(id),
                    Err(other) => return Err(other),
                },
                Err(err) => {
                    warn!(
                        listener = %listener_id,
                        publication = %id,
                        error = %err,
                        "redrive failed; publication left incomplete"
                    );
                    report.failed.push(FailedDelivery {
                        publication_id: id,
                        listener_id: listener_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::registry::InMemoryPublicationRegistry;
    use publedger_events::EventPayload;

    struct RecordingListener {
        name: &'static str,
        healthy: AtomicBool,
        invocations: AtomicUsize,
    }

    impl RecordingListener {
        fn new(name: &'static str, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                healthy: AtomicBool::new(healthy),
                invocations: AtomicUsize::new(0),
            })
        }

        fn heal(&self) {
            self.healthy.store(true, Ordering::SeqCst);
        }
    }

    impl EventListener for RecordingListener {
        fn listener_id(&self) -> ListenerId {
            ListenerId::new(self.name, "order.placed")
        }

        fn invoke(&self, _event: &EventPayload) -> anyhow::Result<()> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                anyhow::bail!("still broken")
            }
        }
    }

    fn pending_publication(listener: &str) -> EventPublication {
        EventPublication::new(
            EventPayload::new("order.placed", serde_json::json!({"order": "o-1"})),
            ListenerId::new(listener, "order.placed"),
        )
    }

    #[test]
    fn redrives_incomplete_publications_to_completion() {
        let registry = InMemoryPublicationRegistry::arc();
        let listener = RecordingListener::new("notifier", true);
        registry.insert(pending_publication("notifier")).unwrap();

        let runner = RecoveryRunner::new(
            registry.clone(),
            StaticListenerResolver::new().register(listener.clone()),
        );
        let report = runner.redrive_incomplete().unwrap();

        assert!(report.fully_recovered());
        assert_eq!(report.recovered.len(), 1);
        assert_eq!(listener.invocations.load(Ordering::SeqCst), 1);
        assert!(registry.find_incomplete().unwrap().is_empty());
    }

    #[test]
    fn missing_listener_is_skipped_and_left_pending() {
        let registry = InMemoryPublicationRegistry::arc();
        registry.insert(pending_publication("vanished")).unwrap();

        let runner = RecoveryRunner::new(registry.clone(), StaticListenerResolver::new());
        let report = runner.redrive_incomplete().unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.recovered.is_empty());
        assert_eq!(registry.find_incomplete().unwrap().len(), 1);
    }

    #[test]
    fn failing_redrive_leaves_publication_pending() {
        let registry = InMemoryPublicationRegistry::arc();
        let listener = RecordingListener::new("notifier", false);
        registry.insert(pending_publication("notifier")).unwrap();

        let runner = RecoveryRunner::new(
            registry.clone(),
            StaticListenerResolver::new().register(listener.clone()),
        );

        let report = runner.redrive_incomplete().unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(registry.find_incomplete().unwrap().len(), 1);

        // Once the listener recovers, the next pass completes the record.
        listener.heal();
        let report = runner.redrive_incomplete().unwrap();
        assert_eq!(report.recovered.len(), 1);
        assert!(registry.find_incomplete().unwrap().is_empty());
    }

    #[test]
    fn stale_redrive_ignores_fresh_publications() {
        let registry = InMemoryPublicationRegistry::arc();
        let listener = RecordingListener::new("notifier", true);
        let record = pending_publication("notifier");
        let published_at = record.published_at();
        registry.insert(record).unwrap();

        let runner = RecoveryRunner::new(
            registry.clone(),
            StaticListenerResolver::new().register(listener.clone()),
        );

        // Cutoff before publication: the record is too fresh to touch.
        let report = runner
            .redrive_stale(published_at - chrono::Duration::seconds(1))
            .unwrap();
        assert!(report.recovered.is_empty());
        assert_eq!(listener.invocations.load(Ordering::SeqCst), 0);

        let report = runner
            .redrive_stale(published_at + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(report.recovered.len(), 1);
    }

    #[test]
    fn completion_race_with_dispatch_path_counts_as_success() {
        // A registry double that reports pending work but answers NotFound
        // on completion, as if the original dispatch completed and
        // compaction removed the row between our query and our mark.
        struct RacedRegistry {
            record: EventPublication,
        }

        impl PublicationRegistry for RacedRegistry {
            fn insert(&self, _publication: EventPublication) -> Result<(), RegistryError> {
                Ok(())
            }

            fn mark_completed(
                &self,
                id: PublicationId,
                _completed_at: DateTime<Utc>,
            ) -> Result<(), RegistryError> {
                Err(RegistryError::NotFound(id))
            }

            fn find_incomplete(&self) -> Result<Vec<EventPublication>, RegistryError> {
                Ok(vec![self.record.clone()])
            }

            fn find_incomplete_older_than(
                &self,
                _cutoff: DateTime<Utc>,
            ) -> Result<Vec<EventPublication>, RegistryError> {
                self.find_incomplete()
            }

            fn delete_completed(
                &self,
                _older_than: Option<DateTime<Utc>>,
            ) -> Result<u64, RegistryError> {
                Ok(0)
            }
        }

        let listener = RecordingListener::new("notifier", true);
        let registry = RacedRegistry {
            record: pending_publication("notifier"),
        };

        let runner = RecoveryRunner::new(
            registry,
            StaticListenerResolver::new().register(listener.clone()),
        );
        let report = runner.redrive_incomplete().unwrap();

        assert!(report.fully_recovered());
        assert_eq!(report.recovered.len(), 1);
    }
}
