//! Integration tests for the full publication pipeline.
//!
//! Tests: dispatch → registry → listener failure → recovery redrive
//!
//! Verifies:
//! - Listener failures surface as queryable incomplete publications
//! - Recovery drains the incomplete queue without double-reporting
//! - Compaction never races away pending work

mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use chrono::Utc;

    use publedger_events::{EventListener, EventPayload, EventPublication, ListenerId};

    use crate::multicaster::DeferredMulticaster;
    use crate::recovery::{RecoveryRunner, StaticListenerResolver};
    use crate::registry::{InMemoryPublicationRegistry, PublicationRegistry};

    struct FlakyListener {
        name: &'static str,
        healthy: AtomicBool,
        invocations: AtomicUsize,
    }

    impl FlakyListener {
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

        fn invocations(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    impl EventListener for FlakyListener {
        fn listener_id(&self) -> ListenerId {
            ListenerId::new(self.name, "order.placed")
        }

        fn invoke(&self, _event: &EventPayload) -> anyhow::Result<()> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                anyhow::bail!("listener unavailable")
            }
        }
    }

    fn order_placed() -> EventPayload {
        EventPayload::new("order.placed", serde_json::json!({"order": "o-42"}))
    }

    #[test]
    fn failed_listener_is_recovered_on_redrive() {
        let registry = InMemoryPublicationRegistry::arc();
        let multicaster = DeferredMulticaster::new(registry.clone());

        let first = FlakyListener::new("first", true);
        let second = FlakyListener::new("second", false);
        let third = FlakyListener::new("third", true);
        let listeners: Vec<Arc<dyn EventListener>> =
            vec![first.clone(), second.clone(), third.clone()];

        let payload = order_placed();
        let report = multicaster.dispatch(&payload, &listeners).unwrap();

        // Exactly N-1 completed, exactly one pending, belonging to the
        // listener that threw and carrying the dispatched event.
        assert_eq!(report.completed.len(), 2);
        let pending = registry.find_incomplete().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].listener_id(),
            &ListenerId::new("second", "order.placed")
        );
        assert_eq!(pending[0].event(), &payload);

        // Crash-recovery: the listener comes back, a redrive pass drains
        // the queue, and the successful listeners are not re-invoked.
        second.heal();
        let resolver = StaticListenerResolver::new()
            .register(first.clone())
            .register(second.clone())
            .register(third.clone());
        let runner = RecoveryRunner::new(registry.clone(), resolver);

        let recovery = runner.redrive_incomplete().unwrap();
        assert_eq!(recovery.recovered.len(), 1);
        assert!(registry.find_incomplete().unwrap().is_empty());
        assert_eq!(first.invocations(), 1);
        assert_eq!(second.invocations(), 2);
        assert_eq!(third.invocations(), 1);
    }

    #[test]
    fn recovered_delivery_is_never_double_reported() {
        let registry = InMemoryPublicationRegistry::arc();
        let multicaster = DeferredMulticaster::new(registry.clone());

        let listener = FlakyListener::new("only", false);
        let listeners: Vec<Arc<dyn EventListener>> = vec![listener.clone()];
        multicaster.dispatch(&order_placed(), &listeners).unwrap();

        listener.heal();
        let runner = RecoveryRunner::new(
            registry.clone(),
            StaticListenerResolver::new().register(listener.clone()),
        );

        // Recovery reuses the original record, so a second pass finds
        // nothing left to redrive.
        runner.redrive_incomplete().unwrap();
        let second_pass = runner.redrive_incomplete().unwrap();
        assert!(second_pass.recovered.is_empty());
        assert!(second_pass.fully_recovered());
        assert!(registry.find_incomplete().unwrap().is_empty());
    }

    #[test]
    fn concurrent_dispatches_lose_no_publications() {
        let registry = InMemoryPublicationRegistry::arc();
        let threads = 8usize;
        let events_per_thread = 25usize;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let multicaster = DeferredMulticaster::new(registry);
                    let listener = FlakyListener::new("worker", true);
                    let listeners: Vec<Arc<dyn EventListener>> = vec![listener];
                    for i in 0..events_per_thread {
                        let payload = EventPayload::new(
                            "order.placed",
                            serde_json::json!({"thread": t, "seq": i}),
                        );
                        multicaster.dispatch(&payload, &listeners).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.find_incomplete().unwrap().is_empty());
        assert_eq!(registry.len(), threads * events_per_thread);
    }

    #[test]
    fn compaction_never_removes_pending_work_under_races() {
        let registry = InMemoryPublicationRegistry::arc();

        // Seed pending records that stay pending for the whole test.
        let mut sentinel_ids = Vec::new();
        for _ in 0..10 {
            let record = EventPublication::new(
                order_placed(),
                ListenerId::new("stuck", "order.placed"),
            );
            sentinel_ids.push(record.id());
            registry.insert(record).unwrap();
        }

        // One thread keeps inserting-and-completing, one keeps compacting.
        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let record = EventPublication::new(
                        order_placed(),
                        ListenerId::new("fast", "order.placed"),
                    );
                    let id = record.id();
                    registry.insert(record).unwrap();
                    registry.mark_completed(id, Utc::now()).unwrap();
                }
            })
        };
        let compactor = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    registry.delete_completed(None).unwrap();
                }
            })
        };

        writer.join().unwrap();
        compactor.join().unwrap();
        registry.delete_completed(None).unwrap();

        // Every sentinel survived; everything completed is gone.
        let pending = registry.find_incomplete().unwrap();
        let pending_ids: Vec<_> = pending.iter().map(|p| p.id()).collect();
        assert_eq!(pending_ids, sentinel_ids);
        assert_eq!(registry.len(), sentinel_ids.len());
    }

    mod properties {
        use super::*;
        use chrono::{DateTime, Duration, TimeZone, Utc};
        use proptest::prelude::*;

        fn timestamps() -> impl Strategy<Value = DateTime<Utc>> {
            // Any second of 2026, plenty for ordering properties.
            (0i64..31_536_000).prop_map(|offset| {
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset)
            })
        }

        proptest! {
            // However many completion signals arrive, and in whatever
            // order, the first one wins and none of them fail.
            #[test]
            fn completion_is_idempotent(times in proptest::collection::vec(timestamps(), 1..8)) {
                let registry = InMemoryPublicationRegistry::new();
                let record = EventPublication::new(
                    order_placed(),
                    ListenerId::new("notifier", "order.placed"),
                );
                let id = record.id();
                registry.insert(record).unwrap();

                for at in &times {
                    registry.mark_completed(id, *at).unwrap();
                }

                prop_assert!(registry.find_incomplete().unwrap().is_empty());
                // delete_completed with a cutoff right after the first
                // signal removes the record only if the first write won.
                let removed = registry
                    .delete_completed(Some(times[0] + Duration::seconds(1)))
                    .unwrap();
                prop_assert_eq!(removed, 1);
            }

            // Compaction removes exactly the completed subset, regardless
            // of which publications completed.
            #[test]
            fn compaction_removes_exactly_the_completed_subset(completed_mask in proptest::collection::vec(any::<bool>(), 1..20)) {
                let registry = InMemoryPublicationRegistry::new();
                let mut pending_expected = 0u64;

                for completed in &completed_mask {
                    let record = EventPublication::new(
                        order_placed(),
                        ListenerId::new("notifier", "order.placed"),
                    );
                    let id = record.id();
                    registry.insert(record).unwrap();
                    if *completed {
                        registry.mark_completed(id, Utc::now()).unwrap();
                    } else {
                        pending_expected += 1;
                    }
                }

                let removed = registry.delete_completed(None).unwrap();

                prop_assert_eq!(removed, completed_mask.len() as u64 - pending_expected);
                prop_assert_eq!(registry.find_incomplete().unwrap().len() as u64, pending_expected);
                prop_assert_eq!(registry.len() as u64, pending_expected);
            }
        }
    }
}
