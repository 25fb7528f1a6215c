//! Deferred dispatch coordination.
//!
//! `DeferredMulticaster` is invoked after the originating unit of work has
//! committed, with the event and the already-resolved set of deferred
//! listeners. Per listener it records a publication, invokes the listener,
//! and completes the publication on success. The registry record — not the
//! return value of `dispatch` — is the source of truth for "did this
//! complete": a listener failure leaves its publication pending and visible
//! to recovery, and never prevents the remaining listeners from running.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use publedger_core::PublicationId;
use publedger_events::{EventListener, EventPayload, EventPublication, ListenerId};

use crate::registry::{PublicationRegistry, RegistryError};

/// What `dispatch` does with listener failures once the loop has finished.
///
/// Registry state reflects every listener's outcome under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Report failures via tracing and return them in the report (default).
    #[default]
    Swallow,
    /// Additionally re-raise the collected failures as
    /// `DispatchError::ListenerFailures` after all listeners ran.
    Aggregate,
}

/// One listener invocation that raised during dispatch or redrive.
#[derive(Debug, Clone)]
pub struct FailedDelivery {
    pub publication_id: PublicationId,
    pub listener_id: ListenerId,
    pub error: String,
}

/// Outcome of a `dispatch` call.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Publications whose listeners completed, in invocation order.
    pub completed: Vec<PublicationId>,
    /// Listeners that failed; their publications remain pending.
    pub failed: Vec<FailedDelivery>,
}

impl DispatchReport {
    pub fn all_completed(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The registry backend failed; the affected listener's delivery was
    /// not durably recorded, so this always propagates.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Raised under `FailurePolicy::Aggregate` once all listeners ran.
    #[error("{count} listener invocation(s) failed during dispatch", count = .0.len())]
    ListenerFailures(Vec<FailedDelivery>),
}

/// Coordinates dispatch of a committed event to its deferred listeners
/// while maintaining registry state.
///
/// Constructed once at process start with an explicit registry — no global
/// lookup — and shared by reference with whatever component performs the
/// commit-triggered dispatch.
#[derive(Debug)]
pub struct DeferredMulticaster<R> {
    registry: R,
    policy: FailurePolicy,
}

impl<R> DeferredMulticaster<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn into_registry(self) -> R {
        self.registry
    }
}

impl<R> DeferredMulticaster<R>
where
    R: PublicationRegistry,
{
    /// Dispatch a committed event to the given listeners.
    ///
    /// Listeners run synchronously, in slice order (the caller resolves the
    /// set once, up front, so the order is deterministic for a given input).
    /// Per listener:
    ///
    /// 1. a publication with a fresh identifier is inserted (durable before
    ///    the listener runs);
    /// 2. the listener is invoked;
    /// 3. on success the publication is completed with the current time; on
    ///    failure it stays pending and the loop continues with the next
    ///    listener.
    ///
    /// Registry errors propagate immediately — a delivery that was not
    /// durably recorded must not be silently swallowed. Listener failures
    /// never escape as lost data; under `FailurePolicy::Aggregate` they are
    /// re-raised after the loop, with registry state already reflecting
    /// every listener.
    ///
    /// An empty listener slice is a no-op with no registry writes.
    pub fn dispatch(
        &self,
        event: &EventPayload,
        listeners: &[Arc<dyn EventListener>],
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();

        for listener in listeners {
            let listener_id = listener.listener_id();
            let publication = EventPublication::new(event.clone(), listener_id.clone());
            let publication_id = publication.id();

            self.registry.insert(publication)?;

            match listener.invoke(event) {
                Ok(()) => {
                    self.registry.mark_completed(publication_id, Utc::now())?;
                    report.completed.push(publication_id);
                }
                Err(err) => {
                    warn!(
                        listener = %listener_id,
                        publication = %publication_id,
                        error = %err,
                        "deferred listener failed; publication left incomplete"
                    );
                    report.failed.push(FailedDelivery {
                        publication_id,
                        listener_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        if self.policy == FailurePolicy::Aggregate && !report.failed.is_empty() {
            return Err(DispatchError::ListenerFailures(report.failed));
        }

        Ok(report)
    }
}
