//! Infrastructure layer: registry backends, dispatch, recovery.

pub mod multicaster;
pub mod recovery;
pub mod registry;

#[cfg(test)]
mod integration_tests;

pub use multicaster::{
    DeferredMulticaster, DispatchError, DispatchReport, FailedDelivery, FailurePolicy,
};
pub use recovery::{ListenerResolver, RecoveryReport, RecoveryRunner, StaticListenerResolver};
pub use registry::{
    InMemoryPublicationRegistry, PostgresPublicationRegistry, PublicationRegistry, RegistryError,
};
