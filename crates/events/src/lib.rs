//! Domain layer of the publication ledger.
//!
//! Defines the vocabulary shared by dispatch and recovery:
//! - `DomainEvent` / `EventPayload`: events and their opaque stored form
//! - `EventListener` / `ListenerId`: deferred listeners with stable identity
//! - `EventPublication`: the durable (event, listener) pairing and its
//!   two-state machine

pub mod event;
pub mod listener;
pub mod publication;

pub use event::{DomainEvent, EventPayload};
pub use listener::{EventListener, ListenerId};
pub use publication::{EventPublication, PublicationStatus};
