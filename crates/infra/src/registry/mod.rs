//! Durable publication registry boundary.
//!
//! The registry is the crash-recovery source of truth: a publication that is
//! inserted and never completed stays visible to `find_incomplete` until a
//! redrive succeeds. Backends are selected by explicit construction — an
//! in-memory map for tests/dev and a Postgres-backed store for production —
//! and must satisfy the same contract.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryPublicationRegistry;
pub use postgres::PostgresPublicationRegistry;
pub use query::{Pagination, PublicationFilter, PublicationQuery, PublicationQueryResult};
pub use r#trait::{PublicationRegistry, RegistryError};
