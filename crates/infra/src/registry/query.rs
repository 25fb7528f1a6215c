//! Publication query interface for inspection and operator tooling.
//!
//! Read-only, paginated queries over the ledger, for an admin CLI or a
//! background job that wants to inspect stuck work without redriving it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use publedger_core::PublicationId;
use publedger_events::{EventPublication, ListenerId, PublicationStatus};

use super::r#trait::RegistryError;

/// Pagination parameters for publication queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000), // Cap at 1000 for safety
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for publication queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicationFilter {
    /// Filter by target listener (optional).
    pub listener_id: Option<ListenerId>,
    /// Filter by event type tag (optional, e.g. "order.placed").
    pub event_type: Option<String>,
    /// Filter by delivery state (optional).
    pub status: Option<PublicationStatus>,
    /// Filter publications published after this time (optional).
    pub published_after: Option<DateTime<Utc>>,
    /// Filter publications published before this time (optional).
    pub published_before: Option<DateTime<Utc>>,
}

/// Paginated publication query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationQueryResult {
    /// The publications matching the query.
    pub publications: Vec<EventPublication>,
    /// Total number of records matching the filter (across all pages).
    pub total: u64,
    /// Pagination parameters used.
    pub pagination: Pagination,
    /// Whether there are more records available.
    pub has_more: bool,
}

/// Async query interface for publication inspection.
#[async_trait::async_trait]
pub trait PublicationQuery: Send + Sync {
    /// Query publications with optional filters and pagination.
    ///
    /// Records are returned oldest-first (publication time, then id).
    async fn query_publications(
        &self,
        filter: PublicationFilter,
        pagination: Pagination,
    ) -> Result<PublicationQueryResult, RegistryError>;

    /// Fetch a single publication by its identifier.
    async fn get_publication_by_id(
        &self,
        id: PublicationId,
    ) -> Result<Option<EventPublication>, RegistryError>;
}
