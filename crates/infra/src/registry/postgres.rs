//! Postgres-backed publication registry.
//!
//! Persists publications in a single table keyed by publication id. Inserts
//! and completions commit before returning, which is what makes the
//! registry's durability guarantee hold across crashes.
//!
//! ## Expected schema
//!
//! ```sql
//! CREATE TABLE event_publications (
//!     id            UUID PRIMARY KEY,
//!     event_type    TEXT NOT NULL,
//!     payload       JSONB NOT NULL,
//!     listener_id   TEXT NOT NULL,
//!     published_at  TIMESTAMPTZ NOT NULL,
//!     completed_at  TIMESTAMPTZ
//! );
//!
//! -- Keeps find_incomplete efficient once completed rows accumulate.
//! CREATE INDEX event_publications_incomplete_idx
//!     ON event_publications (published_at)
//!     WHERE completed_at IS NULL;
//! ```
//!
//! ## Error mapping
//!
//! | SQLx error | PostgreSQL code | RegistryError | Scenario |
//! |------------|-----------------|---------------|----------|
//! | Database (unique violation) | `23505` | `DuplicatePublication` | Insert collided with an existing id |
//! | Database (other) | any other | `Storage` | Constraint or backend failure |
//! | PoolClosed / network / other | N/A | `Storage` | Backend unavailable |
//!
//! Completion of an already-completed row is detected via the conditional
//! `UPDATE` touching zero rows and is reported as success, never as an
//! error: the original completion time stays in place.
//!
//! ## Thread safety
//!
//! `PostgresPublicationRegistry` is `Send + Sync`; all operations go through
//! the SQLx connection pool, so concurrent inserts and completions on
//! different ids do not block each other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use publedger_core::PublicationId;
use publedger_events::{EventPayload, EventPublication, ListenerId};

use super::query::{Pagination, PublicationFilter, PublicationQuery, PublicationQueryResult};
use super::r#trait::{PublicationRegistry, RegistryError};

/// Durable publication registry on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresPublicationRegistry {
    pool: Arc<PgPool>,
}

impl PostgresPublicationRegistry {
    /// Create a registry backed by the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert a new PENDING publication.
    ///
    /// The row is committed before this returns. A colliding id maps to
    /// `RegistryError::DuplicatePublication`.
    #[instrument(skip(self, publication), fields(id = %publication.id()), err)]
    pub async fn insert_publication(
        &self,
        publication: &EventPublication,
    ) -> Result<(), RegistryError> {
        sqlx::query(
            r#"
            INSERT INTO event_publications (
                id,
                event_type,
                payload,
                listener_id,
                published_at,
                completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(uuid::Uuid::from(publication.id()))
        .bind(publication.event().event_type())
        .bind(publication.event().payload())
        .bind(publication.listener_id().as_str())
        .bind(publication.published_at())
        .bind(publication.completed_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistryError::DuplicatePublication(publication.id())
            } else {
                map_sqlx_error("insert_publication", e)
            }
        })?;

        Ok(())
    }

    /// Record completion, first write wins.
    ///
    /// The `UPDATE` only touches rows that are still pending; when it
    /// touches nothing, an existence probe distinguishes "already complete"
    /// (success) from "unknown id" (`NotFound`).
    #[instrument(skip(self), fields(id = %id), err)]
    pub async fn complete_publication(
        &self,
        id: PublicationId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let updated = sqlx::query(
            r#"
            UPDATE event_publications
            SET completed_at = $2
            WHERE id = $1 AND completed_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(completed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("complete_publication", e))?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM event_publications WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("complete_publication", e))?;

        match exists {
            Some(_) => Ok(()),
            None => Err(RegistryError::NotFound(id)),
        }
    }

    /// All pending publications, oldest first, optionally only those
    /// published before `cutoff`.
    #[instrument(skip(self), err)]
    pub async fn incomplete_publications(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventPublication>, RegistryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                event_type,
                payload,
                listener_id,
                published_at,
                completed_at
            FROM event_publications
            WHERE completed_at IS NULL
                AND ($1::timestamptz IS NULL OR published_at < $1)
            ORDER BY published_at ASC, id ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("incomplete_publications", e))?;

        rows_into_publications(rows)
    }

    /// Remove completed publications, optionally only those completed
    /// before `older_than`. Pending rows are untouched by construction.
    #[instrument(skip(self), err)]
    pub async fn purge_completed(
        &self,
        older_than: Option<DateTime<Utc>>,
    ) -> Result<u64, RegistryError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM event_publications
            WHERE completed_at IS NOT NULL
                AND ($1::timestamptz IS NULL OR completed_at < $1)
            "#,
        )
        .bind(older_than)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("purge_completed", e))?;

        Ok(deleted.rows_affected())
    }
}

/// Map SQLx errors to RegistryError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RegistryError {
    match err {
        sqlx::Error::Database(db_err) => RegistryError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            RegistryError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => RegistryError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[derive(Debug)]
struct PublicationRow {
    id: uuid::Uuid,
    event_type: String,
    payload: serde_json::Value,
    listener_id: String,
    published_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for PublicationRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(PublicationRow {
            id: row.try_get("id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            listener_id: row.try_get("listener_id")?,
            published_at: row.try_get("published_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl From<PublicationRow> for EventPublication {
    fn from(row: PublicationRow) -> Self {
        EventPublication::from_parts(
            PublicationId::from_uuid(row.id),
            EventPayload::new(row.event_type, row.payload),
            ListenerId::from_raw(row.listener_id),
            row.published_at,
            row.completed_at,
        )
    }
}

fn rows_into_publications(
    rows: Vec<sqlx::postgres::PgRow>,
) -> Result<Vec<EventPublication>, RegistryError> {
    let mut publications = Vec::with_capacity(rows.len());
    for row in rows {
        let parsed = PublicationRow::from_row(&row).map_err(|e| {
            RegistryError::Storage(format!("failed to deserialize publication row: {}", e))
        })?;
        publications.push(parsed.into());
    }
    Ok(publications)
}

// Implement the synchronous registry contract.
//
// The trait is synchronous because dispatch runs in the committing thread;
// Postgres operations are async, so we bridge with the ambient tokio
// runtime's handle, exactly like the callers (HTTP handlers, workers) that
// already live inside a runtime.

fn runtime_handle(operation: &str) -> Result<tokio::runtime::Handle, RegistryError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        RegistryError::Storage(format!(
            "{} requires an async runtime (tokio); call from within a tokio runtime context",
            operation
        ))
    })
}

impl PublicationRegistry for PostgresPublicationRegistry {
    fn insert(&self, publication: EventPublication) -> Result<(), RegistryError> {
        let handle = runtime_handle("insert")?;
        handle.block_on(self.insert_publication(&publication))
    }

    fn mark_completed(
        &self,
        id: PublicationId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let handle = runtime_handle("mark_completed")?;
        handle.block_on(self.complete_publication(id, completed_at))
    }

    fn find_incomplete(&self) -> Result<Vec<EventPublication>, RegistryError> {
        let handle = runtime_handle("find_incomplete")?;
        handle.block_on(self.incomplete_publications(None))
    }

    fn find_incomplete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EventPublication>, RegistryError> {
        let handle = runtime_handle("find_incomplete_older_than")?;
        handle.block_on(self.incomplete_publications(Some(cutoff)))
    }

    fn delete_completed(&self, older_than: Option<DateTime<Utc>>) -> Result<u64, RegistryError> {
        let handle = runtime_handle("delete_completed")?;
        handle.block_on(self.purge_completed(older_than))
    }
}

#[async_trait::async_trait]
impl PublicationQuery for PostgresPublicationRegistry {
    async fn query_publications(
        &self,
        filter: PublicationFilter,
        pagination: Pagination,
    ) -> Result<PublicationQueryResult, RegistryError> {
        let listener_param: Option<&str> = filter.listener_id.as_ref().map(|l| l.as_str());
        let event_type_param: Option<&str> = filter.event_type.as_deref();
        // Status collapses to "is the row completed" for SQL purposes.
        let completed_param: Option<bool> = filter
            .status
            .map(|s| s == publedger_events::PublicationStatus::Completed);

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) as total
            FROM event_publications
            WHERE ($1::text IS NULL OR listener_id = $1)
                AND ($2::text IS NULL OR event_type = $2)
                AND ($3::bool IS NULL OR (completed_at IS NOT NULL) = $3)
                AND ($4::timestamptz IS NULL OR published_at >= $4)
                AND ($5::timestamptz IS NULL OR published_at <= $5)
            "#,
        )
        .bind(listener_param)
        .bind(event_type_param)
        .bind(completed_param)
        .bind(filter.published_after)
        .bind(filter.published_before)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_publications", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| RegistryError::Storage(format!("failed to read count: {}", e)))?;

        let rows = sqlx::query(
            r#"
            SELECT
                id,
                event_type,
                payload,
                listener_id,
                published_at,
                completed_at
            FROM event_publications
            WHERE ($1::text IS NULL OR listener_id = $1)
                AND ($2::text IS NULL OR event_type = $2)
                AND ($3::bool IS NULL OR (completed_at IS NOT NULL) = $3)
                AND ($4::timestamptz IS NULL OR published_at >= $4)
                AND ($5::timestamptz IS NULL OR published_at <= $5)
            ORDER BY published_at ASC, id ASC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(listener_param)
        .bind(event_type_param)
        .bind(completed_param)
        .bind(filter.published_after)
        .bind(filter.published_before)
        .bind(pagination.limit as i64)
        .bind(pagination.offset as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_publications", e))?;

        let publications = rows_into_publications(rows)?;
        let has_more = total > (pagination.offset + pagination.limit) as i64;

        Ok(PublicationQueryResult {
            publications,
            total: total as u64,
            pagination,
            has_more,
        })
    }

    async fn get_publication_by_id(
        &self,
        id: PublicationId,
    ) -> Result<Option<EventPublication>, RegistryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                event_type,
                payload,
                listener_id,
                published_at,
                completed_at
            FROM event_publications
            WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_publication_by_id", e))?;

        match row {
            Some(row) => {
                let parsed = PublicationRow::from_row(&row).map_err(|e| {
                    RegistryError::Storage(format!("failed to deserialize publication row: {}", e))
                })?;
                Ok(Some(parsed.into()))
            }
            None => Ok(None),
        }
    }
}
