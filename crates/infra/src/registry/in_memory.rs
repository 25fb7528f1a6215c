use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use publedger_core::PublicationId;
use publedger_events::EventPublication;

use super::r#trait::{PublicationRegistry, RegistryError};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<PublicationId, EventPublication>,
    // Insertion order, so find_incomplete returns publications oldest-first.
    order: Vec<PublicationId>,
}

/// In-memory publication registry.
///
/// Intended for tests/dev. A single lock guards both the records and the
/// insertion-order index, so queries always observe a consistent snapshot.
#[derive(Debug, Default)]
pub struct InMemoryPublicationRegistry {
    inner: RwLock<Inner>,
}

impl InMemoryPublicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of records currently held (any status).
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, RegistryError> {
        self.inner
            .read()
            .map_err(|_| RegistryError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, RegistryError> {
        self.inner
            .write()
            .map_err(|_| RegistryError::Storage("lock poisoned".to_string()))
    }
}

impl PublicationRegistry for InMemoryPublicationRegistry {
    fn insert(&self, publication: EventPublication) -> Result<(), RegistryError> {
        let mut inner = self.write()?;
        let id = publication.id();
        if inner.records.contains_key(&id) {
            return Err(RegistryError::DuplicatePublication(id));
        }
        inner.records.insert(id, publication);
        inner.order.push(id);
        Ok(())
    }

    fn mark_completed(
        &self,
        id: PublicationId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let mut inner = self.write()?;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?;
        // First write wins; repeated completion is a no-op.
        record.mark_completed(completed_at);
        Ok(())
    }

    fn find_incomplete(&self) -> Result<Vec<EventPublication>, RegistryError> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .filter(|p| p.is_pending())
            .cloned()
            .collect())
    }

    fn find_incomplete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EventPublication>, RegistryError> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .filter(|p| p.is_pending() && p.published_at() < cutoff)
            .cloned()
            .collect())
    }

    fn delete_completed(&self, older_than: Option<DateTime<Utc>>) -> Result<u64, RegistryError> {
        let mut inner = self.write()?;
        let Inner { records, order } = &mut *inner;

        let eligible: Vec<PublicationId> = records
            .values()
            .filter(|p| match (p.completed_at(), older_than) {
                (Some(at), Some(cutoff)) => at < cutoff,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .map(|p| p.id())
            .collect();

        for id in &eligible {
            records.remove(id);
        }
        order.retain(|id| records.contains_key(id));
        Ok(eligible.len() as u64)
    }
}
