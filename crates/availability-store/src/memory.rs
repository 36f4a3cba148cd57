//! In-memory store used by tests and local runs without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use availability_core::error::DomainError;
use availability_core::outbox::{OutboxEntry, OutboxState, OutboxStore};
use availability_core::repository::{DocumentRepository, StoredDocument};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    documents: HashMap<Uuid, StoredDocument>,
    outbox: Vec<OutboxEntry>,
}

/// Documents and outbox behind one lock, so a save and its outbox entries
/// are applied together. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::Infrastructure("in-memory store lock poisoned".into()))
    }

    /// Number of stored documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.lock().map_or(0, |state| state.documents.len())
    }

    /// Number of outbox entries, pending or dispatched.
    #[must_use]
    pub fn outbox_len(&self) -> usize {
        self.lock().map_or(0, |state| state.outbox.len())
    }

    /// Number of pending outbox entries.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock()
            .map_or(0, |state| state.outbox.iter().filter(|e| e.is_pending()).count())
    }

    /// Snapshot of one outbox entry.
    #[must_use]
    pub fn outbox_entry(&self, message_id: Uuid) -> Option<OutboxEntry> {
        self.lock().ok().and_then(|state| {
            state
                .outbox
                .iter()
                .find(|e| e.message_id == message_id)
                .cloned()
        })
    }

    /// Snapshot of the whole outbox in commit order.
    #[must_use]
    pub fn outbox(&self) -> Vec<OutboxEntry> {
        self.lock().map(|state| state.outbox.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryStore {
    async fn load(&self, id: Uuid) -> Result<Option<StoredDocument>, DomainError> {
        Ok(self.lock()?.documents.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<StoredDocument>, DomainError> {
        Ok(self.lock()?.documents.values().cloned().collect())
    }

    async fn save(
        &self,
        document: StoredDocument,
        expected_version: Option<i64>,
        outbox: &[OutboxEntry],
    ) -> Result<(), DomainError> {
        let mut state = self.lock()?;

        let actual = state.documents.get(&document.id).map(|d| d.version);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: document.id,
                expected: expected_version,
                actual,
            });
        }
        if let Some(duplicate) = outbox
            .iter()
            .find(|new| state.outbox.iter().any(|e| e.message_id == new.message_id))
        {
            return Err(DomainError::Infrastructure(format!(
                "outbox entry {} already exists",
                duplicate.message_id
            )));
        }

        state.documents.insert(document.id, document);
        state.outbox.extend_from_slice(outbox);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn claim_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, DomainError> {
        let mut state = self.lock()?;

        let mut claimable: Vec<&mut OutboxEntry> = state
            .outbox
            .iter_mut()
            .filter(|e| e.is_claimable(now))
            .collect();
        claimable.sort_by_key(|e| e.created_at);

        Ok(claimable
            .into_iter()
            .take(limit)
            .map(|entry| {
                entry.claimed_by = Some(worker_id.to_owned());
                entry.claimed_until = Some(lease_until);
                entry.attempts += 1;
                entry.clone()
            })
            .collect())
    }

    async fn mark_dispatched(
        &self,
        message_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut state = self.lock()?;
        let entry = state
            .outbox
            .iter_mut()
            .find(|e| e.message_id == message_id)
            .ok_or_else(|| {
                DomainError::Infrastructure(format!("outbox entry {message_id} not found"))
            })?;

        if !entry.is_pending() {
            return Ok(false);
        }
        entry.state = OutboxState::Dispatched;
        entry.dispatched_at = Some(now);
        entry.claimed_by = None;
        entry.claimed_until = None;
        Ok(true)
    }

    async fn release(
        &self,
        message_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        if let Some(entry) = state
            .outbox
            .iter_mut()
            .find(|e| e.message_id == message_id && e.is_pending())
        {
            entry.last_error = Some(error.to_owned());
            entry.claimed_by = None;
            entry.claimed_until = Some(retry_at);
        }
        Ok(())
    }

    async fn purge_dispatched(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut state = self.lock()?;
        let before = state.outbox.len();
        state.outbox.retain(|e| {
            e.is_pending() || e.dispatched_at.is_none_or(|at| at >= older_than)
        });
        Ok(u64::try_from(before - state.outbox.len()).unwrap_or(u64::MAX))
    }

    async fn get(&self, message_id: Uuid) -> Result<Option<OutboxEntry>, DomainError> {
        Ok(self
            .lock()?
            .outbox
            .iter()
            .find(|e| e.message_id == message_id)
            .cloned())
    }
}
