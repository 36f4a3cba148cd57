//! Keyed document repository abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;
use crate::outbox::OutboxEntry;

/// Persisted form of an aggregate: its key, version stamp and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document key.
    pub id: Uuid,
    /// Optimistic-concurrency token.
    pub version: i64,
    /// Serialized aggregate.
    pub body: serde_json::Value,
}

/// Repository trait for loading and saving versioned documents.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Loads a document by key.
    async fn load(&self, id: Uuid) -> Result<Option<StoredDocument>, DomainError>;

    /// Loads every document.
    async fn list(&self) -> Result<Vec<StoredDocument>, DomainError>;

    /// Writes `document` and appends `outbox` entries in one unit of work.
    ///
    /// The write is a compare-and-swap: it succeeds only if the stored
    /// version equals `expected_version`, or, when `expected_version` is
    /// `None`, no document with this key exists. Otherwise it fails with
    /// `DomainError::ConcurrencyConflict` and nothing is written. Any failure
    /// writing the outbox entries rolls back the document write.
    async fn save(
        &self,
        document: StoredDocument,
        expected_version: Option<i64>,
        outbox: &[OutboxEntry],
    ) -> Result<(), DomainError>;
}
