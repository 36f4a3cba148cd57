//! Test repositories: mock `DocumentRepository` implementations for tests.

use async_trait::async_trait;
use availability_core::error::DomainError;
use availability_core::outbox::OutboxEntry;
use availability_core::repository::{DocumentRepository, StoredDocument};
use uuid::Uuid;

/// A document repository that always returns an infrastructure error. Useful
/// for testing error-handling paths.
#[derive(Debug)]
pub struct FailingDocumentRepository;

#[async_trait]
impl DocumentRepository for FailingDocumentRepository {
    async fn load(&self, _id: Uuid) -> Result<Option<StoredDocument>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn list(&self) -> Result<Vec<StoredDocument>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn save(
        &self,
        _document: StoredDocument,
        _expected_version: Option<i64>,
        _outbox: &[OutboxEntry],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
