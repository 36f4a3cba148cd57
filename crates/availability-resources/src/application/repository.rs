//! Resource repository over the keyed document store.
//!
//! The repository is the only place that loads or saves a resource's
//! persisted form. It never publishes anything: outbox entries handed to
//! `save` are written by the document store in the same unit of work.

use availability_core::aggregate::AggregateRoot;
use availability_core::error::DomainError;
use availability_core::outbox::OutboxEntry;
use availability_core::repository::DocumentRepository;
use tracing::debug;
use uuid::Uuid;

use crate::documents::ResourceDocument;
use crate::domain::aggregates::Resource;

/// Loads and saves `Resource` aggregates.
#[derive(Clone, Copy)]
pub struct ResourceRepository<'a> {
    documents: &'a dyn DocumentRepository,
}

impl<'a> ResourceRepository<'a> {
    /// Wraps a document repository.
    #[must_use]
    pub fn new(documents: &'a dyn DocumentRepository) -> Self {
        Self { documents }
    }

    /// Loads a resource. Each call returns an independent copy.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no document exists, or
    /// `DomainError::Infrastructure` if it cannot be decoded.
    pub async fn load(&self, id: Uuid) -> Result<Resource, DomainError> {
        let stored = self
            .documents
            .load(id)
            .await?
            .ok_or(DomainError::AggregateNotFound(id))?;
        ResourceDocument::from_stored(stored)?.into_entity()
    }

    /// Returns `true` if a resource with this id has been persisted.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store fails.
    pub async fn exists(&self, id: Uuid) -> Result<bool, DomainError> {
        Ok(self.documents.load(id).await?.is_some())
    }

    /// Loads every resource document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store fails or a
    /// document cannot be decoded.
    pub async fn browse(&self) -> Result<Vec<ResourceDocument>, DomainError> {
        self.documents
            .list()
            .await?
            .into_iter()
            .map(ResourceDocument::from_stored)
            .collect()
    }

    /// Persists `resource` and `outbox` atomically, guarded by the version
    /// the resource was loaded with. On success the resource is marked
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if another writer committed
    /// first (the store is left untouched), or `DomainError::Infrastructure`
    /// if the write fails.
    pub async fn save(
        &self,
        resource: &mut Resource,
        outbox: &[OutboxEntry],
    ) -> Result<(), DomainError> {
        let expected_version = resource.persisted_version();
        let stored = ResourceDocument::from_entity(resource).into_stored()?;

        self.documents.save(stored, expected_version, outbox).await?;

        debug!(
            resource_id = %resource.id,
            version = resource.version(),
            outbox_entries = outbox.len(),
            "resource saved"
        );
        resource.mark_committed();
        Ok(())
    }
}
