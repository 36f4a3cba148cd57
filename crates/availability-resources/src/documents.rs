//! Persisted document shape of a resource.
//!
//! `{ id, version, reservations: [{ dayCode, priority }], tags }`

use availability_core::aggregate::AggregateRoot;
use availability_core::day_code::DayCode;
use availability_core::error::DomainError;
use availability_core::repository::StoredDocument;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::Resource;
use crate::domain::reservation::Reservation;

/// Stored form of a reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDocument {
    /// Reserved day, encoded with the day codec.
    pub day_code: DayCode,
    /// Reservation priority.
    pub priority: i32,
}

/// Stored form of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDocument {
    /// Resource identifier.
    pub id: Uuid,
    /// Version stamp.
    pub version: i64,
    /// Reservations ordered by day.
    #[serde(default)]
    pub reservations: Vec<ReservationDocument>,
    /// Resource tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ResourceDocument {
    /// Captures the current state of `resource`.
    #[must_use]
    pub fn from_entity(resource: &Resource) -> Self {
        Self {
            id: resource.id,
            version: resource.version(),
            reservations: resource
                .reservations()
                .map(|r| ReservationDocument {
                    day_code: r.day,
                    priority: r.priority,
                })
                .collect(),
            tags: resource.tags().to_vec(),
        }
    }

    /// Rebuilds the aggregate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the document breaks an
    /// aggregate invariant.
    pub fn into_entity(self) -> Result<Resource, DomainError> {
        Resource::restore(
            self.id,
            self.tags,
            self.reservations
                .into_iter()
                .map(|r| Reservation::new(r.day_code, r.priority)),
            self.version,
        )
    }

    /// Decodes a stored document. The store's version column wins over the
    /// version embedded in the body.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the body is not a resource
    /// document or belongs to another key.
    pub fn from_stored(stored: StoredDocument) -> Result<Self, DomainError> {
        let mut document: Self = serde_json::from_value(stored.body).map_err(|e| {
            DomainError::Infrastructure(format!("malformed resource document {}: {e}", stored.id))
        })?;
        if document.id != stored.id {
            return Err(DomainError::Infrastructure(format!(
                "document stored under {} carries id {}",
                stored.id, document.id
            )));
        }
        document.version = stored.version;
        Ok(document)
    }

    /// Encodes for the document repository.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn into_stored(self) -> Result<StoredDocument, DomainError> {
        let id = self.id;
        let version = self.version;
        let body = serde_json::to_value(&self)
            .map_err(|e| DomainError::Infrastructure(format!("cannot encode resource {id}: {e}")))?;
        Ok(StoredDocument { id, version, body })
    }

    /// Returns `true` if the document carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
