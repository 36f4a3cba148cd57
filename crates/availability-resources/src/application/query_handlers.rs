//! Query handlers for the resource context.

use availability_core::day_code::{DayCode, from_day_code};
use availability_core::error::DomainError;
use availability_core::repository::DocumentRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::application::repository::ResourceRepository;
use crate::documents::{ReservationDocument, ResourceDocument};

/// Read model for a reservation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationView {
    /// Midnight UTC of the reserved day.
    pub date: DateTime<Utc>,
    /// Encoded day.
    pub day_code: DayCode,
    /// Reservation priority.
    pub priority: i32,
}

/// Read model for a resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceView {
    /// Resource identifier.
    pub resource_id: Uuid,
    /// Resource tags.
    pub tags: Vec<String>,
    /// Version stamp.
    pub version: i64,
    /// Reservations ordered by day.
    pub reservations: Vec<ReservationView>,
}

impl TryFrom<ResourceDocument> for ResourceView {
    type Error = DomainError;

    fn try_from(document: ResourceDocument) -> Result<Self, Self::Error> {
        let resource_id = document.id;
        let mut reservations = document
            .reservations
            .into_iter()
            .map(|ReservationDocument { day_code, priority }| {
                // A stored code outside the date range is corrupt state, not bad input.
                let date = from_day_code(day_code).map_err(|e| {
                    DomainError::Infrastructure(format!("resource {resource_id}: {e}"))
                })?;
                Ok(ReservationView {
                    date,
                    day_code,
                    priority,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;
        reservations.sort_by_key(|r| r.day_code);

        Ok(Self {
            resource_id: document.id,
            tags: document.tags,
            version: document.version,
            reservations,
        })
    }
}

/// Retrieves a resource by its identifier.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no resource exists, or
/// `DomainError::Infrastructure` if the stored document cannot be read.
pub async fn get_resource_by_id(
    resource_id: Uuid,
    documents: &dyn DocumentRepository,
) -> Result<ResourceView, DomainError> {
    let stored = documents
        .load(resource_id)
        .await?
        .ok_or(DomainError::AggregateNotFound(resource_id))?;
    ResourceDocument::from_stored(stored)?.try_into()
}

/// Lists resources carrying the given tags.
///
/// With `match_all` a resource must carry every tag; otherwise any one tag
/// is enough. An empty tag list matches every resource. Results are ordered
/// by resource id.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store fails.
pub async fn find_resources(
    tags: &[String],
    match_all: bool,
    documents: &dyn DocumentRepository,
) -> Result<Vec<ResourceView>, DomainError> {
    let mut views = ResourceRepository::new(documents)
        .browse()
        .await?
        .into_iter()
        .filter(|document| {
            if tags.is_empty() {
                true
            } else if match_all {
                tags.iter().all(|tag| document.has_tag(tag))
            } else {
                tags.iter().any(|tag| document.has_tag(tag))
            }
        })
        .map(ResourceView::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    views.sort_by_key(|view| view.resource_id);
    Ok(views)
}
