//! Domain events for the resource context.

use availability_core::day_code::DayCode;
use availability_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type name for `ResourceAdded`.
pub const RESOURCE_ADDED_EVENT_TYPE: &str = "resources.resource_added";
/// Event type name for `ReservationAdded`.
pub const RESERVATION_ADDED_EVENT_TYPE: &str = "resources.reservation_added";
/// Event type name for `ReservationRemoved`.
pub const RESERVATION_REMOVED_EVENT_TYPE: &str = "resources.reservation_removed";

/// Emitted when a resource is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAdded {
    /// The resource identifier.
    pub resource_id: Uuid,
    /// Tags the resource was created with.
    pub tags: Vec<String>,
}

/// Emitted when a reservation is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationAdded {
    /// The resource identifier.
    pub resource_id: Uuid,
    /// The reserved day.
    pub day: DayCode,
    /// Priority of the accepted reservation.
    pub priority: i32,
    /// Priority of the lower-priority reservation this one evicted, if any.
    pub evicted_priority: Option<i32>,
}

/// Emitted when a reservation is removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRemoved {
    /// The resource identifier.
    pub resource_id: Uuid,
    /// The freed day.
    pub day: DayCode,
    /// Priority of the removed reservation.
    pub priority: i32,
}

/// Event payload variants for the resource context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceEventKind {
    /// A resource has been created.
    ResourceAdded(ResourceAdded),
    /// A reservation has been accepted.
    ReservationAdded(ReservationAdded),
    /// A reservation has been removed.
    ReservationRemoved(ReservationRemoved),
}

impl ResourceEventKind {
    /// Returns the event type name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ResourceAdded(_) => RESOURCE_ADDED_EVENT_TYPE,
            Self::ReservationAdded(_) => RESERVATION_ADDED_EVENT_TYPE,
            Self::ReservationRemoved(_) => RESERVATION_REMOVED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the resource context.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: ResourceEventKind,
}

impl DomainEvent for ResourceEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        match &self.kind {
            ResourceEventKind::ResourceAdded(payload) => {
                serde_json::to_value(payload).expect("ResourceAdded serialization is infallible")
            }
            ResourceEventKind::ReservationAdded(payload) => serde_json::to_value(payload)
                .expect("ReservationAdded serialization is infallible"),
            ResourceEventKind::ReservationRemoved(payload) => serde_json::to_value(payload)
                .expect("ReservationRemoved serialization is infallible"),
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
