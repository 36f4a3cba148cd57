//! Commands for the resource context.

use availability_core::command::Command;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Command to register a new resource.
#[derive(Debug, Clone)]
pub struct AddResource {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Span context received with the request.
    pub span_context: Option<String>,
    /// The identifier the resource is created under.
    pub resource_id: Uuid,
    /// Tags describing the resource.
    pub tags: Vec<String>,
}

impl Command for AddResource {
    fn command_type(&self) -> &'static str {
        "resources.add_resource"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn span_context(&self) -> Option<&str> {
        self.span_context.as_deref()
    }
}

/// Command to reserve the day containing `at`.
#[derive(Debug, Clone)]
pub struct AddReservation {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Span context received with the request.
    pub span_context: Option<String>,
    /// The resource to reserve.
    pub resource_id: Uuid,
    /// Any instant within the day to reserve.
    pub at: DateTime<Utc>,
    /// Reservation priority.
    pub priority: i32,
}

impl Command for AddReservation {
    fn command_type(&self) -> &'static str {
        "resources.add_reservation"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn span_context(&self) -> Option<&str> {
        self.span_context.as_deref()
    }
}

/// Command to free the day containing `at`.
#[derive(Debug, Clone)]
pub struct RemoveReservation {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Span context received with the request.
    pub span_context: Option<String>,
    /// The resource whose reservation is removed.
    pub resource_id: Uuid,
    /// Any instant within the day to free.
    pub at: DateTime<Utc>,
}

impl Command for RemoveReservation {
    fn command_type(&self) -> &'static str {
        "resources.remove_reservation"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn span_context(&self) -> Option<&str> {
        self.span_context.as_deref()
    }
}
