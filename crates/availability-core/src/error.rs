//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

use crate::day_code::DayCode;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// An aggregate with the same identifier already exists.
    #[error("aggregate already exists: {0}")]
    AlreadyExists(Uuid),

    /// The day is held by a reservation of equal or higher priority.
    #[error(
        "reservation conflict on resource {resource_id} for day {day}: \
         existing priority {existing_priority}, requested priority {requested_priority}"
    )]
    ReservationConflict {
        /// The resource whose calendar rejected the reservation.
        resource_id: Uuid,
        /// The contested day.
        day: DayCode,
        /// Priority of the reservation already holding the day.
        existing_priority: i32,
        /// Priority of the rejected reservation.
        requested_priority: i32,
    },

    /// Optimistic concurrency conflict. `None` means "no document".
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected version {expected:?}, found {actual:?}"
    )]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The version the writer loaded.
        expected: Option<i64>,
        /// The version found in the store.
        actual: Option<i64>,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for failures a caller may resolve by reloading and
    /// retrying the command.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Failure to hand a message to the message channel.
///
/// Never surfaced to command callers: the state change already committed and
/// the outbox entry stays pending until a later sweep delivers it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The channel answered with a negative acknowledgment.
    #[error("message rejected by channel: {0}")]
    Rejected(String),

    /// The channel could not be reached.
    #[error("channel unavailable: {0}")]
    Unavailable(String),

    /// No acknowledgment arrived within the send timeout.
    #[error("channel send timed out after {0:?}")]
    Timeout(std::time::Duration),
}
