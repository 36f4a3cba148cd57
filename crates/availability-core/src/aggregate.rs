//! Aggregate root abstraction.

use uuid::Uuid;

use crate::event::DomainEvent;

/// Trait for state-stored aggregate roots guarded by a version stamp.
///
/// Mutations change state in memory, bump the version and record the
/// resulting events; the repository persists state and events together.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (number of successful mutations).
    fn version(&self) -> i64;

    /// Returns the version the aggregate was loaded with, or `None` if it has
    /// never been persisted.
    fn persisted_version(&self) -> Option<i64>;

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Marks the current state as persisted and clears uncommitted events.
    fn mark_committed(&mut self);
}
