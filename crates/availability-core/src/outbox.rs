//! Transactional outbox entries and the store that holds them.
//!
//! An entry is written in the same unit of work as the state change that
//! produced its event. It moves `Pending -> Dispatched` exactly once, after
//! the message channel acknowledged it, and is never removed while pending.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::MessageContext;
use crate::error::DomainError;
use crate::event::DomainEvent;

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxState {
    /// Committed, not yet acknowledged by the channel.
    Pending,
    /// Acknowledged by the channel. Terminal.
    Dispatched,
}

impl OutboxState {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` for an unknown value.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "pending" => Ok(Self::Pending),
            "dispatched" => Ok(Self::Dispatched),
            other => Err(DomainError::Infrastructure(format!(
                "unknown outbox state '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OutboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A not-yet-confirmed outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Identity of the event instance; consumers deduplicate on it.
    pub message_id: Uuid,
    /// Aggregate whose mutation produced the event.
    pub aggregate_id: Uuid,
    /// Event type name.
    pub event_type: String,
    /// Serialized event.
    pub payload: serde_json::Value,
    /// Correlation ID of the triggering request.
    pub correlation_id: Option<Uuid>,
    /// Span context of the triggering request.
    pub span_context: Option<String>,
    /// Delivery state.
    pub state: OutboxState,
    /// Number of times a dispatcher claimed this entry.
    pub attempts: u32,
    /// Last delivery failure, if any.
    pub last_error: Option<String>,
    /// Worker holding the current claim.
    pub claimed_by: Option<String>,
    /// The entry cannot be claimed again before this instant (lease or
    /// retry backoff).
    pub claimed_until: Option<DateTime<Utc>>,
    /// When the entry was committed.
    pub created_at: DateTime<Utc>,
    /// When the channel acknowledged the entry.
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Creates a pending entry for `event`, carrying the propagation context
    /// of the command that produced it.
    #[must_use]
    pub fn from_event<E: DomainEvent>(event: &E, context: &MessageContext) -> Self {
        let meta = event.metadata();
        Self {
            message_id: meta.event_id,
            aggregate_id: meta.aggregate_id,
            event_type: event.event_type().to_owned(),
            payload: event.to_payload(),
            correlation_id: context.correlation_id.or(Some(meta.correlation_id)),
            span_context: context.span_context.clone(),
            state: OutboxState::Pending,
            attempts: 0,
            last_error: None,
            claimed_by: None,
            claimed_until: None,
            created_at: meta.occurred_at,
            dispatched_at: None,
        }
    }

    /// Returns `true` while the entry awaits acknowledgment.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state == OutboxState::Pending
    }

    /// Returns `true` if a dispatcher may claim the entry at `now`.
    #[must_use]
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.claimed_until.is_none_or(|until| until <= now)
    }
}

/// Durable log of outbound events.
///
/// Entries are appended by the document repository's `save`, inside the same
/// unit of work as the state change; this trait covers the dispatcher side.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Atomically claims up to `limit` claimable pending entries, oldest
    /// first. Claimed entries get `claimed_by = worker_id`,
    /// `claimed_until = lease_until` and one more attempt. Two concurrent
    /// callers never receive the same entry while its lease is live.
    async fn claim_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, DomainError>;

    /// Transitions a pending entry to `Dispatched`. Returns `false` when the
    /// entry was already dispatched.
    async fn mark_dispatched(
        &self,
        message_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Releases a claim after a failed delivery. The entry stays pending and
    /// becomes claimable again at `retry_at`.
    async fn release(
        &self,
        message_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Deletes dispatched entries acknowledged before `older_than`. Pending
    /// entries are never removed.
    async fn purge_dispatched(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError>;

    /// Fetches a single entry.
    async fn get(&self, message_id: Uuid) -> Result<Option<OutboxEntry>, DomainError>;
}
