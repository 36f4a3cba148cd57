//! Abstract at-least-once message channel.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::MessageContext;
use crate::error::DeliveryError;
use crate::outbox::OutboxEntry;

/// Default metadata slot carrying the span context.
pub const DEFAULT_SPAN_CONTEXT_HEADER: &str = "span_context";

/// Metadata slot carrying the correlation ID.
pub const CORRELATION_ID_HEADER: &str = "correlation_id";

/// Message handed to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// Identity consumers deduplicate on.
    pub message_id: Uuid,
    /// Correlation ID of the causal chain.
    pub correlation_id: Option<Uuid>,
    /// Span context, empty when none could be resolved.
    pub span_context: String,
    /// Event type name.
    pub event_type: String,
    /// Serialized event.
    pub payload: serde_json::Value,
    /// Transport metadata.
    pub headers: BTreeMap<String, String>,
}

impl OutboundMessage {
    /// Builds the outbound message for `entry`, resolving correlation ID and
    /// span context from the entry first and `ambient` second.
    #[must_use]
    pub fn from_entry(entry: &OutboxEntry, ambient: &MessageContext, span_header: &str) -> Self {
        let resolved = MessageContext {
            correlation_id: entry.correlation_id,
            span_context: entry.span_context.clone(),
        }
        .or(ambient);
        let span_context = resolved.span_context.unwrap_or_default();

        let mut headers = BTreeMap::new();
        if let Some(correlation_id) = resolved.correlation_id {
            headers.insert(CORRELATION_ID_HEADER.to_owned(), correlation_id.to_string());
        }
        if !span_context.is_empty() {
            headers.insert(span_header.to_owned(), span_context.clone());
        }

        Self {
            message_id: entry.message_id,
            correlation_id: resolved.correlation_id,
            span_context,
            event_type: entry.event_type.clone(),
            payload: entry.payload.clone(),
            headers,
        }
    }
}

/// Transport the dispatcher delivers to.
///
/// `Ok(())` means the broker acknowledged the message. Delivery is
/// at-least-once: the same `message_id` may be sent more than once.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Sends one message and waits for the acknowledgment.
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}
