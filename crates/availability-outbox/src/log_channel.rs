//! Message channel that writes each message to the tracing log.

use async_trait::async_trait;
use availability_core::channel::{MessageChannel, OutboundMessage};
use availability_core::error::DeliveryError;
use tracing::info;

/// Acknowledges every message after logging it at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl MessageChannel for LogChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        info!(
            target: "availability::outbound",
            message_id = %message.message_id,
            event_type = %message.event_type,
            correlation_id = ?message.correlation_id,
            span_context = %message.span_context,
            headers = ?message.headers,
            payload = %message.payload,
            "message published"
        );
        Ok(())
    }
}
