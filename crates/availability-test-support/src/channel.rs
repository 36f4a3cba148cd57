//! Test channels: `MessageChannel` implementations with scripted behavior.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use availability_core::channel::{MessageChannel, OutboundMessage};
use availability_core::error::DeliveryError;
use uuid::Uuid;

/// A channel that acknowledges every message and records what it was sent.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingChannel {
    /// Creates an empty recording channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every message sent, in send order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of sends of `message_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn send_count(&self, message_id: Uuid) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.message_id == message_id)
            .count()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// A channel whose broker is always down.
#[derive(Debug, Default)]
pub struct FailingChannel;

#[async_trait]
impl MessageChannel for FailingChannel {
    async fn send(&self, _message: &OutboundMessage) -> Result<(), DeliveryError> {
        Err(DeliveryError::Unavailable("broker unreachable".into()))
    }
}

/// A channel that rejects the listed messages and records the rest.
#[derive(Debug, Default)]
pub struct FlakyChannel {
    rejected: Mutex<HashSet<Uuid>>,
    delivered: RecordingChannel,
}

impl FlakyChannel {
    /// Creates a channel that rejects every message in `rejected`.
    #[must_use]
    pub fn rejecting(rejected: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            rejected: Mutex::new(rejected.into_iter().collect()),
            delivered: RecordingChannel::new(),
        }
    }

    /// Lets `message_id` through from now on.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn heal(&self, message_id: Uuid) {
        self.rejected.lock().unwrap().remove(&message_id);
    }

    /// Messages that were accepted.
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.sent()
    }
}

#[async_trait]
impl MessageChannel for FlakyChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        if self.rejected.lock().unwrap().contains(&message.message_id) {
            return Err(DeliveryError::Rejected(format!(
                "message {} rejected",
                message.message_id
            )));
        }
        self.delivered.send(message).await
    }
}

/// A channel that stalls on the listed messages for `stall` before
/// acknowledging, and acknowledges the rest immediately.
#[derive(Debug)]
pub struct StallingChannel {
    stalled: HashSet<Uuid>,
    stall: Duration,
    delivered: RecordingChannel,
}

impl StallingChannel {
    /// Creates a channel that holds every message in `stalled` for `stall`.
    #[must_use]
    pub fn new(stalled: impl IntoIterator<Item = Uuid>, stall: Duration) -> Self {
        Self {
            stalled: stalled.into_iter().collect(),
            stall,
            delivered: RecordingChannel::new(),
        }
    }

    /// Messages that completed their send.
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.sent()
    }
}

#[async_trait]
impl MessageChannel for StallingChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        if self.stalled.contains(&message.message_id) {
            tokio::time::sleep(self.stall).await;
        }
        self.delivered.send(message).await
    }
}
