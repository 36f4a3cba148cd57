//! Intake of integration events published by other services.
//!
//! Inbound events are decoded into a closed enum and routed through an
//! explicit table built at startup. Unknown event types are acknowledged and
//! ignored so a producer adding a new event never blocks this service.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use availability_core::context::MessageContext;
use availability_core::error::DomainError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

/// Integration event kinds this service subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrationEventKind {
    /// A customer account was created.
    CustomerCreated,
    /// A user signed up.
    SignedUp,
}

impl IntegrationEventKind {
    /// Wire name of the event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CustomerCreated => "CustomerCreated",
            Self::SignedUp => "SignedUp",
        }
    }

    /// Maps a wire name to a known kind.
    #[must_use]
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type {
            "CustomerCreated" => Some(Self::CustomerCreated),
            "SignedUp" => Some(Self::SignedUp),
            _ => None,
        }
    }
}

impl fmt::Display for IntegrationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `CustomerCreated`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerCreated {
    /// The new customer.
    pub customer_id: Uuid,
}

/// Payload of `SignedUp`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUp {
    /// The new user.
    pub user_id: Uuid,
    /// The user's email address; empty when the publisher omits it.
    #[serde(default)]
    pub email: String,
    /// The role granted at sign-up; empty when the publisher omits it.
    #[serde(default)]
    pub role: String,
}

/// A decoded integration event.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationEvent {
    /// See [`CustomerCreated`].
    CustomerCreated(CustomerCreated),
    /// See [`SignedUp`].
    SignedUp(SignedUp),
}

impl IntegrationEvent {
    /// Decodes `payload` as an event of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the payload does not match the
    /// kind's shape.
    pub fn decode(kind: IntegrationEventKind, payload: serde_json::Value) -> Result<Self, DomainError> {
        match kind {
            IntegrationEventKind::CustomerCreated => decode_payload(kind, payload).map(Self::CustomerCreated),
            IntegrationEventKind::SignedUp => decode_payload(kind, payload).map(Self::SignedUp),
        }
    }

    /// Kind of this event.
    #[must_use]
    pub fn kind(&self) -> IntegrationEventKind {
        match self {
            Self::CustomerCreated(_) => IntegrationEventKind::CustomerCreated,
            Self::SignedUp(_) => IntegrationEventKind::SignedUp,
        }
    }
}

fn decode_payload<T: DeserializeOwned>(
    kind: IntegrationEventKind,
    payload: serde_json::Value,
) -> Result<T, DomainError> {
    serde_json::from_value(payload)
        .map_err(|e| DomainError::Validation(format!("malformed {kind} payload: {e}")))
}

/// Outcome of routing an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// A registered handler processed the event.
    Handled,
    /// No handler is registered for the event type.
    Ignored,
}

/// Handles one kind of integration event.
#[async_trait]
pub trait IntegrationEventHandler: Send + Sync {
    /// Processes a decoded event.
    async fn handle(
        &self,
        event: &IntegrationEvent,
        context: &MessageContext,
    ) -> Result<(), DomainError>;
}

/// Customers do not affect resource availability; the event is acknowledged
/// without side effects.
#[derive(Debug, Default)]
pub struct CustomerCreatedHandler;

#[async_trait]
impl IntegrationEventHandler for CustomerCreatedHandler {
    async fn handle(
        &self,
        event: &IntegrationEvent,
        context: &MessageContext,
    ) -> Result<(), DomainError> {
        if let IntegrationEvent::CustomerCreated(payload) = event {
            debug!(
                customer_id = %payload.customer_id,
                correlation_id = ?context.correlation_id,
                "customer created, nothing to do"
            );
        }
        Ok(())
    }
}

/// Sign-ups do not affect resource availability.
#[derive(Debug, Default)]
pub struct SignedUpHandler;

#[async_trait]
impl IntegrationEventHandler for SignedUpHandler {
    async fn handle(
        &self,
        event: &IntegrationEvent,
        context: &MessageContext,
    ) -> Result<(), DomainError> {
        if let IntegrationEvent::SignedUp(payload) = event {
            debug!(
                user_id = %payload.user_id,
                role = %payload.role,
                correlation_id = ?context.correlation_id,
                "user signed up, nothing to do"
            );
        }
        Ok(())
    }
}

/// Routing table from event kind to handler.
#[derive(Default, Clone)]
pub struct IntakeRouter {
    handlers: HashMap<IntegrationEventKind, Arc<dyn IntegrationEventHandler>>,
}

impl IntakeRouter {
    /// An empty router; every event is ignored until handlers are registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the handlers this service subscribes with.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .register(IntegrationEventKind::CustomerCreated, Arc::new(CustomerCreatedHandler))
            .register(IntegrationEventKind::SignedUp, Arc::new(SignedUpHandler))
    }

    /// Registers `handler` for `kind`, replacing any previous handler.
    #[must_use]
    pub fn register(
        mut self,
        kind: IntegrationEventKind,
        handler: Arc<dyn IntegrationEventHandler>,
    ) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Decodes and routes an inbound event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a known event carries a malformed
    /// payload, or whatever the handler returns.
    pub async fn route(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        context: &MessageContext,
    ) -> Result<Acknowledgement, DomainError> {
        let Some((kind, handler)) = IntegrationEventKind::parse(event_type)
            .and_then(|kind| self.handlers.get(&kind).map(|handler| (kind, handler)))
        else {
            warn!(event_type, "no handler registered for integration event, ignoring");
            return Ok(Acknowledgement::Ignored);
        };

        let event = IntegrationEvent::decode(kind, payload)?;
        handler.handle(&event, context).await?;
        Ok(Acknowledgement::Handled)
    }
}

impl fmt::Debug for IntakeRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeRouter")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
