//! Correlation and trace propagation context.

use uuid::Uuid;

/// Correlation ID and span context carried from a triggering request or
/// message to the messages it causes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContext {
    /// Identifier linking the causal chain across services.
    pub correlation_id: Option<Uuid>,
    /// Serialized tracing span context, opaque to this service.
    pub span_context: Option<String>,
}

impl MessageContext {
    /// Creates a context with only a correlation ID.
    #[must_use]
    pub fn correlated(correlation_id: Uuid) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            span_context: None,
        }
    }

    /// Fills every missing (or blank) field from `fallback`.
    #[must_use]
    pub fn or(self, fallback: &MessageContext) -> Self {
        let span_context = self
            .span_context
            .filter(|span| !span.trim().is_empty())
            .or_else(|| fallback.span_context.clone());
        Self {
            correlation_id: self.correlation_id.or(fallback.correlation_id),
            span_context,
        }
    }
}

/// Supplies the ambient context of the current task (for example the active
/// tracing span) when a message carries none of its own.
pub trait AmbientContext: Send + Sync {
    /// Returns the context active at the call site.
    fn current(&self) -> MessageContext;
}

/// Ambient provider that never contributes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAmbientContext;

impl AmbientContext for NoAmbientContext {
    fn current(&self) -> MessageContext {
        MessageContext::default()
    }
}
