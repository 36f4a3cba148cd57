//! Command abstractions.

use uuid::Uuid;

use crate::context::MessageContext;

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// Span context received with the request, if any.
    fn span_context(&self) -> Option<&str>;

    /// The propagation context events produced by this command inherit.
    fn message_context(&self) -> MessageContext {
        MessageContext {
            correlation_id: Some(self.correlation_id()),
            span_context: self.span_context().map(str::to_owned),
        }
    }
}
