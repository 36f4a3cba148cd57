//! Shared application state.

use std::sync::Arc;

use availability_core::clock::Clock;
use availability_core::context::AmbientContext;
use availability_core::repository::DocumentRepository;
use availability_core::retry::RetryPolicy;
use availability_resources::application::event_handlers::IntakeRouter;
use tokio::sync::Notify;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock used for event timestamps.
    pub clock: Arc<dyn Clock>,
    /// Resource documents and their outbox.
    pub documents: Arc<dyn DocumentRepository>,
    /// Reload-and-retry budget for conflicting commands.
    pub retry: RetryPolicy,
    /// Wakes the outbox dispatcher after a command commits.
    pub dispatch_trigger: Arc<Notify>,
    /// Fallback source of the span context.
    pub ambient: Arc<dyn AmbientContext>,
    /// Request header carrying the span context.
    pub span_context_header: String,
    /// Integration event routing table.
    pub intake: Arc<IntakeRouter>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        documents: Arc<dyn DocumentRepository>,
        retry: RetryPolicy,
        dispatch_trigger: Arc<Notify>,
        ambient: Arc<dyn AmbientContext>,
        span_context_header: String,
    ) -> Self {
        Self {
            clock,
            documents,
            retry,
            dispatch_trigger,
            ambient,
            span_context_header,
            intake: Arc::new(IntakeRouter::standard()),
        }
    }

    /// Wakes the dispatcher so newly committed entries go out without
    /// waiting for the next poll.
    pub fn notify_dispatcher(&self) {
        self.dispatch_trigger.notify_one();
    }
}
