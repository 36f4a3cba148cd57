//! Request-scoped propagation context.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use availability_core::context::MessageContext;
use uuid::Uuid;

use crate::state::AppState;

/// Header carrying the caller's correlation ID.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Correlation ID and span context of the current request.
///
/// A missing or malformed correlation ID is replaced by a fresh one. A
/// missing span context is taken from the ambient tracing span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Correlation ID for the command.
    pub correlation_id: Uuid,
    /// Span context for the command's outbox entries.
    pub span_context: Option<String>,
}

impl RequestContext {
    /// Message context seen by integration event handlers.
    #[must_use]
    pub fn message_context(&self) -> MessageContext {
        MessageContext {
            correlation_id: Some(self.correlation_id),
            span_context: self.span_context.clone(),
        }
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let correlation_id = header(CORRELATION_ID_HEADER)
            .and_then(|value| Uuid::parse_str(value).ok())
            .unwrap_or_else(Uuid::new_v4);
        let span_context = header(&state.span_context_header)
            .map(str::to_owned)
            .or_else(|| state.ambient.current().span_context);

        Ok(Self {
            correlation_id,
            span_context,
        })
    }
}
