//! Route modules and the application router.

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod health;
pub mod integration_events;
pub mod resources;

/// Builds the full application router over `state`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/resources", resources::router())
        .nest("/api/v1/integration-events", integration_events::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
