//! Intake endpoint for integration events published by other services.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use availability_resources::application::event_handlers::Acknowledgement;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::extract::RequestContext;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct IntegrationEventRequest {
    /// Event type name, e.g. `CustomerCreated`.
    pub event_type: String,
    /// Event body.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Response body for POST /.
#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    /// `handled` or `ignored`.
    pub acknowledgement: &'static str,
}

/// POST /
#[instrument(
    skip(state, context, request),
    fields(correlation_id = %context.correlation_id, event_type = %request.event_type)
)]
async fn receive_event(
    State(state): State<AppState>,
    context: RequestContext,
    Json(request): Json<IntegrationEventRequest>,
) -> Result<(StatusCode, Json<IntakeResponse>), ApiError> {
    let acknowledgement = state
        .intake
        .route(&request.event_type, request.payload, &context.message_context())
        .await?;

    info!(?acknowledgement, "integration event acknowledged");

    let acknowledgement = match acknowledgement {
        Acknowledgement::Handled => "handled",
        Acknowledgement::Ignored => "ignored",
    };
    Ok((StatusCode::ACCEPTED, Json(IntakeResponse { acknowledgement })))
}

/// Returns the router for integration event intake.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(receive_event))
}
