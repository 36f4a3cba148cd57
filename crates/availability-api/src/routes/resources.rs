//! Routes for the resource availability context.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use availability_core::outbox::OutboxEntry;
use availability_resources::application::query_handlers::{self, ResourceView};
use availability_resources::application::command_handlers;
use availability_resources::domain::commands;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::RequestContext;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct AddResourceRequest {
    /// Identifier to create the resource under; generated when absent.
    #[serde(default)]
    pub resource_id: Option<Uuid>,
    /// Tags describing the resource.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body for POST /{id}/reservations.
#[derive(Debug, Deserialize)]
pub struct AddReservationRequest {
    /// Any instant within the day to reserve.
    pub at: DateTime<Utc>,
    /// Reservation priority.
    pub priority: i32,
}

/// Query string for GET /.
#[derive(Debug, Default, Deserialize)]
pub struct FindResourcesQuery {
    /// Comma-separated tags.
    #[serde(default)]
    pub tags: Option<String>,
    /// Require every tag instead of any.
    #[serde(default)]
    pub match_all: bool,
}

impl FindResourcesQuery {
    fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// IDs of the outbox messages committed with the change.
    pub message_ids: Vec<Uuid>,
}

fn message_ids(entries: &[OutboxEntry]) -> Vec<Uuid> {
    entries.iter().map(|e| e.message_id).collect()
}

/// Response body for POST /.
#[derive(Debug, Serialize)]
pub struct ResourceCreatedResponse {
    /// Identifier of the new resource.
    pub resource_id: Uuid,
    /// IDs of the outbox messages committed with the resource.
    pub message_ids: Vec<Uuid>,
}

/// POST /
#[instrument(skip(state, context, request), fields(correlation_id = %context.correlation_id))]
async fn add_resource(
    State(state): State<AppState>,
    context: RequestContext,
    Json(request): Json<AddResourceRequest>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<ResourceCreatedResponse>), ApiError> {
    let command = commands::AddResource {
        correlation_id: context.correlation_id,
        span_context: context.span_context,
        resource_id: request.resource_id.unwrap_or_else(Uuid::new_v4),
        tags: request.tags,
    };

    info!(resource_id = %command.resource_id, "handling add_resource command");

    let entries =
        command_handlers::handle_add_resource(&command, state.clock.as_ref(), &*state.documents)
            .await?;
    state.notify_dispatcher();

    let location = format!("resources/{}", command.resource_id);
    let body = ResourceCreatedResponse {
        resource_id: command.resource_id,
        message_ids: message_ids(&entries),
    };
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(body)))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
) -> Result<Json<ResourceView>, ApiError> {
    let view = query_handlers::get_resource_by_id(resource_id, &*state.documents).await?;
    Ok(Json(view))
}

/// GET /?tags=a,b&match_all=true
#[instrument(skip(state))]
async fn find_resources(
    State(state): State<AppState>,
    Query(query): Query<FindResourcesQuery>,
) -> Result<Json<Vec<ResourceView>>, ApiError> {
    let views =
        query_handlers::find_resources(&query.tag_list(), query.match_all, &*state.documents)
            .await?;
    Ok(Json(views))
}

/// POST /{id}/reservations
#[instrument(
    skip(state, context, request),
    fields(correlation_id = %context.correlation_id, priority = request.priority)
)]
async fn add_reservation(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
    context: RequestContext,
    Json(request): Json<AddReservationRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::AddReservation {
        correlation_id: context.correlation_id,
        span_context: context.span_context,
        resource_id,
        at: request.at,
        priority: request.priority,
    };

    info!(%resource_id, at = %command.at, "handling add_reservation command");

    let entries = command_handlers::handle_add_reservation(
        &command,
        state.clock.as_ref(),
        &*state.documents,
        &state.retry,
    )
    .await?;
    state.notify_dispatcher();

    Ok(Json(CommandResponse {
        message_ids: message_ids(&entries),
    }))
}

/// DELETE /{id}/reservations/{date}
#[instrument(skip(state, context), fields(correlation_id = %context.correlation_id))]
async fn remove_reservation(
    State(state): State<AppState>,
    Path((resource_id, date)): Path<(Uuid, NaiveDate)>,
    context: RequestContext,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::RemoveReservation {
        correlation_id: context.correlation_id,
        span_context: context.span_context,
        resource_id,
        at: date.and_time(NaiveTime::MIN).and_utc(),
    };

    info!(%resource_id, %date, "handling remove_reservation command");

    let entries = command_handlers::handle_remove_reservation(
        &command,
        state.clock.as_ref(),
        &*state.documents,
        &state.retry,
    )
    .await?;
    if !entries.is_empty() {
        state.notify_dispatcher();
    }

    Ok(Json(CommandResponse {
        message_ids: message_ids(&entries),
    }))
}

/// Returns the router for the resource context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(add_resource).get(find_resources))
        .route("/{id}", get(get_resource))
        .route("/{id}/reservations", post(add_reservation))
        .route("/{id}/reservations/{date}", delete(remove_reservation))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use availability_core::clock::Clock;
    use availability_core::context::NoAmbientContext;
    use availability_core::repository::DocumentRepository;
    use availability_core::retry::RetryPolicy;
    use availability_store::InMemoryStore;
    use availability_test_support::{FailingDocumentRepository, FixedClock};
    use chrono::TimeZone;
    use serde_json::Value;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn app_state_with(documents: Arc<dyn DocumentRepository>) -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        AppState::new(
            clock,
            documents,
            RetryPolicy::immediate(3),
            Arc::new(Notify::new()),
            Arc::new(NoAmbientContext),
            "span_context".to_owned(),
        )
    }

    async fn body_json(response: Response) -> Value {
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body_bytes).unwrap()
    }

    #[test]
    fn test_tag_list_splits_and_trims() {
        let query = FindResourcesQuery {
            tags: Some(" vehicle, ,van ".to_owned()),
            match_all: false,
        };

        assert_eq!(query.tag_list(), vec!["vehicle".to_owned(), "van".to_owned()]);
        assert!(FindResourcesQuery::default().tag_list().is_empty());
    }

    #[tokio::test]
    async fn test_add_resource_returns_201_with_location() {
        // Arrange
        let store = InMemoryStore::new();
        let state = app_state_with(Arc::new(store.clone()));
        let app = router().with_state(state);
        let resource_id = Uuid::new_v4();
        let body = serde_json::json!({ "resource_id": resource_id, "tags": ["vehicle"] });

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .header("x-correlation-id", Uuid::from_u128(9).to_string())
            .header("span_context", "abc:def:0:1")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("resources/{resource_id}")
        );
        let json = body_json(response).await;
        assert_eq!(json["resource_id"], resource_id.to_string());
        let message_id: Uuid = json["message_ids"][0].as_str().unwrap().parse().unwrap();
        let entry = store.outbox_entry(message_id).unwrap();
        assert_eq!(entry.correlation_id, Some(Uuid::from_u128(9)));
        assert_eq!(entry.span_context.as_deref(), Some("abc:def:0:1"));
    }

    #[tokio::test]
    async fn test_add_resource_without_tags_returns_400() {
        let app = router().with_state(app_state_with(Arc::new(InMemoryStore::new())));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"tags": []}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_get_resource_returns_500_when_repository_fails() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(FailingDocumentRepository)));

        let request = Request::builder()
            .method("GET")
            .uri(format!("/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "infrastructure_error");
    }

    #[tokio::test]
    async fn test_add_reservation_returns_422_for_missing_priority() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(InMemoryStore::new())));

        let request = Request::builder()
            .method("POST")
            .uri(format!("/{}/reservations", Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"at": "2026-03-01T00:00:00Z"}"#))
            .unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert: Axum returns 422 for deserialization failures.
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_remove_reservation_rejects_malformed_date() {
        let app = router().with_state(app_state_with(Arc::new(InMemoryStore::new())));

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/{}/reservations/yesterday", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
