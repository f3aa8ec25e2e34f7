// HTTP request handlers
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::domain::alert::{GeofenceRule, RuleSpec};
use crate::domain::error::ServiceError;
use crate::domain::geometry::{Area, Point};
use crate::presentation::app_state::AppState;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    pub area_id: String,
    pub area: Area,
    #[serde(default)]
    pub precision: Option<u8>,
}

pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SnapshotRequest>,
) -> Response {
    match state
        .density_service
        .snapshot_at_precision(&request.area_id, &request.area, request.precision)
        .await
    {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_flow(
    Path(area_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.density_service.flow(&area_id).await {
        Ok(flow) => Json(flow).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<Vec<GeofenceRule>> {
    Json(state.alert_engine.list_rules())
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<RuleSpec>,
) -> impl IntoResponse {
    let rule = state.alert_engine.add_rule(spec);
    (StatusCode::CREATED, Json(rule))
}

/// Deleting an unknown id is a success no-op.
pub async fn delete_rule(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> StatusCode {
    state.alert_engine.delete_rule(&id);
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
pub struct RouteRequest {
    pub from: Point,
    pub to: Point,
}

/// Route planning always answers with a usable plan; internal failures
/// degrade to the fallback route inside the scorer.
pub async fn plan_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouteRequest>,
) -> Response {
    let plan = state
        .routing_service
        .plan_route(request.from, request.to)
        .await;
    Json(plan).into_response()
}

fn error_response(error: ServiceError) -> Response {
    let status = match &error {
        ServiceError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::UpstreamAuth(_) => StatusCode::BAD_GATEWAY,
        ServiceError::PathfinderUnavailable(_) | ServiceError::WebhookDelivery(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(serde_json::json!({ "error": error.to_string() })),
    )
        .into_response()
}
