use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::activity::LogEntry;
use crate::models::coordinate::Coordinate;
use crate::models::drone::DroneState;
use crate::models::request::DeliveryRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drone", get(get_drone))
        .route("/base", get(get_base))
        .route("/requests", get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/logs", get(list_logs))
}

async fn get_drone(State(state): State<Arc<AppState>>) -> Json<DroneState> {
    Json(state.dispatcher.drone())
}

async fn get_base(State(state): State<Arc<AppState>>) -> Json<Coordinate> {
    Json(state.dispatcher.config().base)
}

async fn list_requests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeliveryRequest>>, AppError> {
    let mut requests: Vec<DeliveryRequest> =
        state.store.list_requests().await?.into_values().collect();
    requests.sort_by_key(|request| request.created_at);

    Ok(Json(requests))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let request = state
        .store
        .get_request(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("request {} not found", id)))?;

    Ok(Json(request))
}

async fn list_logs(State(state): State<Arc<AppState>>) -> Json<Vec<LogEntry>> {
    Json(state.activity.entries())
}
