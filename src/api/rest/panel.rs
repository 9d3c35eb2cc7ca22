use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engine::coordinator::DispatchTicket;
use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::models::request::{DeliveryRequest, Payload};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/panel", get(get_panel))
        .route("/selection", put(select_target).delete(clear_selection))
        .route("/payload", put(select_payload))
        .route("/dispatch", post(dispatch))
}

#[derive(Serialize)]
pub struct PanelResponse {
    pub selection: Option<Coordinate>,
    pub payload: Payload,
    pub base: Coordinate,
    pub busy: bool,
    pub can_dispatch: bool,
}

#[derive(Deserialize)]
pub struct PayloadRequest {
    pub payload: Payload,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct DispatchRequest {
    pub target: Option<Coordinate>,
    pub payload: Option<Payload>,
}

fn panel_response(state: &AppState) -> PanelResponse {
    let panel = state.panel();
    let busy = state.dispatcher.is_busy();

    PanelResponse {
        selection: panel.selection,
        payload: panel.payload,
        base: state.dispatcher.config().base,
        busy,
        can_dispatch: panel.selection.is_some() && !busy,
    }
}

async fn get_panel(State(state): State<Arc<AppState>>) -> Json<PanelResponse> {
    Json(panel_response(&state))
}

async fn select_target(
    State(state): State<Arc<AppState>>,
    Json(target): Json<Coordinate>,
) -> Result<Json<PanelResponse>, AppError> {
    if !target.is_valid() {
        return Err(AppError::BadRequest(format!(
            "drop location out of range: {}, {}",
            target.lat, target.lng
        )));
    }

    state.select_target(target);
    state.activity.record("Drop location set.");

    Ok(Json(panel_response(&state)))
}

async fn clear_selection(State(state): State<Arc<AppState>>) -> Json<PanelResponse> {
    state.clear_selection();
    Json(panel_response(&state))
}

async fn select_payload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PayloadRequest>,
) -> Json<PanelResponse> {
    state.select_payload(request.payload);
    Json(panel_response(&state))
}

/// Dispatch to the body's target/payload, falling back to the panel. The body
/// is optional; a bare POST uses the panel as is.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    body: Option<Json<DispatchRequest>>,
) -> Result<(StatusCode, Json<DeliveryRequest>), AppError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let panel = state.panel();
    let target = body.target.or(panel.selection);
    let payload = body.payload.unwrap_or(panel.payload);

    let DispatchTicket { request, flight } = state.dispatcher.dispatch(target, payload).await?;

    let location = request.location;
    let follow_up = state.clone();
    tokio::spawn(async move {
        match flight.await {
            Ok(report) if report.delivered => follow_up.clear_selection_if(location),
            Ok(_) => {}
            Err(err) => error!(error = %err, "flight task failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(request)))
}
