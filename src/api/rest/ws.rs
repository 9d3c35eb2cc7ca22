use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::flight::FlightPhase;
use crate::models::activity::LogEntry;
use crate::models::drone::DroneState;
use crate::models::request::RequestRecord;
use crate::state::AppState;
use crate::store::RequestMap;

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum LiveEvent {
    Drone(Option<DroneState>),
    /// The `requests` tree: records keyed by id.
    Requests(BTreeMap<Uuid, RequestRecord>),
    Phase(FlightPhase),
    Log(LogEntry),
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut drone_rx = state.drone_view.subscribe();
    let mut requests_rx = state.requests_view.subscribe();
    let mut phase_rx = state.dispatcher.subscribe_phase();
    let mut log_rx = state.activity.subscribe();

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        let initial = [
            LiveEvent::Drone(*drone_rx.borrow_and_update()),
            LiveEvent::Requests(request_records(&requests_rx.borrow_and_update())),
            LiveEvent::Phase(*phase_rx.borrow_and_update()),
        ];
        for event in initial {
            if !send_event(&mut sender, &event).await {
                return;
            }
        }

        loop {
            let event = tokio::select! {
                changed = drone_rx.changed() => match changed {
                    Ok(()) => LiveEvent::Drone(*drone_rx.borrow_and_update()),
                    Err(_) => break,
                },
                changed = requests_rx.changed() => match changed {
                    Ok(()) => {
                        LiveEvent::Requests(request_records(&requests_rx.borrow_and_update()))
                    }
                    Err(_) => break,
                },
                changed = phase_rx.changed() => match changed {
                    Ok(()) => LiveEvent::Phase(*phase_rx.borrow_and_update()),
                    Err(_) => break,
                },
                entry = log_rx.recv() => match entry {
                    Ok(entry) => LiveEvent::Log(entry),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket client lagging behind activity log");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if !send_event(&mut sender, &event).await {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}

fn request_records(requests: &RequestMap) -> BTreeMap<Uuid, RequestRecord> {
    requests
        .iter()
        .map(|(id, request)| (*id, RequestRecord::from(request)))
        .collect()
}

async fn send_event<S>(sender: &mut S, event: &LiveEvent) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize live event for ws");
            return true;
        }
    };

    sender.send(Message::Text(json)).await.is_ok()
}
