use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::models::drone::DroneState;
use crate::state::AppState;
use crate::store::Subscription;

/// Holds the `drones/<id>` and `requests` subscriptions until shutdown,
/// mirroring both into the presentation view.
pub async fn run_store_sync(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let drone_id = state.dispatcher.config().drone_id.clone();
    info!(drone_id = %drone_id, "store sync started");

    let mut drone_sub = match state.store.subscribe_drone(&drone_id).await {
        Ok(sub) => {
            apply_drone(&state, *sub.borrow());
            Some(sub)
        }
        Err(err) => {
            error!(error = %err, "drone subscription failed");
            None
        }
    };

    let mut requests_sub = match state.store.subscribe_requests().await {
        Ok(sub) => {
            state.requests_view.send_replace(sub.borrow().clone());
            Some(sub)
        }
        Err(err) => {
            error!(error = %err, "requests subscription failed");
            None
        }
    };

    // dismissed whether or not the subscriptions came up
    state.mark_loaded();
    state
        .activity
        .record("App loaded. Click map to set drop location.");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("store sync shutting down");
                break;
            }
            Some(drone) = next_snapshot(&mut drone_sub) => {
                apply_drone(&state, drone);
            }
            Some(requests) = next_snapshot(&mut requests_sub) => {
                debug!(requests = requests.len(), "requests snapshot");
                state.requests_view.send_replace(requests);
            }
        }
    }

    drop(drone_sub);
    drop(requests_sub);
    info!("store subscriptions released");
}

fn apply_drone(state: &AppState, drone: Option<DroneState>) {
    state.drone_view.send_replace(drone);

    if let Some(observed) = drone {
        if state.dispatcher.adopt_position(observed) {
            debug!(
                lat = observed.position.lat,
                lng = observed.position.lng,
                "adopted stored drone position"
            );
        }
    }
}

/// Waits for the next snapshot. A closed subscription is dropped and never
/// polled again.
async fn next_snapshot<T: Clone>(sub: &mut Option<Subscription<T>>) -> Option<T> {
    let Some(rx) = sub.as_mut() else {
        return std::future::pending().await;
    };

    if rx.changed().await.is_err() {
        warn!("store subscription closed");
        *sub = None;
        return None;
    }

    Some(rx.borrow_and_update().clone())
}
