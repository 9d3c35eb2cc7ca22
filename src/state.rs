use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::Config;
use crate::engine::coordinator::Dispatcher;
use crate::models::activity::ActivityFeed;
use crate::models::coordinate::Coordinate;
use crate::models::drone::DroneState;
use crate::models::request::Payload;
use crate::observability::metrics::Metrics;
use crate::store::{PositionStore, RequestMap};

/// Operator controls: the selected drop point and payload type.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Panel {
    pub selection: Option<Coordinate>,
    pub payload: Payload,
}

pub struct AppState {
    pub store: Arc<dyn PositionStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub activity: Arc<ActivityFeed>,
    pub panel: watch::Sender<Panel>,
    /// Store-side view kept current by the sync task.
    pub drone_view: watch::Sender<Option<DroneState>>,
    pub requests_view: watch::Sender<RequestMap>,
    pub loaded: watch::Sender<bool>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn PositionStore>) -> Self {
        let metrics = Metrics::new();
        let activity = Arc::new(ActivityFeed::new(
            config.log_capacity,
            config.event_buffer_size,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            config.flight.clone(),
            store.clone(),
            activity.clone(),
            metrics.clone(),
        ));

        let (panel, _unused_rx) = watch::channel(Panel::default());
        let (drone_view, _unused_rx) = watch::channel(None);
        let (requests_view, _unused_rx) = watch::channel(RequestMap::new());
        let (loaded, _unused_rx) = watch::channel(false);

        Self {
            store,
            dispatcher,
            activity,
            panel,
            drone_view,
            requests_view,
            loaded,
            metrics,
        }
    }

    pub fn panel(&self) -> Panel {
        *self.panel.borrow()
    }

    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    pub fn mark_loaded(&self) {
        self.loaded.send_if_modified(|loaded| !std::mem::replace(loaded, true));
    }

    pub fn select_target(&self, target: Coordinate) {
        self.panel.send_modify(|panel| panel.selection = Some(target));
    }

    pub fn clear_selection(&self) {
        self.panel.send_modify(|panel| panel.selection = None);
    }

    /// Clears the selection only if it still points at `target`.
    pub fn clear_selection_if(&self, target: Coordinate) {
        self.panel.send_if_modified(|panel| {
            if panel.selection == Some(target) {
                panel.selection = None;
                return true;
            }
            false
        });
    }

    pub fn select_payload(&self, payload: Payload) {
        self.panel.send_modify(|panel| panel.payload = payload);
    }
}
