//! Linear position interpolation between two coordinates, one store write per
//! tick.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::LegTiming;
use crate::models::coordinate::Coordinate;
use crate::models::drone::{DroneState, DroneStatus};
use crate::observability::metrics::Metrics;
use crate::store::PositionStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub start: Coordinate,
    pub end: Coordinate,
    pub timing: LegTiming,
}

/// Status labels a leg writes alongside its positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseLabels {
    /// Written once at the start position before the first tick.
    pub departure: Option<DroneStatus>,
    pub cruise: DroneStatus,
    /// Written with the exact end coordinate after the final tick.
    pub arrival: DroneStatus,
}

impl PhaseLabels {
    pub const OUTBOUND: Self = Self {
        departure: Some(DroneStatus::Dispatched),
        cruise: DroneStatus::Enroute,
        arrival: DroneStatus::Delivered,
    };

    pub const INBOUND: Self = Self {
        departure: None,
        cruise: DroneStatus::Returning,
        arrival: DroneStatus::Idle,
    };
}

/// Position after `step` of the leg's ticks. Steps at or past the end, and
/// zero-step legs, land exactly on `end`.
pub fn position_at(leg: &Leg, step: u32) -> Coordinate {
    let steps = leg.timing.steps;
    if steps == 0 || step >= steps {
        return leg.end;
    }

    let delta_lat = (leg.end.lat - leg.start.lat) / steps as f64;
    let delta_lng = (leg.end.lng - leg.start.lng) / steps as f64;

    Coordinate {
        lat: leg.start.lat + delta_lat * step as f64,
        lng: leg.start.lng + delta_lng * step as f64,
    }
}

/// Drives a single leg. Store writes are best-effort: failures are counted and
/// logged, never returned.
pub struct Interpolator<'a> {
    store: &'a dyn PositionStore,
    drone_id: &'a str,
    drone: &'a watch::Sender<DroneState>,
    metrics: &'a Metrics,
}

impl<'a> Interpolator<'a> {
    pub fn new(
        store: &'a dyn PositionStore,
        drone_id: &'a str,
        drone: &'a watch::Sender<DroneState>,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            store,
            drone_id,
            drone,
            metrics,
        }
    }

    /// Runs the leg to completion and returns the arrival state.
    pub async fn run(&self, leg: Leg, labels: PhaseLabels) -> DroneState {
        if let Some(status) = labels.departure {
            self.emit(DroneState {
                position: leg.start,
                status,
            })
            .await;
        }

        // tokio intervals panic on a zero period
        let delay = leg.timing.delay.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + delay, delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for step in 1..=leg.timing.steps {
            ticker.tick().await;

            let state = DroneState {
                position: position_at(&leg, step),
                status: labels.cruise,
            };
            debug!(
                drone_id = self.drone_id,
                step,
                steps = leg.timing.steps,
                lat = state.position.lat,
                lng = state.position.lng,
                "flight tick"
            );
            self.emit(state).await;
        }

        let arrival = DroneState {
            position: leg.end,
            status: labels.arrival,
        };
        self.emit(arrival).await;
        arrival
    }

    async fn emit(&self, state: DroneState) {
        self.drone.send_replace(state);
        self.metrics
            .flight_ticks_total
            .with_label_values(&[state.status.as_str()])
            .inc();

        if let Err(err) = self.store.set_drone(self.drone_id, state).await {
            self.metrics.store_write_failures_total.inc();
            warn!(
                drone_id = self.drone_id,
                status = state.status.as_str(),
                error = %err,
                "position write failed"
            );
        }
    }
}
