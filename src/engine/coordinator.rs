use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::FlightConfig;
use crate::engine::flight::{FlightControl, FlightEvent, FlightPhase};
use crate::engine::interpolation::{Interpolator, Leg, PhaseLabels};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::activity::ActivityFeed;
use crate::models::coordinate::Coordinate;
use crate::models::drone::{DroneState, DroneStatus};
use crate::models::request::{DeliveryRequest, NewRequest, Payload};
use crate::observability::metrics::Metrics;
use crate::store::PositionStore;

/// Result of a finished round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightReport {
    pub request_id: Uuid,
    pub delivered: bool,
}

/// An accepted dispatch. Dropping `flight` detaches the round trip; it still
/// runs to completion.
pub struct DispatchTicket {
    pub request: DeliveryRequest,
    pub flight: JoinHandle<FlightReport>,
}

/// Owns the drone state and the busy flag, and sequences each dispatch through
/// outbound flight, delivery, pause and return.
pub struct Dispatcher {
    config: FlightConfig,
    store: Arc<dyn PositionStore>,
    drone: watch::Sender<DroneState>,
    control: FlightControl,
    activity: Arc<ActivityFeed>,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(
        config: FlightConfig,
        store: Arc<dyn PositionStore>,
        activity: Arc<ActivityFeed>,
        metrics: Metrics,
    ) -> Self {
        let (drone, _unused_rx) = watch::channel(DroneState::idle_at(config.initial_position));

        Self {
            config,
            store,
            drone,
            control: FlightControl::new(),
            activity,
            metrics,
        }
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn drone(&self) -> DroneState {
        *self.drone.borrow()
    }

    pub fn subscribe_drone(&self) -> watch::Receiver<DroneState> {
        self.drone.subscribe()
    }

    pub fn phase(&self) -> FlightPhase {
        self.control.phase()
    }

    pub fn is_busy(&self) -> bool {
        self.control.is_busy()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<FlightPhase> {
        self.control.subscribe()
    }

    /// Take over a position observed in the store. Only idle snapshots are
    /// adopted, and only while no flight is running.
    pub fn adopt_position(&self, observed: DroneState) -> bool {
        if observed.status != DroneStatus::Idle {
            return false;
        }

        self.control.while_idle(|| {
            self.drone.send_if_modified(|state| {
                if state.position == observed.position {
                    return false;
                }
                state.position = observed.position;
                true
            });
        })
    }

    pub async fn dispatch(
        self: &Arc<Self>,
        target: Option<Coordinate>,
        payload: Payload,
    ) -> Result<DispatchTicket, AppError> {
        let target = target.ok_or_else(|| {
            self.record_outcome("rejected_no_target");
            AppError::NoTarget
        })?;

        if !target.is_valid() {
            self.record_outcome("rejected_invalid");
            return Err(AppError::BadRequest(format!(
                "drop location out of range: {}, {}",
                target.lat, target.lng
            )));
        }

        if self.control.apply(FlightEvent::Dispatch).is_err() {
            self.record_outcome("rejected_busy");
            self.activity.record("A drone is already busy.");
            warn!(drone_id = %self.config.drone_id, "dispatch rejected: drone busy");
            return Err(AppError::DroneBusy);
        }
        self.metrics.drone_busy.set(1);

        let new_request = NewRequest {
            payload,
            location: target,
            created_at: Utc::now(),
        };

        let request = match self.store.create_request(new_request).await {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "dispatch failed: could not create request");
                self.activity.record("Dispatch failed. Please try again.");
                self.finish(FlightEvent::Abort);
                self.record_outcome("failed");
                return Err(err.into());
            }
        };

        self.activity.record(format!(
            "Request created: {} [{}]",
            request.short_id(),
            payload.as_str()
        ));
        self.activity.record("Dispatching drone...");
        self.record_outcome("accepted");

        info!(
            request_id = %request.id,
            payload = payload.as_str(),
            lat = target.lat,
            lng = target.lng,
            "dispatch accepted"
        );

        let flight = tokio::spawn(Arc::clone(self).fly(request.clone()));

        Ok(DispatchTicket { request, flight })
    }

    async fn fly(self: Arc<Self>, request: DeliveryRequest) -> FlightReport {
        let started = Instant::now();
        let interpolator = Interpolator::new(
            self.store.as_ref(),
            &self.config.drone_id,
            &self.drone,
            &self.metrics,
        );

        let outbound = Leg {
            start: self.drone().position,
            end: request.location,
            timing: self.config.outbound,
        };
        info!(
            request_id = %request.id,
            distance_km = haversine_km(&outbound.start, &outbound.end),
            "outbound leg started"
        );
        interpolator.run(outbound, PhaseLabels::OUTBOUND).await;
        self.advance(FlightEvent::ArrivedAtTarget);

        let delivered = match self.store.mark_delivered(request.id, Utc::now()).await {
            Ok(_) => {
                info!(request_id = %request.id, "delivery confirmed");
                self.activity.record(format!(
                    "Delivery confirmed for request: {}",
                    request.short_id()
                ));
                true
            }
            Err(err) => {
                error!(request_id = %request.id, error = %err, "failed to mark request delivered");
                self.activity.record("Dispatch failed. Please try again.");
                false
            }
        };

        sleep(self.config.delivery_pause).await;

        let inbound = Leg {
            start: self.drone().position,
            end: self.config.base,
            timing: self.config.inbound,
        };
        info!(
            request_id = %request.id,
            distance_km = haversine_km(&inbound.start, &inbound.end),
            "return leg started"
        );
        interpolator.run(inbound, PhaseLabels::INBOUND).await;

        self.finish(FlightEvent::ArrivedAtBase);
        self.metrics
            .flight_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        self.activity.record("Drone returned to base (idle).");
        info!(request_id = %request.id, delivered, "drone returned to base");

        FlightReport {
            request_id: request.id,
            delivered,
        }
    }

    fn advance(&self, event: FlightEvent) {
        if let Err(err) = self.control.apply(event) {
            error!(error = %err, "flight state out of sync");
        }
    }

    fn finish(&self, event: FlightEvent) {
        self.advance(event);
        if !self.control.is_busy() {
            self.metrics.drone_busy.set(0);
        }
    }

    fn record_outcome(&self, outcome: &str) {
        self.metrics
            .dispatches_total
            .with_label_values(&[outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::Dispatcher;
    use crate::config::{FlightConfig, LegTiming};
    use crate::engine::flight::FlightPhase;
    use crate::error::AppError;
    use crate::models::activity::ActivityFeed;
    use crate::models::coordinate::Coordinate;
    use crate::models::drone::{DroneState, DroneStatus};
    use crate::models::request::{Payload, RequestStatus};
    use crate::observability::metrics::Metrics;
    use crate::store::{MemoryStore, PositionStore};

    const TARGET: Coordinate = Coordinate::new(17.30, 78.40);

    fn setup() -> (Arc<Dispatcher>, Arc<MemoryStore>, Arc<ActivityFeed>) {
        let store = Arc::new(MemoryStore::new());
        let activity = Arc::new(ActivityFeed::new(50, 64));
        let config = FlightConfig {
            initial_position: FlightConfig::default().base,
            ..FlightConfig::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            config,
            store.clone(),
            activity.clone(),
            Metrics::new(),
        ));
        (dispatcher, store, activity)
    }

    #[tokio::test(start_paused = true)]
    async fn full_round_trip_delivers_and_returns_to_base() {
        let (dispatcher, store, activity) = setup();
        let base = dispatcher.config().base;

        let ticket = dispatcher
            .dispatch(Some(TARGET), Payload::Medicine)
            .await
            .unwrap();
        assert!(dispatcher.is_busy());
        assert_eq!(ticket.request.status, RequestStatus::Dispatched);

        // 150 x 60ms outbound plus slack
        tokio::time::sleep(Duration::from_millis(9_100)).await;
        assert_eq!(dispatcher.drone().position, TARGET);
        assert_eq!(dispatcher.drone().status, DroneStatus::Delivered);
        assert_eq!(dispatcher.phase(), FlightPhase::Returning);
        let stored = store.get_request(ticket.request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Delivered);

        let report = ticket.flight.await.unwrap();
        assert!(report.delivered);
        assert_eq!(dispatcher.drone(), DroneState::idle_at(base));
        assert!(!dispatcher.is_busy());
        assert_eq!(
            store.get_drone("drone1").await.unwrap(),
            Some(DroneState::idle_at(base))
        );
        assert_eq!(activity.entries()[0].text, "Drone returned to base (idle).");
    }

    #[tokio::test(start_paused = true)]
    async fn store_sees_each_phase_label_in_order() {
        let (dispatcher, store, _activity) = setup();
        let mut sub = store.subscribe_drone("drone1").await.unwrap();

        let watcher = tokio::spawn(async move {
            let mut seen: Vec<DroneStatus> = Vec::new();
            while sub.changed().await.is_ok() {
                let Some(state) = *sub.borrow_and_update() else {
                    continue;
                };
                if seen.last() != Some(&state.status) {
                    seen.push(state.status);
                }
                if state.status == DroneStatus::Idle {
                    break;
                }
            }
            seen
        });

        let ticket = dispatcher
            .dispatch(Some(TARGET), Payload::Medicine)
            .await
            .unwrap();
        ticket.flight.await.unwrap();

        assert_eq!(
            watcher.await.unwrap(),
            vec![
                DroneStatus::Dispatched,
                DroneStatus::Enroute,
                DroneStatus::Delivered,
                DroneStatus::Returning,
                DroneStatus::Idle,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_target_is_rejected_without_side_effects() {
        let (dispatcher, store, activity) = setup();

        let err = dispatcher.dispatch(None, Payload::Food).await.err().unwrap();
        assert!(matches!(err, AppError::NoTarget));
        assert!(!dispatcher.is_busy());
        assert!(store.list_requests().await.unwrap().is_empty());
        assert!(activity.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_while_in_flight_is_rejected() {
        let (dispatcher, store, activity) = setup();

        let ticket = dispatcher
            .dispatch(Some(TARGET), Payload::Medicine)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        let writes_before = store.write_count();

        let err = dispatcher
            .dispatch(Some(Coordinate::new(17.5, 78.5)), Payload::Food)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::DroneBusy));
        assert!(dispatcher.is_busy());
        assert_eq!(store.list_requests().await.unwrap().len(), 1);
        assert_eq!(activity.entries()[0].text, "A drone is already busy.");
        assert_eq!(store.write_count(), writes_before);

        ticket.flight.await.unwrap();
        assert!(!dispatcher.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn request_creation_failure_releases_the_drone() {
        let (dispatcher, store, activity) = setup();
        store.set_fail_writes(true);

        let err = dispatcher
            .dispatch(Some(TARGET), Payload::Comm)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Store(_)));
        assert!(!dispatcher.is_busy());
        assert_eq!(activity.entries()[0].text, "Dispatch failed. Please try again.");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_step_legs_complete_without_ticking() {
        let store = Arc::new(MemoryStore::new());
        let activity = Arc::new(ActivityFeed::new(50, 64));
        let instant = LegTiming {
            steps: 0,
            delay: Duration::from_millis(10),
        };
        let config = FlightConfig {
            outbound: instant,
            inbound: instant,
            delivery_pause: Duration::from_millis(1),
            ..FlightConfig::default()
        };
        let base = config.base;
        let dispatcher = Arc::new(Dispatcher::new(config, store.clone(), activity, Metrics::new()));

        let ticket = dispatcher
            .dispatch(Some(TARGET), Payload::Food)
            .await
            .unwrap();
        let report = ticket.flight.await.unwrap();

        assert!(report.delivered);
        assert_eq!(dispatcher.drone(), DroneState::idle_at(base));
    }

    #[tokio::test]
    async fn idle_snapshots_are_adopted_only_between_flights() {
        let (dispatcher, _store, _activity) = setup();
        let elsewhere = Coordinate::new(17.1, 78.1);

        assert!(!dispatcher.adopt_position(DroneState {
            position: elsewhere,
            status: DroneStatus::Enroute,
        }));
        assert!(dispatcher.adopt_position(DroneState::idle_at(elsewhere)));
        assert_eq!(dispatcher.drone().position, elsewhere);
    }
}
