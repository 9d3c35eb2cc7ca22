use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::drone::DroneState;
use crate::models::request::{DeliveryRequest, NewRequest, RequestStatus};
use crate::store::{PositionStore, RequestMap, StoreError, Subscription};

/// In-process realtime store backed by `watch` channels, so subscribers always
/// see the latest snapshot.
pub struct MemoryStore {
    drones: DashMap<String, watch::Sender<Option<DroneState>>>,
    requests: watch::Sender<RequestMap>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (requests, _unused_rx) = watch::channel(RequestMap::new());

        Self {
            drones: DashMap::new(),
            requests,
            fail_writes: AtomicBool::new(false),
            writes: AtomicU64::new(0),
        }
    }

    /// Make every subsequent write fail with `StoreError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn set_drone(&self, drone_id: &str, state: DroneState) -> Result<(), StoreError> {
        self.check_writable()?;

        self.drones
            .entry(drone_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(state));

        self.record_write();
        Ok(())
    }

    async fn get_drone(&self, drone_id: &str) -> Result<Option<DroneState>, StoreError> {
        let Some(entry) = self.drones.get(drone_id) else {
            return Ok(None);
        };
        let state = *entry.value().borrow();
        Ok(state)
    }

    async fn create_request(&self, request: NewRequest) -> Result<DeliveryRequest, StoreError> {
        self.check_writable()?;

        let record = DeliveryRequest {
            id: Uuid::new_v4(),
            payload: request.payload,
            location: request.location,
            status: RequestStatus::Dispatched,
            created_at: request.created_at,
            delivered_at: None,
        };

        self.requests.send_modify(|map| {
            map.insert(record.id, record.clone());
        });

        self.record_write();
        Ok(record)
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> Result<DeliveryRequest, StoreError> {
        self.check_writable()?;

        let mut outcome = Err(StoreError::RequestNotFound(id));
        self.requests.send_if_modified(|map| match map.get_mut(&id) {
            None => false,
            Some(request) if request.status == RequestStatus::Delivered => {
                outcome = Err(StoreError::AlreadyDelivered(id));
                false
            }
            Some(request) => {
                request.status = RequestStatus::Delivered;
                request.delivered_at = Some(delivered_at);
                outcome = Ok(request.clone());
                true
            }
        });

        if outcome.is_ok() {
            self.record_write();
        }
        outcome
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<DeliveryRequest>, StoreError> {
        Ok(self.requests.borrow().get(&id).cloned())
    }

    async fn list_requests(&self) -> Result<RequestMap, StoreError> {
        Ok(self.requests.borrow().clone())
    }

    async fn subscribe_drone(
        &self,
        drone_id: &str,
    ) -> Result<Subscription<Option<DroneState>>, StoreError> {
        Ok(self
            .drones
            .entry(drone_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe())
    }

    async fn subscribe_requests(&self) -> Result<Subscription<RequestMap>, StoreError> {
        Ok(self.requests.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::MemoryStore;
    use crate::models::coordinate::Coordinate;
    use crate::models::drone::{DroneState, DroneStatus};
    use crate::models::request::{NewRequest, Payload, RequestStatus};
    use crate::store::{PositionStore, StoreError};

    fn new_request() -> NewRequest {
        NewRequest {
            payload: Payload::Medicine,
            location: Coordinate::new(17.30, 78.40),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_store_yields_empty_snapshots() {
        let store = MemoryStore::new();

        let drone = store.subscribe_drone("drone1").await.unwrap();
        let requests = store.subscribe_requests().await.unwrap();

        assert!(drone.borrow().is_none());
        assert!(requests.borrow().is_empty());
    }

    #[tokio::test]
    async fn drone_subscribers_see_latest_write() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe_drone("drone1").await.unwrap();

        let state = DroneState {
            position: Coordinate::new(17.35, 78.45),
            status: DroneStatus::Enroute,
        };
        store.set_drone("drone1", state).await.unwrap();

        sub.changed().await.unwrap();
        assert_eq!(*sub.borrow_and_update(), Some(state));
        assert_eq!(store.get_drone("drone1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn request_is_delivered_exactly_once() {
        let store = MemoryStore::new();
        let created = store.create_request(new_request()).await.unwrap();
        assert_eq!(created.status, RequestStatus::Dispatched);

        let delivered = store.mark_delivered(created.id, Utc::now()).await.unwrap();
        assert_eq!(delivered.status, RequestStatus::Delivered);
        assert!(delivered.delivered_at.is_some());

        let again = store.mark_delivered(created.id, Utc::now()).await;
        assert!(matches!(again, Err(StoreError::AlreadyDelivered(id)) if id == created.id));

        let stored = store.get_request(created.id).await.unwrap().unwrap();
        assert_eq!(stored.delivered_at, delivered.delivered_at);
    }

    #[tokio::test]
    async fn failing_store_rejects_writes_without_mutation() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);

        assert!(matches!(
            store.create_request(new_request()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.list_requests().await.unwrap().is_empty());
        assert_eq!(store.write_count(), 0);
    }
}
