//! Shared position store: the `drones/<droneId>` and `requests/<id>` tree that
//! every viewer reads from and writes to.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::drone::DroneState;
use crate::models::request::{DeliveryRequest, NewRequest};

pub use memory::MemoryStore;

pub type RequestMap = BTreeMap<Uuid, DeliveryRequest>;

/// A live subscription. It yields the current snapshot first and then every
/// change; dropping it releases the subscription.
pub type Subscription<T> = watch::Receiver<T>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("request {0} not found")]
    RequestNotFound(Uuid),

    #[error("request {0} already delivered")]
    AlreadyDelivered(Uuid),
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Overwrite `drones/<drone_id>` wholesale.
    async fn set_drone(&self, drone_id: &str, state: DroneState) -> Result<(), StoreError>;

    async fn get_drone(&self, drone_id: &str) -> Result<Option<DroneState>, StoreError>;

    /// Append a new record under `requests/`; the store assigns the id.
    async fn create_request(&self, request: NewRequest) -> Result<DeliveryRequest, StoreError>;

    /// Flip a request from dispatched to delivered. A request is only ever
    /// delivered once.
    async fn mark_delivered(
        &self,
        id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> Result<DeliveryRequest, StoreError>;

    async fn get_request(&self, id: Uuid) -> Result<Option<DeliveryRequest>, StoreError>;

    async fn list_requests(&self) -> Result<RequestMap, StoreError>;

    async fn subscribe_drone(
        &self,
        drone_id: &str,
    ) -> Result<Subscription<Option<DroneState>>, StoreError>;

    async fn subscribe_requests(&self) -> Result<Subscription<RequestMap>, StoreError>;
}
