use serde::{Deserialize, Serialize};

use crate::models::coordinate::Coordinate;

/// Phase label written next to the drone position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DroneStatus {
    Idle,
    Dispatched,
    Enroute,
    Delivered,
    Returning,
}

impl DroneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DroneStatus::Idle => "idle",
            DroneStatus::Dispatched => "dispatched",
            DroneStatus::Enroute => "enroute",
            DroneStatus::Delivered => "delivered",
            DroneStatus::Returning => "returning",
        }
    }
}

/// The `drones/<droneId>` record: `{ lat, lng, status }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DroneState {
    #[serde(flatten)]
    pub position: Coordinate,
    pub status: DroneStatus,
}

impl DroneState {
    pub fn idle_at(position: Coordinate) -> Self {
        Self {
            position,
            status: DroneStatus::Idle,
        }
    }
}
