use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::coordinate::Coordinate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    #[default]
    Medicine,
    Food,
    #[serde(alias = "communication")]
    Comm,
}

impl Payload {
    pub fn as_str(&self) -> &'static str {
        match self {
            Payload::Medicine => "medicine",
            Payload::Food => "food",
            Payload::Comm => "comm",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Dispatched,
    Delivered,
}

/// A `requests/<id>` record. Timestamps travel as epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    pub id: Uuid,
    pub payload: Payload,
    #[serde(flatten)]
    pub location: Coordinate,
    pub status: RequestStatus,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// The value stored under `requests/<id>`; the id is the key, not a field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub payload: Payload,
    #[serde(flatten)]
    pub location: Coordinate,
    pub status: RequestStatus,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<&DeliveryRequest> for RequestRecord {
    fn from(request: &DeliveryRequest) -> Self {
        Self {
            payload: request.payload,
            location: request.location,
            status: request.status,
            created_at: request.created_at,
            delivered_at: request.delivered_at,
        }
    }
}

/// Fields a caller supplies; the store assigns the id.
#[derive(Debug, Clone, Copy)]
pub struct NewRequest {
    pub payload: Payload,
    pub location: Coordinate,
    pub created_at: DateTime<Utc>,
}

impl DeliveryRequest {
    /// Last six characters of the id, as shown in the activity log.
    pub fn short_id(&self) -> String {
        let id = self.id.simple().to_string();
        id[id.len() - 6..].to_string()
    }
}
