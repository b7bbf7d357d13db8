use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metrics::Metrics;
use super::search::Channel;

/// Per-channel delivery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed,
}

/// The listing facts the alert was evaluated against, frozen at match time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListingSnapshot {
    pub city: String,
    pub province: String,
    pub property_type: super::listing::PropertyType,
    pub beds: u32,
    pub baths: u32,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub snapshot: ListingSnapshot,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Which thresholds matched, for user-visible explanation.
    pub matched: Vec<String>,
}

/// A fired alert. At most one exists per (user, listing, result).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub user_id: String,
    pub saved_search_id: Uuid,
    pub listing_id: String,
    pub result_id: String,
    pub payload: AlertPayload,
    pub channels: Vec<Channel>,
    /// Delivery state per channel name. BTree-backed so serialized alerts
    /// compare stably in tests.
    pub delivery: BTreeMap<String, DeliveryState>,
    pub triggered_at: DateTime<Utc>,
}
