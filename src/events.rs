use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::listing::{ChangeKind, DirtyField};
use crate::model::metrics::UnderwriteSource;
use crate::model::search::Channel;

/// Schema version stamped on every envelope.
pub const SCHEMA_VERSION: u32 = 1;

/// Topic names, fixed across transports.
pub mod topics {
    pub const LISTING_CHANGED: &str = "listing_changed";
    pub const DATA_ENRICHED: &str = "data_enriched";
    pub const UNDERWRITE_REQUESTED: &str = "underwrite_requested";
    pub const UNDERWRITE_COMPLETED: &str = "underwrite_completed";
    pub const ALERT_FIRED: &str = "alert_fired";
}

/// Event payloads for the five pipeline topics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ListingChanged {
        id: String,
        updated_at: DateTime<Utc>,
        change: ChangeKind,
        source: String,
        dirty: Vec<DirtyField>,
    },
    DataEnriched {
        id: String,
        enrichment_types: Vec<String>,
        updated_at: DateTime<Utc>,
    },
    UnderwriteRequested {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        assumptions_id: Option<Uuid>,
    },
    UnderwriteCompleted {
        id: String,
        result_id: String,
        source: UnderwriteSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    },
    AlertFired {
        user_id: String,
        listing_id: String,
        result_id: String,
        channel: Channel,
    },
}

impl EventPayload {
    pub fn topic(&self) -> &'static str {
        match self {
            EventPayload::ListingChanged { .. } => topics::LISTING_CHANGED,
            EventPayload::DataEnriched { .. } => topics::DATA_ENRICHED,
            EventPayload::UnderwriteRequested { .. } => topics::UNDERWRITE_REQUESTED,
            EventPayload::UnderwriteCompleted { .. } => topics::UNDERWRITE_COMPLETED,
            EventPayload::AlertFired { .. } => topics::ALERT_FIRED,
        }
    }

    /// The entity id delivery is keyed on. Per-key ordering and debouncing
    /// both hang off this value.
    pub fn entity_key(&self) -> &str {
        match self {
            EventPayload::ListingChanged { id, .. }
            | EventPayload::DataEnriched { id, .. }
            | EventPayload::UnderwriteRequested { id, .. }
            | EventPayload::UnderwriteCompleted { id, .. } => id,
            EventPayload::AlertFired { listing_id, .. } => listing_id,
        }
    }
}

/// The wire envelope every event travels in.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Envelope {
    /// Unique event id.
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Schema version of the payload.
    pub version: u32,
    pub data: EventPayload,
}

impl Envelope {
    pub fn new(data: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version: SCHEMA_VERSION,
            data,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.data.topic()
    }

    pub fn entity_key(&self) -> &str {
        self.data.entity_key()
    }
}
