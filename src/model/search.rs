use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::listing::PropertyType;

/// Notification channels a saved search may fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Devbrowser,
    Email,
    Sms,
    Slack,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Devbrowser => "devbrowser",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Slack => "slack",
        }
    }
}

/// Listing-attribute filter. Every present field must match; string matches
/// are case-insensitive, numeric min/max bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilter {
    pub city: Option<String>,
    pub province: Option<String>,
    pub property_type: Option<PropertyType>,
    pub min_beds: Option<u32>,
    pub max_beds: Option<u32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Underwriting-metric thresholds. Every present threshold must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchThresholds {
    #[serde(rename = "minDSCR")]
    pub min_dscr: Option<f64>,
    #[serde(rename = "minCoC")]
    pub min_coc: Option<f64>,
    pub min_cap_rate: Option<f64>,
    pub min_score: Option<f64>,
    #[serde(rename = "requireNonNegativeCF")]
    pub require_non_negative_cf: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NotifyConfig {
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub filter: SearchFilter,
    pub thresholds: SearchThresholds,
    pub notify: NotifyConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
