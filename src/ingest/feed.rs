use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};
use crate::model::listing::{Address, Listing, ListingStatus, Media, PropertyType};

/// Raw feed item — the permissive upstream shape. Parsing here is the one
/// place loose typing is tolerated; everything downstream sees `Listing`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FeedItem {
    pub id: String,
    pub mls_number: String,
    pub status: String,
    pub listed_at: String,
    pub updated_at: String,
    pub address: FeedAddress,
    pub property_type: String,
    pub beds: u32,
    pub baths: u32,
    #[serde(default)]
    pub sqft: Option<u32>,
    pub list_price: f64,
    #[serde(default)]
    pub taxes_annual: Option<f64>,
    #[serde(default)]
    pub condo_fee_monthly: Option<f64>,
    #[serde(default)]
    pub photos: Option<Vec<String>>,
    #[serde(default)]
    pub brokerage: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FeedAddress {
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

fn default_country() -> String {
    "CA".to_string()
}

#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub next_page_token: Option<String>,
}

/// Upstream feed abstraction. Feed-specific parsing stays behind
/// implementations of this trait.
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn name(&self) -> &str;

    /// One page of items updated strictly after the watermark.
    async fn fetch_updated_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        page_token: Option<String>,
    ) -> Result<FeedPage>;
}

/// Map a raw item into the normalized listing shape.
pub fn normalize(item: &FeedItem, source: &str) -> Result<Listing> {
    let status = parse_status(&item.status)?;
    let property_type = parse_property_type(&item.property_type)?;
    let listed_at = parse_timestamp(&item.listed_at, "listedAt")?;
    let updated_at = parse_timestamp(&item.updated_at, "updatedAt")?;

    if item.list_price <= 0.0 {
        return Err(PipelineError::InvalidInput(format!(
            "listing {}: non-positive price {}",
            item.id, item.list_price
        )));
    }

    Ok(Listing {
        id: item.id.clone(),
        mls_number: item.mls_number.clone(),
        source: source.to_string(),
        status,
        listed_at,
        updated_at,
        address: Address {
            street: item.address.street.clone(),
            city: item.address.city.clone(),
            province: item.address.province.clone(),
            postal_code: item.address.postal_code.clone(),
            country: item.address.country.clone(),
            lat: item.address.lat,
            lng: item.address.lng,
        },
        property_type,
        beds: item.beds,
        baths: item.baths,
        sqft: item.sqft,
        list_price: item.list_price,
        taxes_annual: item.taxes_annual,
        condo_fee_monthly: item.condo_fee_monthly,
        media: item.photos.clone().map(|photos| Media { photos }),
        brokerage: item.brokerage.clone(),
    })
}

fn parse_status(raw: &str) -> Result<ListingStatus> {
    match raw.to_lowercase().as_str() {
        "active" | "a" => Ok(ListingStatus::Active),
        "sold" | "sld" => Ok(ListingStatus::Sold),
        "suspended" | "sus" => Ok(ListingStatus::Suspended),
        "expired" | "exp" => Ok(ListingStatus::Expired),
        "deleted" | "terminated" | "ter" => Ok(ListingStatus::Deleted),
        other => Err(PipelineError::InvalidInput(format!(
            "unknown listing status '{other}'"
        ))),
    }
}

fn parse_property_type(raw: &str) -> Result<PropertyType> {
    match raw.to_lowercase().as_str() {
        "condo" | "condo apt" | "apartment" => Ok(PropertyType::Condo),
        "house" | "detached" | "semi-detached" => Ok(PropertyType::House),
        "townhouse" | "att/row/twnhouse" | "row" => Ok(PropertyType::Townhouse),
        other => Err(PipelineError::InvalidInput(format!(
            "unknown property type '{other}'"
        ))),
    }
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| PipelineError::InvalidInput(format!("{field} '{raw}': {e}")))
}

// ── File-backed feed ────────────────────────────────────────────────

/// JSON-file feed: an array of items, paged in memory. Drives the demo
/// pipeline and the integration tests without an MLS upstream.
pub struct JsonFileFeed {
    name: String,
    path: PathBuf,
    page_size: usize,
}

impl JsonFileFeed {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
            page_size: 100,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl FeedSource for JsonFileFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_updated_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        page_token: Option<String>,
    ) -> Result<FeedPage> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PipelineError::Transient(format!("reading feed file: {e}")))?;
        let mut items: Vec<FeedItem> = serde_json::from_str(&raw)?;

        if let Some(mark) = watermark {
            items.retain(|item| {
                item.updated_at
                    .parse::<DateTime<Utc>>()
                    .map(|ts| ts > mark)
                    .unwrap_or(true)
            });
        }
        items.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));

        let offset: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| PipelineError::InvalidInput(format!("bad page token '{token}'")))?,
            None => 0,
        };

        let page: Vec<FeedItem> = items.iter().skip(offset).take(self.page_size).cloned().collect();
        let next = if offset + page.len() < items.len() {
            Some((offset + page.len()).to_string())
        } else {
            None
        };

        Ok(FeedPage {
            items: page,
            next_page_token: next,
        })
    }
}

// ── HTTP feed shell ─────────────────────────────────────────────────

/// Thin HTTP client for an MLS-style endpoint that already speaks the
/// `FeedPage` shape. Parser work for real board feeds lives upstream of
/// this interface.
pub struct HttpFeed {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct HttpFeedPage {
    items: Vec<FeedItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl HttpFeed {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Fatal(format!("building feed client: {e}")))?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_updated_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        page_token: Option<String>,
    ) -> Result<FeedPage> {
        let mut request = self
            .client
            .get(format!("{}/listings", self.base_url));
        if let Some(mark) = watermark {
            request = request.query(&[("updated_since", mark.to_rfc3339())]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Transient(format!("feed fetch: {e}")))?;
        if !response.status().is_success() {
            return Err(PipelineError::Transient(format!(
                "feed fetch: status {}",
                response.status()
            )));
        }
        let page: HttpFeedPage = response
            .json()
            .await
            .map_err(|e| PipelineError::Transient(format!("feed body: {e}")))?;

        Ok(FeedPage {
            items: page.items,
            next_page_token: page.next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> FeedItem {
        FeedItem {
            id: "L1".into(),
            mls_number: "C5550001".into(),
            status: "Active".into(),
            listed_at: "2026-01-10T12:00:00Z".into(),
            updated_at: "2026-01-10T12:00:00Z".into(),
            address: FeedAddress {
                street: "1 King St W".into(),
                city: "Toronto".into(),
                province: "ON".into(),
                postal_code: "M5H 1A1".into(),
                country: "CA".into(),
                lat: None,
                lng: None,
            },
            property_type: "Condo Apt".into(),
            beds: 2,
            baths: 2,
            sqft: Some(850),
            list_price: 750_000.0,
            taxes_annual: None,
            condo_fee_monthly: Some(650.0),
            photos: None,
            brokerage: None,
        }
    }

    #[test]
    fn normalize_maps_board_vocabulary() {
        let listing = normalize(&item(), "treb").unwrap();
        assert_eq!(listing.status, ListingStatus::Active);
        assert_eq!(listing.property_type, PropertyType::Condo);
        assert_eq!(listing.source, "treb");
    }

    #[test]
    fn normalize_rejects_unknown_status() {
        let mut bad = item();
        bad.status = "withdrawn?".into();
        assert!(matches!(
            normalize(&bad, "treb"),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn normalize_rejects_non_positive_price() {
        let mut bad = item();
        bad.list_price = 0.0;
        assert!(normalize(&bad, "treb").is_err());
    }
}
