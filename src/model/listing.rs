use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A unique identifier for a listing across the pipeline.
pub type ListingId = String;

/// Listing lifecycle status. Listings are never deleted in place — the status
/// transitions to `Deleted` or `Expired` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ListingStatus {
    Active,
    Sold,
    Suspended,
    Expired,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum PropertyType {
    Condo,
    House,
    Townhouse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl Address {
    /// Forward Sortation Area — the first three characters of the postal code,
    /// used as a coarse geographic bucket.
    pub fn fsa(&self) -> Option<String> {
        let cleaned: String = self
            .postal_code
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if cleaned.len() >= 3 {
            Some(cleaned[..3].to_uppercase())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Media {
    pub photos: Vec<String>,
}

/// Normalized listing row — the shape every feed item is mapped into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Listing {
    pub id: ListingId,
    pub mls_number: String,
    pub source: String,
    pub status: ListingStatus,
    pub listed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub address: Address,
    pub property_type: PropertyType,
    pub beds: u32,
    pub baths: u32,
    pub sqft: Option<u32>,
    pub list_price: f64,
    pub taxes_annual: Option<f64>,
    pub condo_fee_monthly: Option<f64>,
    pub media: Option<Media>,
    pub brokerage: Option<String>,
}

/// A semantic field whose change triggers downstream recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DirtyField {
    Price,
    Status,
    Fees,
    Tax,
    Media,
    Address,
}

impl DirtyField {
    /// Fields whose change invalidates underwriting math.
    pub fn is_financial(&self) -> bool {
        matches!(self, DirtyField::Price | DirtyField::Fees | DirtyField::Tax)
    }
}

/// What kind of change a `listing_changed` event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    StatusChange,
}

/// Compare two listing snapshots and report which semantic fields differ.
///
/// Volatile fields (`updated_at`, `listed_at`) are excluded: two snapshots
/// that differ only in timestamps produce an empty dirty set and no event.
pub fn diff_listings(old: &Listing, new: &Listing) -> Vec<DirtyField> {
    let mut dirty = Vec::new();
    if old.list_price != new.list_price {
        dirty.push(DirtyField::Price);
    }
    if old.status != new.status {
        dirty.push(DirtyField::Status);
    }
    if old.condo_fee_monthly != new.condo_fee_monthly {
        dirty.push(DirtyField::Fees);
    }
    if old.taxes_annual != new.taxes_annual {
        dirty.push(DirtyField::Tax);
    }
    if old.media != new.media {
        dirty.push(DirtyField::Media);
    }
    if old.address != new.address {
        dirty.push(DirtyField::Address);
    }
    dirty
}

/// Classify a diff: `status_change` only when status is the *sole* change.
pub fn change_kind(dirty: &[DirtyField]) -> ChangeKind {
    if dirty == [DirtyField::Status] {
        ChangeKind::StatusChange
    } else {
        ChangeKind::Update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_listing() -> Listing {
        Listing {
            id: "L1".into(),
            mls_number: "C5551234".into(),
            source: "treb".into(),
            status: ListingStatus::Active,
            listed_at: "2026-01-10T12:00:00Z".parse().unwrap(),
            updated_at: "2026-01-10T12:00:00Z".parse().unwrap(),
            address: Address {
                street: "1 King St W".into(),
                city: "Toronto".into(),
                province: "ON".into(),
                postal_code: "M5H 1A1".into(),
                country: "CA".into(),
                lat: Some(43.649),
                lng: Some(-79.378),
            },
            property_type: PropertyType::Condo,
            beds: 2,
            baths: 2,
            sqft: Some(850),
            list_price: 750_000.0,
            taxes_annual: Some(3200.0),
            condo_fee_monthly: Some(650.0),
            media: None,
            brokerage: None,
        }
    }

    #[test]
    fn diff_ignores_timestamps() {
        let old = base_listing();
        let mut new = old.clone();
        new.updated_at = "2026-01-11T12:00:00Z".parse().unwrap();
        assert!(diff_listings(&old, &new).is_empty());
    }

    #[test]
    fn status_only_change_is_status_change() {
        let old = base_listing();
        let mut new = old.clone();
        new.status = ListingStatus::Sold;
        let dirty = diff_listings(&old, &new);
        assert_eq!(dirty, vec![DirtyField::Status]);
        assert_eq!(change_kind(&dirty), ChangeKind::StatusChange);
    }

    #[test]
    fn price_and_status_change_is_update() {
        let old = base_listing();
        let mut new = old.clone();
        new.status = ListingStatus::Sold;
        new.list_price = 740_000.0;
        let dirty = diff_listings(&old, &new);
        assert!(dirty.contains(&DirtyField::Price));
        assert!(dirty.contains(&DirtyField::Status));
        assert_eq!(change_kind(&dirty), ChangeKind::Update);
    }

    #[test]
    fn fsa_strips_whitespace_and_uppercases() {
        let l = base_listing();
        assert_eq!(l.address.fsa().as_deref(), Some("M5H"));
    }
}
