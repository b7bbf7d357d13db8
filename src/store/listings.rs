use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};
use crate::model::listing::{DirtyField, Listing, diff_listings};

use super::Db;

/// A listing row together with its store-assigned monotonic version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredListing {
    pub listing: Listing,
    pub version: i64,
}

/// Outcome of a diff-and-bump upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// First sighting — stored at version 1.
    Created { version: i64 },
    /// Semantic fields differed — version bumped.
    Updated { version: i64, dirty: Vec<DirtyField> },
    /// Byte-equal modulo volatile fields, or stale by `updated_at`. No write.
    Unchanged,
}

/// Diff-and-bump: write only when a semantic field changed, advancing the
/// version on every write. Stale snapshots (older `updated_at` than the
/// stored row) are absorbed without a write, so re-fetched pages across
/// ingest retries collapse to no-ops.
pub async fn upsert(db: &Db, incoming: &Listing) -> Result<UpsertOutcome> {
    let conn = db.lock().await;

    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT version, body FROM listings WHERE id = ?1",
            params![incoming.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match existing {
        None => {
            write_row(&conn, incoming, 1)?;
            Ok(UpsertOutcome::Created { version: 1 })
        }
        Some((version, body)) => {
            let stored: Listing = serde_json::from_str(&body)?;
            if incoming.updated_at < stored.updated_at {
                return Ok(UpsertOutcome::Unchanged);
            }
            let dirty = diff_listings(&stored, incoming);
            if dirty.is_empty() {
                return Ok(UpsertOutcome::Unchanged);
            }
            let version = version + 1;
            write_row(&conn, incoming, version)?;
            Ok(UpsertOutcome::Updated { version, dirty })
        }
    }
}

fn write_row(conn: &rusqlite::Connection, listing: &Listing, version: i64) -> Result<()> {
    let body = serde_json::to_string(listing)?;
    conn.execute(
        "INSERT INTO listings
            (id, version, status, city, province, property_type, beds, list_price, updated_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            version = excluded.version,
            status = excluded.status,
            city = excluded.city,
            province = excluded.province,
            property_type = excluded.property_type,
            beds = excluded.beds,
            list_price = excluded.list_price,
            updated_at = excluded.updated_at,
            body = excluded.body",
        params![
            listing.id,
            version,
            enum_str(&listing.status)?,
            listing.address.city,
            listing.address.province,
            enum_str(&listing.property_type)?,
            listing.beds,
            listing.list_price,
            listing.updated_at.to_rfc3339(),
            body,
        ],
    )?;
    Ok(())
}

pub async fn get(db: &Db, id: &str) -> Result<Option<StoredListing>> {
    let conn = db.lock().await;
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT version, body FROM listings WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((version, body)) => Ok(Some(StoredListing {
            listing: serde_json::from_str(&body)?,
            version,
        })),
    }
}

/// Gateway search filter. All fields optional; present fields must match.
#[derive(Debug, Clone, Default)]
pub struct ListingQuery {
    pub city: Option<String>,
    pub province: Option<String>,
    pub property_type: Option<String>,
    pub min_beds: Option<u32>,
    pub max_beds: Option<u32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub status: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

pub async fn search(db: &Db, query: &ListingQuery) -> Result<(Vec<StoredListing>, u64)> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();

    if let Some(city) = &query.city {
        clauses.push(format!("LOWER(city) = LOWER(?{})", args.len() + 1));
        args.push(Box::new(city.clone()));
    }
    if let Some(province) = &query.province {
        clauses.push(format!("LOWER(province) = LOWER(?{})", args.len() + 1));
        args.push(Box::new(province.clone()));
    }
    if let Some(pt) = &query.property_type {
        clauses.push(format!("property_type = ?{}", args.len() + 1));
        args.push(Box::new(pt.clone()));
    }
    if let Some(beds) = query.min_beds {
        clauses.push(format!("beds >= ?{}", args.len() + 1));
        args.push(Box::new(beds));
    }
    if let Some(beds) = query.max_beds {
        clauses.push(format!("beds <= ?{}", args.len() + 1));
        args.push(Box::new(beds));
    }
    if let Some(price) = query.min_price {
        clauses.push(format!("list_price >= ?{}", args.len() + 1));
        args.push(Box::new(price));
    }
    if let Some(price) = query.max_price {
        clauses.push(format!("list_price <= ?{}", args.len() + 1));
        args.push(Box::new(price));
    }
    if let Some(status) = &query.status {
        clauses.push(format!("status = ?{}", args.len() + 1));
        args.push(Box::new(status.clone()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let conn = db.lock().await;

    let total: u64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM listings {where_sql}"),
        rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT version, body FROM listings {where_sql}
         ORDER BY updated_at DESC, id
         LIMIT {} OFFSET {}",
        query.limit, query.offset
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    )?;

    let mut listings = Vec::new();
    for row in rows {
        let (version, body) = row?;
        listings.push(StoredListing {
            listing: serde_json::from_str(&body)?,
            version,
        });
    }
    Ok((listings, total))
}

/// Serde's external representation of a unit enum variant, used for the
/// queryable columns so SQL filters and JSON bodies agree.
fn enum_str<T: serde::Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(PipelineError::Fatal(format!(
            "expected string-serialized enum, got {other}"
        ))),
    }
}
