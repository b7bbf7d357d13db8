use rusqlite::{OptionalExtension, params};

use crate::errors::Result;
use crate::model::enrichment::Enrichment;

use super::Db;

/// Diff-and-upsert. Returns `(changed, previous)` — `computed_at` is volatile
/// and excluded from the comparison, so a recompute that lands on identical
/// data writes nothing and emits nothing downstream.
pub async fn upsert(db: &Db, row: &Enrichment) -> Result<(bool, Option<Enrichment>)> {
    let conn = db.lock().await;

    let existing: Option<String> = conn
        .query_row(
            "SELECT body FROM enrichments WHERE listing_id = ?1",
            params![row.listing_id],
            |r| r.get(0),
        )
        .optional()?;

    let previous: Option<Enrichment> = match existing {
        Some(body) => Some(serde_json::from_str(&body)?),
        None => None,
    };

    if let Some(prev) = &previous {
        if !row.differs_from(prev) {
            return Ok((false, previous));
        }
    }

    conn.execute(
        "INSERT INTO enrichments (listing_id, listing_version, body)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(listing_id) DO UPDATE SET
            listing_version = excluded.listing_version,
            body = excluded.body",
        params![
            row.listing_id,
            row.listing_version,
            serde_json::to_string(row)?
        ],
    )?;
    Ok((true, previous))
}

pub async fn get(db: &Db, listing_id: &str) -> Result<Option<Enrichment>> {
    let conn = db.lock().await;
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM enrichments WHERE listing_id = ?1",
            params![listing_id],
            |r| r.get(0),
        )
        .optional()?;
    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}
