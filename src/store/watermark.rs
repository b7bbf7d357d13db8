use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::errors::{PipelineError, Result};

use super::Db;

/// The most recent upstream `updated_at` fully processed for a feed source.
/// Only advanced after a successful page set, so retried fetches re-read
/// duplicates that diff-and-bump then absorbs.
pub async fn get(db: &Db, source: &str) -> Result<Option<DateTime<Utc>>> {
    let conn = db.lock().await;
    let raw: Option<String> = conn
        .query_row(
            "SELECT watermark FROM ingest_watermark WHERE source = ?1",
            params![source],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .parse::<DateTime<Utc>>()
            .map(Some)
            .map_err(|e| PipelineError::Fatal(format!("stored watermark '{raw}': {e}"))),
    }
}

pub async fn set(db: &Db, source: &str, watermark: DateTime<Utc>) -> Result<()> {
    let conn = db.lock().await;
    conn.execute(
        "INSERT INTO ingest_watermark (source, watermark) VALUES (?1, ?2)
         ON CONFLICT(source) DO UPDATE SET watermark = excluded.watermark",
        params![source, watermark.to_rfc3339()],
    )?;
    Ok(())
}
