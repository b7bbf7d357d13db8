pub mod alerts;
pub mod enrichments;
pub mod listings;
pub mod rents;
pub mod searches;
pub mod underwriting;
pub mod watermark;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;

/// Shared handle to the SQLite store. A single connection with WAL is enough
/// for the in-process deployment; every service talks to its own tables.
pub type Db = Arc<Mutex<Connection>>;

pub fn open(path: &Path) -> Result<Db> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("creating db directory")?;
        }
    }

    let conn = Connection::open(path)
        .with_context(|| format!("opening sqlite at {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory store for tests and demo runs.
pub fn open_in_memory() -> Result<Db> {
    let conn = Connection::open_in_memory().context("opening in-memory sqlite")?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS listings (
            id             TEXT PRIMARY KEY,
            version        INTEGER NOT NULL,
            status         TEXT NOT NULL,
            city           TEXT NOT NULL,
            province       TEXT NOT NULL,
            property_type  TEXT NOT NULL,
            beds           INTEGER NOT NULL,
            list_price     REAL NOT NULL,
            updated_at     TEXT NOT NULL,
            body           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_listings_city ON listings (city, province);

        CREATE TABLE IF NOT EXISTS enrichments (
            listing_id       TEXT PRIMARY KEY,
            listing_version  INTEGER NOT NULL,
            body             TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rent_estimates (
            listing_id       TEXT PRIMARY KEY,
            listing_version  INTEGER NOT NULL,
            body             TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS grid_rows (
            listing_id       TEXT NOT NULL,
            listing_version  INTEGER NOT NULL,
            rent_scenario    TEXT NOT NULL,
            down_bps_bin     INTEGER NOT NULL,
            rate_bps_bin     INTEGER NOT NULL,
            amort_months     INTEGER NOT NULL,
            metrics          TEXT NOT NULL,
            PRIMARY KEY (listing_id, listing_version, rent_scenario,
                         down_bps_bin, rate_bps_bin, amort_months)
        );

        CREATE TABLE IF NOT EXISTS exact_results (
            id               TEXT PRIMARY KEY,
            listing_id       TEXT NOT NULL,
            listing_version  INTEGER NOT NULL,
            assumptions_hash TEXT NOT NULL,
            metrics          TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            UNIQUE (listing_id, listing_version, assumptions_hash)
        );

        CREATE TABLE IF NOT EXISTS assumption_sets (
            id    TEXT PRIMARY KEY,
            name  TEXT NOT NULL,
            body  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS saved_searches (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL,
            is_active  INTEGER NOT NULL,
            body       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_searches_user ON saved_searches (user_id);

        CREATE TABLE IF NOT EXISTS alerts (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            listing_id      TEXT NOT NULL,
            result_id       TEXT NOT NULL,
            saved_search_id TEXT NOT NULL,
            triggered_at    TEXT NOT NULL,
            body            TEXT NOT NULL,
            UNIQUE (user_id, listing_id, result_id)
        );
        CREATE INDEX IF NOT EXISTS idx_alerts_listing ON alerts (listing_id);

        CREATE TABLE IF NOT EXISTS ingest_watermark (
            source     TEXT PRIMARY KEY,
            watermark  TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
