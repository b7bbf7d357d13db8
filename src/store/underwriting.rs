use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::errors::Result;
use crate::model::assumptions::{AssumptionSet, RentScenario};
use crate::model::metrics::{ExactResult, GridRow, Metrics};

use super::Db;

/// Down-payment bins are stored as integer ten-thousandths so the composite
/// primary key never depends on floating-point equality.
fn down_bps(down_pct_bin: f64) -> i64 {
    (down_pct_bin * 10_000.0).round() as i64
}

fn scenario_str(s: RentScenario) -> &'static str {
    s.as_str()
}

// ── Grid rows ───────────────────────────────────────────────────────

/// Bulk-upsert a computed grid. One transaction; rows with the same key are
/// replaced, never appended, so re-running a grid is idempotent.
pub async fn upsert_grid_rows(db: &Db, rows: &[GridRow]) -> Result<()> {
    let mut conn = db.lock().await;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO grid_rows
                (listing_id, listing_version, rent_scenario, down_bps_bin,
                 rate_bps_bin, amort_months, metrics)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(listing_id, listing_version, rent_scenario,
                         down_bps_bin, rate_bps_bin, amort_months)
             DO UPDATE SET metrics = excluded.metrics",
        )?;
        for row in rows {
            stmt.execute(params![
                row.listing_id,
                row.listing_version,
                scenario_str(row.rent_scenario),
                down_bps(row.down_pct_bin),
                row.rate_bps_bin,
                row.amort_months,
                serde_json::to_string(&row.metrics)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn get_grid_row(
    db: &Db,
    listing_id: &str,
    listing_version: i64,
    scenario: RentScenario,
    down_pct_bin: f64,
    rate_bps_bin: u32,
    amort_months: u32,
) -> Result<Option<GridRow>> {
    let conn = db.lock().await;
    let metrics: Option<String> = conn
        .query_row(
            "SELECT metrics FROM grid_rows
             WHERE listing_id = ?1 AND listing_version = ?2 AND rent_scenario = ?3
               AND down_bps_bin = ?4 AND rate_bps_bin = ?5 AND amort_months = ?6",
            params![
                listing_id,
                listing_version,
                scenario_str(scenario),
                down_bps(down_pct_bin),
                rate_bps_bin,
                amort_months
            ],
            |r| r.get(0),
        )
        .optional()?;

    match metrics {
        None => Ok(None),
        Some(body) => Ok(Some(GridRow {
            listing_id: listing_id.to_string(),
            listing_version,
            rent_scenario: scenario,
            down_pct_bin,
            rate_bps_bin,
            amort_months,
            metrics: serde_json::from_str::<Metrics>(&body)?,
        })),
    }
}

/// Best grid row per scenario by cash-on-cash, for the gateway's
/// property-detail summary block.
pub async fn grid_best_rows(db: &Db, listing_id: &str, listing_version: i64) -> Result<Vec<GridRow>> {
    let conn = db.lock().await;
    let mut out = Vec::new();
    for scenario in RentScenario::ALL {
        let row: Option<(i64, u32, u32, String)> = conn
            .query_row(
                "SELECT down_bps_bin, rate_bps_bin, amort_months, metrics FROM grid_rows
                 WHERE listing_id = ?1 AND listing_version = ?2 AND rent_scenario = ?3
                 ORDER BY CAST(json_extract(metrics, '$.cash_on_cash_pct') AS REAL) DESC
                 LIMIT 1",
                params![listing_id, listing_version, scenario_str(scenario)],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        if let Some((down, rate, amort, metrics)) = row {
            out.push(GridRow {
                listing_id: listing_id.to_string(),
                listing_version,
                rent_scenario: scenario,
                down_pct_bin: down as f64 / 10_000.0,
                rate_bps_bin: rate,
                amort_months: amort,
                metrics: serde_json::from_str(&metrics)?,
            });
        }
    }
    Ok(out)
}

pub async fn grid_row_count(db: &Db, listing_id: &str, listing_version: i64) -> Result<u64> {
    let conn = db.lock().await;
    let n: u64 = conn.query_row(
        "SELECT COUNT(*) FROM grid_rows WHERE listing_id = ?1 AND listing_version = ?2",
        params![listing_id, listing_version],
        |r| r.get(0),
    )?;
    Ok(n)
}

// ── Exact results ───────────────────────────────────────────────────

/// Idempotent insert: `INSERT … ON CONFLICT DO NOTHING`, then on a silent
/// conflict re-select the surviving row's id. Concurrent identical requests
/// converge on one row.
pub async fn insert_exact(
    db: &Db,
    listing_id: &str,
    listing_version: i64,
    assumptions_hash: &str,
    metrics: &Metrics,
) -> Result<(String, bool)> {
    let conn = db.lock().await;
    let id = Uuid::new_v4().to_string();

    let inserted = conn.execute(
        "INSERT INTO exact_results
            (id, listing_id, listing_version, assumptions_hash, metrics, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(listing_id, listing_version, assumptions_hash) DO NOTHING",
        params![
            id,
            listing_id,
            listing_version,
            assumptions_hash,
            serde_json::to_string(metrics)?,
            Utc::now().to_rfc3339(),
        ],
    )?;

    if inserted == 1 {
        return Ok((id, true));
    }

    let existing: String = conn.query_row(
        "SELECT id FROM exact_results
         WHERE listing_id = ?1 AND listing_version = ?2 AND assumptions_hash = ?3",
        params![listing_id, listing_version, assumptions_hash],
        |r| r.get(0),
    )?;
    Ok((existing, false))
}

pub async fn get_exact(
    db: &Db,
    listing_id: &str,
    listing_version: i64,
    assumptions_hash: &str,
) -> Result<Option<ExactResult>> {
    let conn = db.lock().await;
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, metrics FROM exact_results
             WHERE listing_id = ?1 AND listing_version = ?2 AND assumptions_hash = ?3",
            params![listing_id, listing_version, assumptions_hash],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((id, metrics)) => Ok(Some(ExactResult {
            result_id: id,
            listing_id: listing_id.to_string(),
            listing_version,
            assumptions_hash: assumptions_hash.to_string(),
            metrics: serde_json::from_str(&metrics)?,
        })),
    }
}

pub async fn get_exact_by_id(db: &Db, result_id: &str) -> Result<Option<ExactResult>> {
    let conn = db.lock().await;
    let row: Option<(String, i64, String, String)> = conn
        .query_row(
            "SELECT listing_id, listing_version, assumptions_hash, metrics
             FROM exact_results WHERE id = ?1",
            params![result_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((listing_id, listing_version, hash, metrics)) => Ok(Some(ExactResult {
            result_id: result_id.to_string(),
            listing_id,
            listing_version,
            assumptions_hash: hash,
            metrics: serde_json::from_str(&metrics)?,
        })),
    }
}

pub async fn list_exact_for_listing(db: &Db, listing_id: &str) -> Result<Vec<ExactResult>> {
    let conn = db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT id, listing_version, assumptions_hash, metrics FROM exact_results
         WHERE listing_id = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![listing_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, version, hash, metrics) = row?;
        out.push(ExactResult {
            result_id: id,
            listing_id: listing_id.to_string(),
            listing_version: version,
            assumptions_hash: hash,
            metrics: serde_json::from_str(&metrics)?,
        });
    }
    Ok(out)
}

// ── Assumption sets ─────────────────────────────────────────────────

pub async fn insert_assumption_set(db: &Db, set: &AssumptionSet) -> Result<()> {
    let conn = db.lock().await;
    conn.execute(
        "INSERT INTO assumption_sets (id, name, body) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, body = excluded.body",
        params![
            set.id.to_string(),
            set.name,
            serde_json::to_string(set)?
        ],
    )?;
    Ok(())
}

pub async fn get_assumption_set(db: &Db, id: &Uuid) -> Result<Option<AssumptionSet>> {
    let conn = db.lock().await;
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM assumption_sets WHERE id = ?1",
            params![id.to_string()],
            |r| r.get(0),
        )
        .optional()?;
    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}
