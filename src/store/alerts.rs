use rusqlite::{OptionalExtension, params};

use crate::errors::Result;
use crate::model::alert::{Alert, DeliveryState};

use super::Db;

/// Insert keyed by (user, listing, result); an existing row wins the race and
/// the same underwrite result never fires two alerts for one user.
/// Returns true when this call created the alert.
pub async fn insert(db: &Db, alert: &Alert) -> Result<bool> {
    let conn = db.lock().await;
    let inserted = conn.execute(
        "INSERT INTO alerts
            (id, user_id, listing_id, result_id, saved_search_id, triggered_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id, listing_id, result_id) DO NOTHING",
        params![
            alert.id.to_string(),
            alert.user_id,
            alert.listing_id,
            alert.result_id,
            alert.saved_search_id.to_string(),
            alert.triggered_at.to_rfc3339(),
            serde_json::to_string(alert)?
        ],
    )?;
    Ok(inserted == 1)
}

pub async fn get(db: &Db, user_id: &str, listing_id: &str, result_id: &str) -> Result<Option<Alert>> {
    let conn = db.lock().await;
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM alerts
             WHERE user_id = ?1 AND listing_id = ?2 AND result_id = ?3",
            params![user_id, listing_id, result_id],
            |r| r.get(0),
        )
        .optional()?;
    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

/// Update one channel's delivery state on the stored alert body. The row is
/// never deleted — failed dispatches are retried off this record.
pub async fn set_delivery_state(
    db: &Db,
    alert_id: &str,
    channel: &str,
    state: DeliveryState,
) -> Result<()> {
    let conn = db.lock().await;
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM alerts WHERE id = ?1",
            params![alert_id],
            |r| r.get(0),
        )
        .optional()?;

    let Some(body) = body else {
        return Err(crate::errors::PipelineError::NotFound(format!(
            "alert {alert_id}"
        )));
    };

    let mut alert: Alert = serde_json::from_str(&body)?;
    alert.delivery.insert(channel.to_string(), state);
    conn.execute(
        "UPDATE alerts SET body = ?2 WHERE id = ?1",
        params![alert_id, serde_json::to_string(&alert)?],
    )?;
    Ok(())
}

pub async fn list_for_user(db: &Db, user_id: &str) -> Result<Vec<Alert>> {
    let conn = db.lock().await;
    let mut stmt = conn
        .prepare("SELECT body FROM alerts WHERE user_id = ?1 ORDER BY triggered_at DESC")?;
    let rows = stmt.query_map(params![user_id], |r| r.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(serde_json::from_str(&row?)?);
    }
    Ok(out)
}

pub async fn list_for_listing(db: &Db, listing_id: &str, limit: u32) -> Result<Vec<Alert>> {
    let conn = db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT body FROM alerts WHERE listing_id = ?1
         ORDER BY triggered_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![listing_id, limit], |r| r.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(serde_json::from_str(&row?)?);
    }
    Ok(out)
}
