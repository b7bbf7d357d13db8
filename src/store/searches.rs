use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::errors::Result;
use crate::model::search::SavedSearch;

use super::Db;

pub async fn upsert(db: &Db, search: &SavedSearch) -> Result<()> {
    let conn = db.lock().await;
    conn.execute(
        "INSERT INTO saved_searches (id, user_id, is_active, body)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            is_active = excluded.is_active,
            body = excluded.body",
        params![
            search.id.to_string(),
            search.user_id,
            search.is_active as i64,
            serde_json::to_string(search)?
        ],
    )?;
    Ok(())
}

pub async fn get(db: &Db, id: &Uuid) -> Result<Option<SavedSearch>> {
    let conn = db.lock().await;
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM saved_searches WHERE id = ?1",
            params![id.to_string()],
            |r| r.get(0),
        )
        .optional()?;
    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

pub async fn delete(db: &Db, id: &Uuid) -> Result<bool> {
    let conn = db.lock().await;
    let n = conn.execute(
        "DELETE FROM saved_searches WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(n > 0)
}

pub async fn list_for_user(db: &Db, user_id: &str) -> Result<Vec<SavedSearch>> {
    let conn = db.lock().await;
    let mut stmt =
        conn.prepare("SELECT body FROM saved_searches WHERE user_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![user_id], |r| r.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(serde_json::from_str(&row?)?);
    }
    Ok(out)
}

/// Every active search across all users — the alerts matcher's working set.
pub async fn list_active(db: &Db) -> Result<Vec<SavedSearch>> {
    let conn = db.lock().await;
    let mut stmt =
        conn.prepare("SELECT body FROM saved_searches WHERE is_active = 1 ORDER BY id")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(serde_json::from_str(&row?)?);
    }
    Ok(out)
}
