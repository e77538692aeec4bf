use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Get a stored value by key. Returns None if not set.
pub fn get_item(conn: &Connection, key: &str) -> Result<Option<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT value FROM local_storage WHERE key = ?1")?;
    match stmt.query_row([key], |row| row.get::<_, String>(0)) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// Set a stored value (upsert).
pub fn set_item(conn: &Connection, key: &str, value: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO local_storage (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

/// Replace a value and return what was stored before, in one transaction.
pub fn swap_item(
    conn: &Connection,
    key: &str,
    value: &str,
) -> Result<Option<String>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let previous = get_item(&tx, key)?;
    set_item(&tx, key, value)?;
    tx.commit()?;
    Ok(previous)
}

/// Delete a stored value. Missing keys are not an error.
pub fn remove_item(conn: &Connection, key: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM local_storage WHERE key = ?1", [key])?;
    Ok(())
}
