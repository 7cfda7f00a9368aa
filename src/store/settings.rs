//! Key/value settings table.
//!
//! Connection-level functions so the decision tick can read and write
//! settings inside a single [`Store::execute`] closure. A missing key reads
//! as an error, same as a broken row; callers that can tolerate either
//! substitute a default (see `engine`).
//!
//! [`Store::execute`]: crate::store::Store::execute

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

pub fn get_raw(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .with_context(|| format!("failed to read setting {key}"))
}

pub fn set_raw(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn get_float(conn: &Connection, key: &str) -> Result<f64> {
    let raw = get_raw(conn, key)?;
    raw.parse::<f64>()
        .with_context(|| format!("setting {key} holds non-numeric value {raw:?}"))
}

pub fn set_float(conn: &Connection, key: &str, value: f64) -> Result<()> {
    set_raw(conn, key, &value.to_string())
}

pub fn get_int(conn: &Connection, key: &str) -> Result<i64> {
    let raw = get_raw(conn, key)?;
    raw.parse::<i64>()
        .with_context(|| format!("setting {key} holds non-integer value {raw:?}"))
}

pub fn set_int(conn: &Connection, key: &str, value: i64) -> Result<()> {
    set_raw(conn, key, &value.to_string())
}

pub fn get_bool(conn: &Connection, key: &str) -> Result<bool> {
    Ok(get_int(conn, key)? != 0)
}

pub fn set_bool(conn: &Connection, key: &str, value: bool) -> Result<()> {
    set_int(conn, key, i64::from(value))
}
