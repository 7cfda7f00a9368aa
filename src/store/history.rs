//! Tick history and per-person presence history.
//!
//! Both tables are append-only; the decision tick inserts one history row
//! per evaluation and one presence row per tracked person. Reads are the
//! windowed series behind the graphs and the most recent temperature.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{error, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::store::{
    helpers::{fmt_ts, parse_ts},
    Store,
};

/// One decision tick as recorded for the trend graphs.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPoint {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub temp: f64,
    pub pressure: f64,
    pub inhabited: bool,
}

/// Number of tracked people seen home at one tick.
#[derive(Debug, Clone, Serialize)]
pub struct OccupancyPoint {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub count: i64,
}

pub fn append_history(
    conn: &Connection,
    at: DateTime<Utc>,
    temp: f64,
    pressure: f64,
    heater: bool,
    inhabited: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO history (timestamp, temp, pressure, heater, inhabited)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![fmt_ts(at), temp, pressure, heater, inhabited],
    )?;
    Ok(())
}

pub fn append_presence(
    conn: &Connection,
    at: DateTime<Utc>,
    person: i64,
    is_home: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO people_history (timestamp, person, is_home)
         VALUES (?1, ?2, ?3)",
        params![fmt_ts(at), person, is_home],
    )?;
    Ok(())
}

/// Ticks newer than `cutoff`, downsampled to every fifth row to keep the
/// graph payload small. Rows with unreadable timestamps are skipped.
pub fn history_since(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<HistoryPoint>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, temp, pressure, inhabited FROM history
         WHERE timestamp > ?1 AND id % 5 = 0
         ORDER BY timestamp ASC",
    )?;

    let rows = stmt.query_map(params![fmt_ts(cutoff)], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut points = Vec::new();
    for row in rows {
        let (raw_ts, temp, pressure, inhabited) = row?;
        match parse_ts(&raw_ts, "history.timestamp") {
            Ok(timestamp) => points.push(HistoryPoint {
                timestamp,
                temp,
                pressure,
                inhabited,
            }),
            Err(err) => warn!("Skipping malformed history row: {err:#}"),
        }
    }
    Ok(points)
}

/// How many tracked people were home at each tick newer than `cutoff`.
pub fn home_counts_since(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<OccupancyPoint>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, SUM(is_home) FROM people_history
         WHERE timestamp > ?1
         GROUP BY timestamp
         ORDER BY timestamp ASC",
    )?;

    let rows = stmt.query_map(params![fmt_ts(cutoff)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut points = Vec::new();
    for row in rows {
        let (raw_ts, count) = row?;
        match parse_ts(&raw_ts, "people_history.timestamp") {
            Ok(timestamp) => points.push(OccupancyPoint { timestamp, count }),
            Err(err) => warn!("Skipping malformed presence row: {err:#}"),
        }
    }
    Ok(points)
}

pub fn last_temperature(conn: &Connection) -> Result<Option<f64>> {
    let temp = conn
        .query_row(
            "SELECT temp FROM history ORDER BY timestamp DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(temp)
}

impl Store {
    /// Windowed tick history for the graphs. A store failure degrades to an
    /// empty series instead of failing the page render.
    pub async fn history_window(&self, window: Duration) -> Vec<HistoryPoint> {
        let cutoff = Utc::now() - window;
        match self.execute(move |conn| history_since(conn, cutoff)).await {
            Ok(points) => points,
            Err(err) => {
                error!("Failed to load history window: {err:#}");
                Vec::new()
            }
        }
    }

    /// Windowed per-tick occupancy counts, same degradation as
    /// [`Store::history_window`].
    pub async fn home_counts_window(&self, window: Duration) -> Vec<OccupancyPoint> {
        let cutoff = Utc::now() - window;
        match self
            .execute(move |conn| home_counts_since(conn, cutoff))
            .await
        {
            Ok(points) => points,
            Err(err) => {
                error!("Failed to load occupancy window: {err:#}");
                Vec::new()
            }
        }
    }
}
