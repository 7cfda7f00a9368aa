//! Decision engine: one `decide` call per reading from the thermostat.
//!
//! The engine carries no state of its own between ticks. The previous
//! furnace state, the thresholds, and the override all live in the store;
//! occupancy comes from the presence tracker. Each tick runs its reads, the
//! decision, and its writes as a single store task, so concurrent ticks and
//! override toggles serialize cleanly instead of interleaving.

pub mod policy;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    presence::PresenceTracker,
    store::{history, settings, HistoryPoint, OccupancyPoint, Store},
};
use policy::{should_burn, PolicyInputs, DEFAULT_ACTIVE_TEMP, DEFAULT_IDLE_TEMP};

const IDLE_TEMP_KEY: &str = "idle_temp";
const ACTIVE_TEMP_KEY: &str = "active_temp";
const OVERRIDE_KEY: &str = "override";
const FURNACE_ON_KEY: &str = "furnace_on";

/// Manual override stays active this long after activation.
pub const OVERRIDE_WINDOW_MINS: i64 = 20;

/// How far back the status graphs reach.
pub const GRAPH_WINDOW_DAYS: i64 = 7;

#[derive(Clone)]
pub struct DecisionEngine {
    store: Store,
    presence: PresenceTracker,
    started_at: DateTime<Utc>,
}

/// Snapshot rendered by the status page and the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub furnace_on: bool,
    pub last_temp: Option<f64>,
    pub idle_temp: f64,
    pub active_temp: f64,
    pub override_active: bool,
    pub anybody_home: bool,
    pub people: Vec<PersonStatus>,
    pub uptime_secs: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryPoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub occupancy: Vec<OccupancyPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonStatus {
    pub name: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_seen: DateTime<Utc>,
    /// Seconds since the device was last seen, clamped to zero (a freshly
    /// loaded roster can be stamped a moment ahead of `now`).
    pub seen_secs_ago: i64,
    pub home: bool,
}

struct StatusScalars {
    furnace_on: bool,
    last_temp: Option<f64>,
    idle_temp: f64,
    active_temp: f64,
    override_active: bool,
}

impl Default for StatusScalars {
    fn default() -> Self {
        Self {
            furnace_on: false,
            last_temp: None,
            idle_temp: DEFAULT_IDLE_TEMP,
            active_temp: DEFAULT_ACTIVE_TEMP,
            override_active: false,
        }
    }
}

impl DecisionEngine {
    pub fn new(store: Store, presence: PresenceTracker) -> Self {
        Self {
            store,
            presence,
            started_at: Utc::now(),
        }
    }

    /// Decide whether the furnace should run right now, and record the tick.
    ///
    /// Never fails outwardly: unreadable settings fall back to their
    /// defaults, failed writes are logged and ignored, and if the store is
    /// gone entirely the decision still runs against the defaults.
    pub async fn decide(&self, temp: f64, pressure: f64) -> bool {
        let now = Utc::now();
        // One roster read per tick: the recorded occupancy flag and the
        // per-person rows describe the same instant.
        let people_flags: Vec<(i64, bool)> = self
            .presence
            .snapshot()
            .into_iter()
            .map(|person| (person.id, person.is_home_at(now)))
            .collect();
        let occupied = people_flags.iter().any(|&(_, home)| home);

        let result = self
            .store
            .execute(move |conn| {
                let idle_temp = float_or(conn, IDLE_TEMP_KEY, DEFAULT_IDLE_TEMP);
                let active_temp = float_or(conn, ACTIVE_TEMP_KEY, DEFAULT_ACTIVE_TEMP);
                let override_active = override_active_at(conn, now);
                let furnace_was_on = bool_or(conn, FURNACE_ON_KEY, false);

                let burn = should_burn(&PolicyInputs {
                    current_temp: temp,
                    idle_temp,
                    active_temp,
                    occupied,
                    override_active,
                    furnace_was_on,
                });

                if let Err(err) = history::append_history(conn, now, temp, pressure, burn, occupied)
                {
                    error!("Failed to append history record: {err:#}");
                }
                if let Err(err) = settings::set_bool(conn, FURNACE_ON_KEY, burn) {
                    error!("Failed to persist furnace state: {err:#}");
                }
                for (person, is_home) in &people_flags {
                    if let Err(err) = history::append_presence(conn, now, *person, *is_home) {
                        error!("Failed to append presence record: {err:#}");
                    }
                }

                Ok(burn)
            })
            .await;

        match result {
            Ok(burn) => burn,
            Err(err) => {
                error!("Store unavailable during decision tick: {err:#}");
                should_burn(&PolicyInputs {
                    current_temp: temp,
                    idle_temp: DEFAULT_IDLE_TEMP,
                    active_temp: DEFAULT_ACTIVE_TEMP,
                    occupied,
                    override_active: false,
                    furnace_was_on: false,
                })
            }
        }
    }

    /// Turn the override on (forced burn for the next
    /// [`OVERRIDE_WINDOW_MINS`] minutes) or off.
    pub async fn set_override(&self, on: bool) -> Result<()> {
        let value = if on { Utc::now().timestamp() } else { 0 };
        self.store
            .execute(move |conn| settings::set_int(conn, OVERRIDE_KEY, value))
            .await?;
        if on {
            info!("Override enabled for {OVERRIDE_WINDOW_MINS} minutes");
        } else {
            info!("Override cleared");
        }
        Ok(())
    }

    pub async fn override_active(&self) -> bool {
        let now = Utc::now();
        match self
            .store
            .execute(move |conn| Ok(override_active_at(conn, now)))
            .await
        {
            Ok(active) => active,
            Err(err) => {
                error!("Failed to read override state: {err:#}");
                false
            }
        }
    }

    /// Assemble the full status snapshot; graph series only when asked for.
    pub async fn status(&self, include_graphs: bool) -> EngineStatus {
        let now = Utc::now();

        let scalars = match self
            .store
            .execute(move |conn| {
                let last_temp = match history::last_temperature(conn) {
                    Ok(temp) => temp,
                    Err(err) => {
                        warn!("Failed to read last temperature: {err:#}");
                        None
                    }
                };
                Ok(StatusScalars {
                    furnace_on: bool_or(conn, FURNACE_ON_KEY, false),
                    last_temp,
                    idle_temp: float_or(conn, IDLE_TEMP_KEY, DEFAULT_IDLE_TEMP),
                    active_temp: float_or(conn, ACTIVE_TEMP_KEY, DEFAULT_ACTIVE_TEMP),
                    override_active: override_active_at(conn, now),
                })
            })
            .await
        {
            Ok(scalars) => scalars,
            Err(err) => {
                error!("Failed to read status snapshot: {err:#}");
                StatusScalars::default()
            }
        };

        let people: Vec<PersonStatus> = self
            .presence
            .snapshot()
            .into_iter()
            .map(|person| PersonStatus {
                home: person.is_home_at(now),
                seen_secs_ago: (now - person.last_seen).num_seconds().max(0),
                name: person.name,
                last_seen: person.last_seen,
            })
            .collect();

        let (history, occupancy) = if include_graphs {
            let window = Duration::days(GRAPH_WINDOW_DAYS);
            (
                self.store.history_window(window).await,
                self.store.home_counts_window(window).await,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        EngineStatus {
            furnace_on: scalars.furnace_on,
            last_temp: scalars.last_temp,
            idle_temp: scalars.idle_temp,
            active_temp: scalars.active_temp,
            override_active: scalars.override_active,
            anybody_home: self.presence.anybody_home(now),
            people,
            uptime_secs: (now - self.started_at).num_seconds(),
            history,
            occupancy,
        }
    }
}

fn float_or(conn: &Connection, key: &'static str, default: f64) -> f64 {
    match settings::get_float(conn, key) {
        Ok(value) => value,
        Err(err) => {
            warn!("Falling back to default for {key}: {err:#}");
            default
        }
    }
}

fn bool_or(conn: &Connection, key: &'static str, default: bool) -> bool {
    match settings::get_bool(conn, key) {
        Ok(value) => value,
        Err(err) => {
            warn!("Falling back to default for {key}: {err:#}");
            default
        }
    }
}

/// The override setting holds the Unix timestamp of its activation (0 when
/// cleared); it is active until the window past that instant has elapsed.
fn override_active_at(conn: &Connection, now: DateTime<Utc>) -> bool {
    let started = match settings::get_int(conn, OVERRIDE_KEY) {
        Ok(value) => value,
        Err(err) => {
            warn!("Falling back to inactive override: {err:#}");
            0
        }
    };

    match DateTime::from_timestamp(started, 0) {
        Some(started_at) => now < started_at + Duration::minutes(OVERRIDE_WINDOW_MINS),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct TestDb {
        store: Store,
        path: PathBuf,
    }

    impl Drop for TestDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
            let _ = std::fs::remove_file(self.path.with_extension("sqlite3-wal"));
            let _ = std::fs::remove_file(self.path.with_extension("sqlite3-shm"));
        }
    }

    fn test_db() -> TestDb {
        let path =
            std::env::temp_dir().join(format!("hearth-engine-{}.sqlite3", uuid::Uuid::new_v4()));
        let store = Store::open(path.clone()).unwrap();
        TestDb { store, path }
    }

    fn test_engine(store: &Store) -> DecisionEngine {
        DecisionEngine::new(store.clone(), PresenceTracker::new())
    }

    async fn history_rows(store: &Store) -> Vec<(f64, bool)> {
        store
            .execute(|conn| {
                let mut stmt =
                    conn.prepare("SELECT temp, heater FROM history ORDER BY id ASC")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .unwrap()
    }

    async fn last_tick_occupancy(store: &Store) -> (bool, i64) {
        store
            .execute(|conn| {
                let inhabited = conn.query_row(
                    "SELECT inhabited FROM history ORDER BY id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )?;
                let home_rows = conn.query_row(
                    "SELECT COUNT(*) FROM people_history WHERE is_home = 1",
                    [],
                    |row| row.get(0),
                )?;
                Ok((inhabited, home_rows))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn each_tick_appends_one_matching_history_row() {
        let db = test_db();
        let engine = test_engine(&db.store);

        assert!(engine.decide(10.0, 1012.0).await);
        assert!(!engine.decide(20.0, 1012.0).await);

        let rows = history_rows(&db.store).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (10.0, true));
        assert_eq!(rows[1], (20.0, false));
    }

    #[tokio::test]
    async fn furnace_state_carries_across_ticks_through_the_band() {
        let db = test_db();
        let engine = test_engine(&db.store);

        // Cold start below the floor turns the furnace on.
        assert!(engine.decide(10.0, 1012.0).await);
        // Inside the unoccupied band (12.5 * 1.05 = 13.125): stays on.
        assert!(engine.decide(13.0, 1012.0).await);
        // Clear of the band: turns off.
        assert!(!engine.decide(13.2, 1012.0).await);
        // Same temperature again, but now the furnace is off: stays off.
        assert!(!engine.decide(13.0, 1012.0).await);
    }

    #[tokio::test]
    async fn override_forces_burn_until_toggled_off() {
        let db = test_db();
        let engine = test_engine(&db.store);

        assert!(!engine.decide(20.0, 1012.0).await);

        engine.set_override(true).await.unwrap();
        assert!(engine.override_active().await);
        assert!(engine.decide(20.0, 1012.0).await);

        engine.set_override(false).await.unwrap();
        assert!(!engine.override_active().await);
        // 20.0 is above the occupied band, so nothing holds the furnace on.
        assert!(!engine.decide(20.0, 1012.0).await);
    }

    #[tokio::test]
    async fn override_expires_after_its_window() {
        let db = test_db();
        let engine = test_engine(&db.store);

        let nineteen_min_ago = (Utc::now() - Duration::minutes(19)).timestamp();
        db.store
            .execute(move |conn| settings::set_int(conn, "override", nineteen_min_ago))
            .await
            .unwrap();
        assert!(engine.override_active().await);

        let twenty_one_min_ago = (Utc::now() - Duration::minutes(21)).timestamp();
        db.store
            .execute(move |conn| settings::set_int(conn, "override", twenty_one_min_ago))
            .await
            .unwrap();
        assert!(!engine.override_active().await);
    }

    #[tokio::test]
    async fn occupied_tick_records_presence_and_occupancy() {
        let db = test_db();
        db.store
            .execute(|conn| {
                crate::store::people::insert_person(conn, "aa:bb:cc:dd:ee:01", "ada")?;
                crate::store::people::insert_person(conn, "aa:bb:cc:dd:ee:02", "brin")?;
                Ok(())
            })
            .await
            .unwrap();

        let presence = PresenceTracker::new();
        presence.load_roster(&db.store).await.unwrap();
        let engine = DecisionEngine::new(db.store.clone(), presence);

        // Roster just loaded, so the house is occupied; 15.0 < 15.5.
        assert!(engine.decide(15.0, 1012.0).await);

        let (presence_rows, inhabited): (i64, bool) = db
            .store
            .execute(|conn| {
                let count =
                    conn.query_row("SELECT COUNT(*) FROM people_history", [], |row| row.get(0))?;
                let inhabited = conn.query_row(
                    "SELECT inhabited FROM history ORDER BY id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )?;
                Ok((count, inhabited))
            })
            .await
            .unwrap();
        assert_eq!(presence_rows, 2);
        assert!(inhabited);
    }

    #[tokio::test]
    async fn tick_history_and_presence_rows_agree_on_occupancy() {
        let db = test_db();
        db.store
            .execute(|conn| {
                crate::store::people::insert_person(conn, "aa:bb:cc:dd:ee:01", "ada")?;
                Ok(())
            })
            .await
            .unwrap();
        let presence = PresenceTracker::new();
        presence.load_roster(&db.store).await.unwrap();
        let engine = DecisionEngine::new(db.store.clone(), presence);

        engine.decide(20.0, 1012.0).await;
        let (inhabited, home_rows) = last_tick_occupancy(&db.store).await;
        assert!(inhabited);
        assert_eq!(inhabited, home_rows > 0);

        // Empty roster: the same tick-level agreement from the other side.
        let empty = test_db();
        let engine = test_engine(&empty.store);
        engine.decide(20.0, 1012.0).await;
        let (inhabited, home_rows) = last_tick_occupancy(&empty.store).await;
        assert!(!inhabited);
        assert_eq!(inhabited, home_rows > 0);
    }

    #[tokio::test]
    async fn status_reflects_the_latest_tick() {
        let db = test_db();
        let engine = test_engine(&db.store);

        engine.decide(10.0, 1012.0).await;
        let status = engine.status(false).await;

        assert!(status.furnace_on);
        assert_eq!(status.last_temp, Some(10.0));
        assert_eq!(status.idle_temp, 12.5);
        assert_eq!(status.active_temp, 15.5);
        assert!(!status.override_active);
        assert!(!status.anybody_home);
        assert!(status.people.is_empty());
        assert!(status.uptime_secs >= 0);
        assert!(status.history.is_empty());
        assert!(status.occupancy.is_empty());
    }

    #[tokio::test]
    async fn status_graphs_include_windowed_series() {
        let db = test_db();
        db.store
            .execute(|conn| {
                crate::store::people::insert_person(conn, "aa:bb:cc:dd:ee:01", "ada")?;
                crate::store::people::insert_person(conn, "aa:bb:cc:dd:ee:02", "brin")?;
                Ok(())
            })
            .await
            .unwrap();

        let presence = PresenceTracker::new();
        presence.load_roster(&db.store).await.unwrap();
        let engine = DecisionEngine::new(db.store.clone(), presence);

        // Distinct timestamps per tick keep the occupancy grouping per-tick.
        for _ in 0..5 {
            engine.decide(14.0, 1012.0).await;
            tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
        }

        let status = engine.status(true).await;
        // Five history rows, downsampled to every fifth: one point.
        assert_eq!(status.history.len(), 1);
        assert_eq!(status.history[0].temp, 14.0);
        assert_eq!(status.occupancy.len(), 5);
        assert!(status.occupancy.iter().all(|point| point.count == 2));
        assert_eq!(status.people.len(), 2);
        assert!(status.people.iter().all(|p| p.home && p.seen_secs_ago < 60));
    }
}
