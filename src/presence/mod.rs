//! Who is home, inferred from DHCP chatter in the syslog.
//!
//! The roster of tracked devices is loaded once at startup; a background
//! task follows the syslog and bumps a person's `last_seen` whenever a DHCP
//! line mentions their MAC. A person counts as home while their device was
//! seen inside the staleness window.

pub mod syslog;
pub mod tail;

use std::{
    path::PathBuf,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::store::Store;
use syslog::{SyslogLine, DHCP_TAG};

/// A device unseen for this long (or longer) no longer counts as home.
pub const STALENESS_WINDOW_MINS: i64 = 10;

#[derive(Debug, Clone)]
pub struct Person {
    pub id: i64,
    pub mac: String,
    pub name: String,
    pub last_seen: DateTime<Utc>,
}

impl Person {
    /// Home iff seen strictly inside the staleness window. Exactly at the
    /// window boundary counts as away.
    pub fn is_home_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_seen < Duration::minutes(STALENESS_WINDOW_MINS)
    }
}

/// Shared presence state. Cloning is cheap; all clones see the same roster.
#[derive(Clone, Default)]
pub struct PresenceTracker {
    roster: Arc<RwLock<Vec<Person>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_roster(&self) -> RwLockReadGuard<'_, Vec<Person>> {
        match self.roster.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_roster(&self) -> RwLockWriteGuard<'_, Vec<Person>> {
        match self.roster.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Load the tracked people from the store, optimistically marking
    /// everyone as just seen. Returns how many people are tracked.
    pub async fn load_roster(&self, store: &Store) -> Result<usize> {
        let rows = store
            .load_people()
            .await
            .context("failed to load people roster")?;

        let now = Utc::now();
        let roster: Vec<Person> = rows
            .into_iter()
            .map(|row| Person {
                id: row.id,
                mac: row.mac,
                name: row.name,
                last_seen: now,
            })
            .collect();

        let count = roster.len();
        *self.write_roster() = roster;
        info!("Tracking {count} people for presence");
        Ok(count)
    }

    /// Apply one parsed syslog line. Only DHCP-daemon lines are considered;
    /// each tracked MAC appearing in the message bumps that person's
    /// `last_seen` to the line's own timestamp. `last_seen` never moves
    /// backwards, so replaying an old log cannot un-see a person.
    pub fn apply_line(&self, line: &SyslogLine) {
        if line.tag != DHCP_TAG {
            return;
        }

        let mut roster = self.write_roster();
        for person in roster.iter_mut() {
            if line.message.contains(&person.mac) && line.timestamp > person.last_seen {
                debug!("{} seen at {}", person.name, line.timestamp);
                person.last_seen = line.timestamp;
            }
        }
    }

    pub fn most_recently_active(&self) -> Option<Person> {
        self.read_roster()
            .iter()
            .max_by_key(|person| person.last_seen)
            .cloned()
    }

    /// Whether any tracked person is currently home. An empty roster means
    /// nobody ever counts as home.
    pub fn anybody_home(&self, now: DateTime<Utc>) -> bool {
        self.most_recently_active()
            .map(|person| person.is_home_at(now))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Vec<Person> {
        self.read_roster().clone()
    }

    /// Follow the syslog until cancelled, feeding every parsed line through
    /// [`PresenceTracker::apply_line`].
    pub async fn follow(self, path: PathBuf, cancel: CancellationToken) {
        tail::follow(path, cancel, move |raw| {
            if let Some(line) = syslog::parse_line(raw, Utc::now()) {
                self.apply_line(&line);
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, hour, minute, 0).unwrap()
    }

    fn tracker_with(people: Vec<Person>) -> PresenceTracker {
        let tracker = PresenceTracker::new();
        *tracker.write_roster() = people;
        tracker
    }

    fn person(id: i64, mac: &str, name: &str, last_seen: DateTime<Utc>) -> Person {
        Person {
            id,
            mac: mac.to_string(),
            name: name.to_string(),
            last_seen,
        }
    }

    fn dhcp_line(mac: &str, timestamp: DateTime<Utc>) -> SyslogLine {
        SyslogLine {
            timestamp,
            host: "gateway".to_string(),
            tag: DHCP_TAG.to_string(),
            message: format!("DHCPACK on 10.0.0.7 to {mac} (phone) via eth0"),
        }
    }

    #[test]
    fn home_window_boundary_is_exclusive() {
        let p = person(1, "aa:bb:cc:dd:ee:01", "ada", at(12, 0));
        assert!(p.is_home_at(at(12, 9)));
        assert!(!p.is_home_at(at(12, 10)));
    }

    #[test]
    fn dhcp_line_bumps_last_seen() {
        let tracker = tracker_with(vec![
            person(1, "aa:bb:cc:dd:ee:01", "ada", at(9, 0)),
            person(2, "aa:bb:cc:dd:ee:02", "brin", at(9, 0)),
        ]);

        tracker.apply_line(&dhcp_line("aa:bb:cc:dd:ee:02", at(12, 0)));

        let roster = tracker.snapshot();
        assert_eq!(roster[0].last_seen, at(9, 0));
        assert_eq!(roster[1].last_seen, at(12, 0));
    }

    #[test]
    fn last_seen_never_moves_backwards() {
        let tracker = tracker_with(vec![person(1, "aa:bb:cc:dd:ee:01", "ada", at(12, 0))]);

        tracker.apply_line(&dhcp_line("aa:bb:cc:dd:ee:01", at(8, 0)));

        assert_eq!(tracker.snapshot()[0].last_seen, at(12, 0));
    }

    #[test]
    fn non_dhcp_lines_are_ignored() {
        let tracker = tracker_with(vec![person(1, "aa:bb:cc:dd:ee:01", "ada", at(9, 0))]);

        let mut line = dhcp_line("aa:bb:cc:dd:ee:01", at(12, 0));
        line.tag = "sshd:".to_string();
        tracker.apply_line(&line);

        assert_eq!(tracker.snapshot()[0].last_seen, at(9, 0));
    }

    #[test]
    fn mac_match_is_case_sensitive_substring() {
        let tracker = tracker_with(vec![person(1, "aa:bb:cc:dd:ee:01", "ada", at(9, 0))]);

        tracker.apply_line(&dhcp_line("AA:BB:CC:DD:EE:01", at(12, 0)));

        assert_eq!(tracker.snapshot()[0].last_seen, at(9, 0));
    }

    #[test]
    fn most_recently_active_scans_for_max() {
        let tracker = tracker_with(vec![
            person(1, "aa:bb:cc:dd:ee:01", "ada", at(9, 0)),
            person(2, "aa:bb:cc:dd:ee:02", "brin", at(11, 0)),
            person(3, "aa:bb:cc:dd:ee:03", "cleo", at(10, 0)),
        ]);

        assert_eq!(tracker.most_recently_active().unwrap().name, "brin");
    }

    #[test]
    fn empty_roster_means_nobody_home() {
        let tracker = PresenceTracker::new();
        assert!(tracker.most_recently_active().is_none());
        assert!(!tracker.anybody_home(at(12, 0)));
    }

    #[test]
    fn anybody_home_follows_the_freshest_device() {
        let tracker = tracker_with(vec![
            person(1, "aa:bb:cc:dd:ee:01", "ada", at(9, 0)),
            person(2, "aa:bb:cc:dd:ee:02", "brin", at(11, 55)),
        ]);

        assert!(tracker.anybody_home(at(12, 0)));
        assert!(!tracker.anybody_home(at(13, 0)));
    }

    #[tokio::test]
    async fn load_roster_marks_everyone_just_seen() {
        let db_path =
            std::env::temp_dir().join(format!("hearth-roster-{}.sqlite3", uuid::Uuid::new_v4()));
        let store = Store::open(db_path.clone()).unwrap();
        store
            .execute(|conn| {
                crate::store::people::insert_person(conn, "aa:bb:cc:dd:ee:01", "ada")?;
                crate::store::people::insert_person(conn, "aa:bb:cc:dd:ee:02", "brin")?;
                Ok(())
            })
            .await
            .unwrap();

        let tracker = PresenceTracker::new();
        let count = tracker.load_roster(&store).await.unwrap();
        assert_eq!(count, 2);
        assert!(tracker.anybody_home(Utc::now()));

        drop(store);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("sqlite3-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("sqlite3-shm"));
    }
}
