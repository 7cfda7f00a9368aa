//! Parsing for classic BSD-format syslog lines:
//! `Mmm dd hh:mm:ss host tag message...`
//!
//! The stamp carries no year and is written in the host's local time, so we
//! infer the year from "now" and convert to UTC. A stamp that lands more
//! than a day in the future is taken to be from last year (log written in
//! December, read in January).

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Utc};

/// Tag the DHCP daemon logs under. Lines with any other tag are ignored.
pub const DHCP_TAG: &str = "dhcpd:";

#[derive(Debug, Clone, PartialEq)]
pub struct SyslogLine {
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub tag: String,
    pub message: String,
}

/// Parse one syslog line. Returns `None` for anything malformed: fewer than
/// five whitespace-separated fields, or a stamp that cannot be built as a
/// local time in either the current year or the previous one. Malformed
/// lines are dropped, never an error.
pub fn parse_line(line: &str, now: DateTime<Utc>) -> Option<SyslogLine> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return None;
    }

    let timestamp = stamp_in(&Local, fields[0], fields[1], fields[2], now)?;

    Some(SyslogLine {
        timestamp,
        host: fields[3].to_string(),
        tag: fields[4].to_string(),
        message: fields[5..].join(" "),
    })
}

fn month_number(name: &str) -> Option<u32> {
    let number = match name {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    Some(number)
}

fn stamp_in<Tz: TimeZone>(
    tz: &Tz,
    month: &str,
    day: &str,
    time: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let month = month_number(month)?;
    let day = day.parse::<u32>().ok()?;

    let mut parts = time.split(':');
    let (hour, min, sec) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(s), None) => (
            h.parse::<u32>().ok()?,
            m.parse::<u32>().ok()?,
            s.parse::<u32>().ok()?,
        ),
        _ => return None,
    };

    let year = now.with_timezone(tz).year();
    let build = |year: i32| {
        tz.with_ymd_and_hms(year, month, day, hour, min, sec)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    };

    match build(year) {
        // A stamp slightly ahead of our clock is skew, not time travel.
        Some(ts) if ts <= now + Duration::days(1) => Some(ts),
        // Too far ahead, or no such local time this year (Feb 29, DST
        // gap): last year.
        Some(_) | None => build(year - 1),
    }
}
