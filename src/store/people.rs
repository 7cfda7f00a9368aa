//! Device roster: one row per person, keyed by the MAC of the phone that
//! announces them on the network.

use anyhow::Result;
use rusqlite::{params, Connection, Row};

use crate::store::Store;

#[derive(Debug, Clone)]
pub struct PersonRow {
    pub id: i64,
    pub mac: String,
    pub name: String,
}

fn row_to_person(row: &Row) -> Result<PersonRow, rusqlite::Error> {
    Ok(PersonRow {
        id: row.get("id")?,
        mac: row.get("mac")?,
        name: row.get("name")?,
    })
}

pub fn load_people(conn: &Connection) -> Result<Vec<PersonRow>> {
    let mut stmt = conn.prepare("SELECT id, mac, name FROM people ORDER BY id ASC")?;
    let people = stmt
        .query_map([], row_to_person)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(people)
}

pub fn insert_person(conn: &Connection, mac: &str, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO people (mac, name) VALUES (?1, ?2)",
        params![mac, name],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Store {
    pub async fn load_people(&self) -> Result<Vec<PersonRow>> {
        self.execute(|conn| load_people(conn)).await
    }
}
