use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u32},
    models::Location,
};

fn row_to_location(row: &Row) -> Result<Location> {
    let capacity: Option<i64> = row.get("capacity")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Location {
        id: row.get("id")?,
        label: row.get("label")?,
        capacity: capacity.map(|c| to_u32(c, "capacity")).transpose()?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

pub(crate) fn find_location(conn: &Connection, location_id: &str) -> Result<Option<Location>> {
    let mut stmt = conn.prepare(
        "SELECT id, label, capacity, created_at, updated_at
         FROM locations
         WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![location_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_location(row)?)),
        None => Ok(None),
    }
}

/// Inserts a location unless one with the same id exists. Existing labels win,
/// so operator renames survive a restart with the original config.
pub(crate) fn insert_location_if_missing(
    conn: &Connection,
    location_id: &str,
    label: &str,
    capacity: Option<u32>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO locations (id, label, capacity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![location_id, label, capacity, now.to_rfc3339()],
    )?;
    Ok(inserted > 0)
}

/// A configured location to make sure exists in the registry.
#[derive(Debug, Clone)]
pub struct LocationSeed {
    pub id: String,
    pub label: String,
    pub capacity: Option<u32>,
}

impl Database {
    /// Returns the number of locations that were newly created.
    pub async fn seed_locations(&self, seeds: Vec<LocationSeed>) -> Result<usize> {
        self.execute(move |conn| {
            let now = Utc::now();
            let tx = conn.transaction()?;
            let mut created = 0;
            for seed in &seeds {
                if insert_location_if_missing(&tx, &seed.id, &seed.label, seed.capacity, now)? {
                    created += 1;
                }
            }
            tx.commit()?;
            Ok(created)
        })
        .await
    }

    pub async fn get_location(&self, location_id: &str) -> Result<Option<Location>> {
        let location_id = location_id.to_string();
        self.execute(move |conn| find_location(conn, &location_id))
            .await
    }

    pub async fn list_locations(&self) -> Result<Vec<Location>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, label, capacity, created_at, updated_at
                 FROM locations
                 ORDER BY label ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut locations = Vec::new();
            while let Some(row) = rows.next()? {
                locations.push(row_to_location(row)?);
            }

            Ok(locations)
        })
        .await
    }

    /// Labels are the only mutable part of a location.
    pub async fn rename_location(&self, location_id: &str, label: String) -> Result<Location> {
        let location_id = location_id.to_string();
        let label = label.trim().to_string();
        if label.is_empty() {
            return Err(anyhow!("location label cannot be empty"));
        }

        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE locations SET label = ?1, updated_at = ?2 WHERE id = ?3",
                params![label, Utc::now().to_rfc3339(), location_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Location {location_id} not found"));
            }

            find_location(conn, &location_id)?
                .ok_or_else(|| anyhow!("Location not found after update"))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(id: &str, label: &str) -> LocationSeed {
        LocationSeed {
            id: id.to_string(),
            label: label.to_string(),
            capacity: None,
        }
    }

    #[tokio::test]
    async fn seeding_preserves_renamed_labels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("registry.sqlite3")).expect("open");

        let created = db
            .seed_locations(vec![seed("fs://loc/ams-1", "AMS Slot 1"), seed("fs://loc/dryer", "Dryer")])
            .await
            .expect("seed");
        assert_eq!(created, 2);

        db.rename_location("fs://loc/dryer", "Sunlu Dryer".into())
            .await
            .expect("rename");

        let created = db
            .seed_locations(vec![seed("fs://loc/dryer", "Dryer")])
            .await
            .expect("reseed");
        assert_eq!(created, 0);

        let dryer = db
            .get_location("fs://loc/dryer")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(dryer.label, "Sunlu Dryer");
    }

    #[tokio::test]
    async fn rename_unknown_location_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("registry.sqlite3")).expect("open");

        assert!(db.rename_location("fs://loc/nope", "X".into()).await.is_err());
        assert!(db.rename_location("fs://loc/nope", "   ".into()).await.is_err());
    }

    #[tokio::test]
    async fn lists_locations_by_label() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("registry.sqlite3")).expect("open");
        db.seed_locations(vec![
            LocationSeed {
                id: "fs://loc/tpu-c".into(),
                label: "TPU Dry Box C".into(),
                capacity: Some(4),
            },
            seed("fs://loc/ams-2", "AMS Slot 2"),
        ])
        .await
        .expect("seed");

        let locations = db.list_locations().await.expect("list");
        let labels: Vec<&str> = locations.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["AMS Slot 2", "TPU Dry Box C"]);
        assert_eq!(locations[1].capacity, Some(4));
    }
}
