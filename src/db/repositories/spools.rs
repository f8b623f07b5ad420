use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, validate_weight},
    models::{guess_spool_name, Spool, SpoolInput, WeightRecord},
};

const SPOOL_COLUMNS: &str = "id, name, material, color, current_location_id, weight_grams,
     provisional, last_moved_at, archived_at, created_at, updated_at";

fn row_to_spool(row: &Row) -> Result<Spool> {
    let provisional: i64 = row.get("provisional")?;
    let last_moved_at: Option<String> = row.get("last_moved_at")?;
    let archived_at: Option<String> = row.get("archived_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Spool {
        id: row.get("id")?,
        name: row.get("name")?,
        material: row.get("material")?,
        color: row.get("color")?,
        current_location_id: row.get("current_location_id")?,
        weight_grams: row.get("weight_grams")?,
        provisional: provisional != 0,
        last_moved_at: parse_optional_datetime(last_moved_at, "last_moved_at")?,
        archived_at: parse_optional_datetime(archived_at, "archived_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn row_to_weight_record(row: &Row) -> Result<WeightRecord> {
    let at: String = row.get("at")?;
    Ok(WeightRecord {
        id: row.get("id")?,
        spool_id: row.get("spool_id")?,
        weight_grams: row.get("weight_grams")?,
        at: parse_datetime(&at, "at")?,
    })
}

pub(crate) fn find_spool(conn: &Connection, spool_id: &str) -> Result<Option<Spool>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SPOOL_COLUMNS} FROM spools WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![spool_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_spool(row)?)),
        None => Ok(None),
    }
}

/// Creates the placeholder record for a spool first seen through a scan.
pub(crate) fn insert_provisional_spool(
    conn: &Connection,
    spool_id: &str,
    now: DateTime<Utc>,
) -> Result<Spool> {
    conn.execute(
        "INSERT INTO spools (id, name, provisional, created_at, updated_at)
         VALUES (?1, ?2, 1, ?3, ?3)",
        params![spool_id, guess_spool_name(spool_id), now.to_rfc3339()],
    )
    .with_context(|| format!("failed to create provisional spool {spool_id}"))?;

    find_spool(conn, spool_id)?.ok_or_else(|| anyhow!("Spool not found after insert"))
}

impl Database {
    pub async fn get_spool(&self, spool_id: &str) -> Result<Option<Spool>> {
        let spool_id = spool_id.to_string();
        self.execute(move |conn| find_spool(conn, &spool_id)).await
    }

    /// Returns the spool for a scanned code, creating a provisional record the first
    /// time the code is seen. The flag is true when the record was just created.
    pub async fn ensure_spool(&self, spool_id: &str, now: DateTime<Utc>) -> Result<(Spool, bool)> {
        let spool_id = spool_id.to_string();
        self.execute(move |conn| match find_spool(conn, &spool_id)? {
            Some(spool) => Ok((spool, false)),
            None => Ok((insert_provisional_spool(conn, &spool_id, now)?, true)),
        })
        .await
    }

    /// Spools currently stored at a location, archived ones excluded.
    pub async fn list_spools_at(&self, location_id: &str) -> Result<Vec<Spool>> {
        let location_id = location_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SPOOL_COLUMNS} FROM spools
                 WHERE current_location_id = ?1 AND archived_at IS NULL
                 ORDER BY id ASC"
            ))?;

            let mut rows = stmt.query(params![location_id])?;
            let mut spools = Vec::new();
            while let Some(row) = rows.next()? {
                spools.push(row_to_spool(row)?);
            }
            Ok(spools)
        })
        .await
    }

    /// Creates or updates a spool from operator input. Supplied fields overwrite,
    /// missing ones are kept, and the record stops being provisional.
    pub async fn register_spool(&self, input: SpoolInput) -> Result<Spool> {
        let spool_id = input.id.trim().to_string();
        if spool_id.is_empty() {
            bail!("spool id cannot be empty");
        }

        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO spools (id, name, material, color, provisional, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     name = COALESCE(excluded.name, spools.name),
                     material = COALESCE(excluded.material, spools.material),
                     color = COALESCE(excluded.color, spools.color),
                     provisional = 0,
                     updated_at = excluded.updated_at",
                params![spool_id, input.name, input.material, input.color, now],
            )?;

            find_spool(conn, &spool_id)?.ok_or_else(|| anyhow!("Spool not found after upsert"))
        })
        .await
    }

    /// Records a weighing: updates the spool and appends to the weight log atomically.
    pub async fn set_spool_weight(
        &self,
        spool_id: &str,
        weight_grams: f64,
        at: DateTime<Utc>,
    ) -> Result<WeightRecord> {
        let weight_grams = validate_weight(weight_grams)?;
        let spool_id = spool_id.to_string();

        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let spool = find_spool(&tx, &spool_id)?
                .ok_or_else(|| anyhow!("Spool {spool_id} not found"))?;
            if spool.is_archived() {
                bail!("Spool {spool_id} is archived");
            }

            tx.execute(
                "UPDATE spools SET weight_grams = ?1, updated_at = ?2 WHERE id = ?3",
                params![weight_grams, at.to_rfc3339(), spool_id],
            )?;

            let record = WeightRecord {
                id: Uuid::new_v4().to_string(),
                spool_id,
                weight_grams,
                at,
            };
            tx.execute(
                "INSERT INTO weight_records (id, spool_id, weight_grams, at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record.id, record.spool_id, record.weight_grams, record.at.to_rfc3339()],
            )?;

            tx.commit().context("failed to commit weight update")?;
            Ok(record)
        })
        .await
    }

    pub async fn weight_history(&self, spool_id: &str) -> Result<Vec<WeightRecord>> {
        let spool_id = spool_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, spool_id, weight_grams, at
                 FROM weight_records
                 WHERE spool_id = ?1
                 ORDER BY at ASC",
            )?;
            let mut rows = stmt.query(params![spool_id])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_weight_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// Spools are never deleted; archiving hides them from moves and listings.
    pub async fn archive_spool(&self, spool_id: &str) -> Result<Spool> {
        let spool_id = spool_id.to_string();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let rows_affected = conn.execute(
                "UPDATE spools
                 SET archived_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND archived_at IS NULL",
                params![now, spool_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Spool {spool_id} not found or already archived"));
            }

            find_spool(conn, &spool_id)?.ok_or_else(|| anyhow!("Spool not found after archive"))
        })
        .await
    }
}
