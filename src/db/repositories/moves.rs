use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::{
    db::{
        connection::Database,
        helpers::parse_datetime,
        models::{MoveRecord, MoveSource},
    },
    error::RejectReason,
};

use super::{
    locations::{find_location, insert_location_if_missing},
    spools::{find_spool, insert_provisional_spool},
};

/// Whether a move may create the records it refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisioningPolicy {
    pub auto_create_spools: bool,
    pub auto_create_locations: bool,
}

impl ProvisioningPolicy {
    /// Operator-driven moves never invent records.
    pub fn strict() -> Self {
        Self::default()
    }
}

/// Result of a move transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveCommit {
    Applied(MoveRecord),
    /// Spool already sat at the target; nothing was written.
    Unchanged {
        spool_id: String,
        location_id: String,
    },
    Rejected(RejectReason),
}

fn row_to_move_record(row: &Row) -> Result<MoveRecord> {
    let at: String = row.get("at")?;
    let source: String = row.get("source")?;

    Ok(MoveRecord {
        id: row.get("id")?,
        spool_id: row.get("spool_id")?,
        from_location_id: row.get("from_location_id")?,
        to_location_id: row.get("to_location_id")?,
        at: parse_datetime(&at, "at")?,
        source: MoveSource::parse(&source)?,
    })
}

impl Database {
    /// Moves a spool in a single transaction. Any rejection rolls back provisional
    /// inserts made earlier in the same transaction, so the registry is untouched.
    pub async fn commit_move(
        &self,
        spool_id: &str,
        location_id: &str,
        at: DateTime<Utc>,
        source: MoveSource,
        policy: ProvisioningPolicy,
    ) -> Result<MoveCommit> {
        let spool_id = spool_id.to_string();
        let location_id = location_id.to_string();

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open move transaction")?;

            if find_location(&tx, &location_id)?.is_none() {
                if !policy.auto_create_locations {
                    return Ok(MoveCommit::Rejected(RejectReason::UnknownLocation(location_id)));
                }
                insert_location_if_missing(&tx, &location_id, &location_id, None, at)?;
            }

            let spool = match find_spool(&tx, &spool_id)? {
                Some(spool) => spool,
                None if policy.auto_create_spools => insert_provisional_spool(&tx, &spool_id, at)?,
                None => return Ok(MoveCommit::Rejected(RejectReason::UnknownSpool(spool_id))),
            };

            if spool.is_archived() {
                return Ok(MoveCommit::Rejected(RejectReason::ArchivedSpool(spool_id)));
            }

            if spool.current_location_id.as_deref() == Some(location_id.as_str()) {
                return Ok(MoveCommit::Unchanged {
                    spool_id,
                    location_id,
                });
            }

            let record = MoveRecord {
                id: Uuid::new_v4().to_string(),
                spool_id,
                from_location_id: spool.current_location_id,
                to_location_id: location_id,
                at,
                source,
            };

            tx.execute(
                "UPDATE spools
                 SET current_location_id = ?1,
                     last_moved_at = ?2,
                     updated_at = ?2
                 WHERE id = ?3",
                params![record.to_location_id, record.at.to_rfc3339(), record.spool_id],
            )?;
            tx.execute(
                "INSERT INTO move_records (id, spool_id, from_location_id, to_location_id, at, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.spool_id,
                    record.from_location_id,
                    record.to_location_id,
                    record.at.to_rfc3339(),
                    record.source.as_str(),
                ],
            )?;

            tx.commit().context("failed to commit move")?;
            Ok(MoveCommit::Applied(record))
        })
        .await
    }

    /// Most recent first.
    pub async fn move_history(&self, spool_id: &str, limit: usize) -> Result<Vec<MoveRecord>> {
        let spool_id = spool_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, spool_id, from_location_id, to_location_id, at, source
                 FROM move_records
                 WHERE spool_id = ?1
                 ORDER BY at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![spool_id, limit])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_move_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    #[cfg(test)]
    pub async fn count_moves(&self, spool_id: &str) -> Result<u64> {
        let spool_id = spool_id.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM move_records WHERE spool_id = ?1",
                params![spool_id],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }
}
