use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::{
    db::{Database, MoveCommit, MoveRecord, MoveSource, ProvisioningPolicy, Spool},
    error::MoveError,
    pairing::MoveIntent,
};

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Applied(MoveRecord),
    /// The spool was already there; no audit entry written.
    Unchanged {
        spool_id: String,
        location_id: String,
    },
}

/// Validates move intents against the registry and commits them.
#[derive(Clone)]
pub struct MoveApplier {
    db: Database,
    policy: ProvisioningPolicy,
}

impl MoveApplier {
    pub fn new(db: Database, policy: ProvisioningPolicy) -> Self {
        Self { db, policy }
    }

    /// Commits a quick-pair move. Called once per intent; never retried here.
    pub async fn apply(&self, intent: &MoveIntent) -> Result<MoveOutcome, MoveError> {
        let result = self
            .commit(
                &intent.spool_id,
                &intent.location_id,
                intent.captured_at,
                MoveSource::QuickPair,
                self.policy,
            )
            .await;
        debug!(
            "Quick-pair commit for {} settled {:?} after the pairing scan",
            intent.spool_id,
            intent.triggered_at.elapsed()
        );
        result
    }

    /// Registers a spool the first time its code is scanned, when spools may be
    /// auto-created. Returns `None` when the policy forbids it.
    pub async fn provision_scanned_spool(
        &self,
        spool_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Spool>> {
        if !self.policy.auto_create_spools {
            return Ok(None);
        }

        let (spool, created) = self.db.ensure_spool(spool_id, at).await?;
        if created {
            info!("Registered new spool {} as {}", spool.id, spool.display_name());
        }
        Ok(Some(spool))
    }

    /// Operator-chosen location. Both records must already exist.
    pub async fn apply_manual(
        &self,
        spool_id: &str,
        location_id: &str,
    ) -> Result<MoveOutcome, MoveError> {
        self.commit(
            spool_id,
            location_id,
            Utc::now(),
            MoveSource::Manual,
            ProvisioningPolicy::strict(),
        )
        .await
    }

    async fn commit(
        &self,
        spool_id: &str,
        location_id: &str,
        at: DateTime<Utc>,
        source: MoveSource,
        policy: ProvisioningPolicy,
    ) -> Result<MoveOutcome, MoveError> {
        match self
            .db
            .commit_move(spool_id, location_id, at, source, policy)
            .await?
        {
            MoveCommit::Applied(record) => {
                info!(
                    "Moved {} from {} to {} ({})",
                    record.spool_id,
                    record.from_location_id.as_deref().unwrap_or("nowhere"),
                    record.to_location_id,
                    record.source.as_str()
                );
                Ok(MoveOutcome::Applied(record))
            }
            MoveCommit::Unchanged {
                spool_id,
                location_id,
            } => {
                info!("{spool_id} already at {location_id}; nothing to record");
                Ok(MoveOutcome::Unchanged {
                    spool_id,
                    location_id,
                })
            }
            MoveCommit::Rejected(reason) => {
                warn!("Move of {spool_id} to {location_id} rejected: {reason}");
                Err(MoveError::Rejected(reason))
            }
        }
    }
}
