use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use subsync_db::{StoreTx, SubscriptionStore};
use subsync_reconcile::{
    merge, IsolationMode, LocalSnapshot, MergeAnomaly, MergeMode, MergeOutcome, VendorRecord,
};
use uuid::Uuid;

use crate::SyncError;

/// Result of one committed reconciliation cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub owner_id: String,
    pub mode: MergeMode,
    pub isolation: IsolationMode,
    pub updated: usize,
    pub created: usize,
    pub duplicates: usize,
    pub unknown: usize,
    pub invalid: usize,
}

impl CycleReport {
    fn from_outcome(owner_id: &str, mode: MergeMode, isolation: IsolationMode, o: &MergeOutcome) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            mode,
            isolation,
            updated: o.updates.len(),
            created: o.creates.len(),
            duplicates: o.duplicate_count(),
            unknown: o.unknown_count(),
            invalid: o.invalid_count(),
        }
    }
}

/// Applies the engine's partition to the store, one owner scope per cycle.
///
/// Within a cycle: snapshot read, merge, writes and commit run inside one
/// store transaction. Any write failure rolls the whole cycle back; chunking
/// of creates is never visible from outside.
pub struct ConsistencyController {
    store: Arc<dyn SubscriptionStore>,
    isolation: IsolationMode,
    chunk_size: usize,
}

impl ConsistencyController {
    pub fn new(store: Arc<dyn SubscriptionStore>, isolation: IsolationMode, chunk_size: usize) -> Self {
        Self {
            store,
            isolation,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    pub fn isolation(&self) -> IsolationMode {
        self.isolation
    }

    pub async fn run_cycle(
        &self,
        owner_id: &str,
        batch: &[VendorRecord],
        mode: MergeMode,
    ) -> Result<CycleReport, SyncError> {
        self.run_cycle_at(owner_id, batch, mode, Utc::now()).await
    }

    /// [`Self::run_cycle`] with an explicit merge time.
    pub async fn run_cycle_at(
        &self,
        owner_id: &str,
        batch: &[VendorRecord],
        mode: MergeMode,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, SyncError> {
        if owner_id.trim().is_empty() {
            return Err(SyncError::BlankOwner);
        }

        let mut tx = self.store.begin(owner_id, self.isolation).await?;
        match self.stage(tx.as_mut(), batch, mode, now).await {
            Ok(report) => {
                tx.commit().await?;
                tracing::info!(
                    owner_id,
                    mode = mode.as_str(),
                    isolation = self.isolation.as_str(),
                    updated = report.updated,
                    created = report.created,
                    duplicates = report.duplicates,
                    unknown = report.unknown,
                    invalid = report.invalid,
                    "reconcile cycle committed"
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(owner_id, error = %rb, "rollback after failed cycle also failed");
                }
                tracing::warn!(owner_id, mode = mode.as_str(), error = %e, "reconcile cycle aborted");
                Err(e)
            }
        }
    }

    async fn stage(
        &self,
        tx: &mut dyn StoreTx,
        batch: &[VendorRecord],
        mode: MergeMode,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, SyncError> {
        let owner_id = tx.owner_id().to_string();
        let ids: Vec<Uuid> = batch
            .iter()
            .map(|r| r.public_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let local = if ids.is_empty() {
            Vec::new()
        } else {
            tx.find_by_owner_and_ids(&ids).await?
        };
        let snapshot = LocalSnapshot::from_records(owner_id.as_str(), local);
        let outcome = merge(&snapshot, batch, mode, now);
        log_anomalies(&owner_id, &outcome.anomalies);

        if !outcome.updates.is_empty() {
            tx.apply_updates(&outcome.updates).await?;
        }
        for chunk in outcome.creates.chunks(self.chunk_size) {
            tx.insert_chunk(chunk).await?;
        }

        Ok(CycleReport::from_outcome(&owner_id, mode, self.isolation, &outcome))
    }
}

fn log_anomalies(owner_id: &str, anomalies: &[MergeAnomaly]) {
    for a in anomalies {
        match a {
            MergeAnomaly::DuplicatePublicId { public_id } => {
                tracing::debug!(owner_id, %public_id, "duplicate vendor record dropped")
            }
            MergeAnomaly::UnknownPublicId { public_id } => {
                tracing::warn!(owner_id, %public_id, "vendor record for unknown public id dropped")
            }
            MergeAnomaly::ForeignOwner {
                public_id,
                owner_id: actual,
            } => tracing::warn!(owner_id, %public_id, actual_owner = %actual, "vendor record belongs to another owner"),
            MergeAnomaly::InvalidRecord { public_id, reason } => tracing::warn!(
                owner_id,
                %public_id,
                reason = reason.as_str(),
                "invalid vendor record excluded"
            ),
        }
    }
}
