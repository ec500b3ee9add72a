use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Micros scale (1e-6) used for balances.
pub const MICROS_SCALE: i64 = 1_000_000;

/// Fields owned by the vendor. Written only by the reconciliation path.
///
/// All of them stay `None` until the first successful sync.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorFields {
    pub status: Option<String>,
    pub balance_micros: Option<i64>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub usage_count: Option<i32>,
    pub logo_url: Option<String>,
    pub brand: Option<String>,
}

/// Persisted subscription record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Assigned by the store; `None` for a record that has not been written yet.
    pub storage_id: Option<i64>,
    /// Stable public identifier, unique across the whole store. Join key
    /// against vendor data.
    pub public_id: Uuid,
    pub owner_id: String,
    pub offer_id: String,
    pub status: String,
    pub balance_micros: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vendor: VendorFields,
}

impl Subscription {
    /// A never-synced record as created by its owner.
    pub fn new(
        public_id: Uuid,
        owner_id: impl Into<String>,
        offer_id: impl Into<String>,
        status: impl Into<String>,
        balance_micros: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            storage_id: None,
            public_id,
            owner_id: owner_id.into(),
            offer_id: offer_id.into(),
            status: status.into(),
            balance_micros,
            created_at,
            updated_at: created_at,
            vendor: VendorFields::default(),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.vendor.last_sync_time.is_some()
    }
}

/// One record as reported by the vendor. Transient: consumed by [`crate::merge`]
/// and discarded afterwards.
///
/// `vendor_status` and `vendor_balance_micros` are required for any merge;
/// `offer_id` is additionally required to materialize a new local record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRecord {
    pub public_id: Uuid,
    pub vendor_status: Option<String>,
    pub vendor_balance_micros: Option<i64>,
    pub sync_timestamp: Option<DateTime<Utc>>,
    pub usage_count: Option<i32>,
    pub logo_url: Option<String>,
    pub brand: Option<String>,
    pub offer_id: Option<String>,
}

impl VendorRecord {
    /// Minimal well-formed record: status + balance, everything else absent.
    pub fn new(public_id: Uuid, vendor_status: impl Into<String>, vendor_balance_micros: i64) -> Self {
        Self {
            public_id,
            vendor_status: Some(vendor_status.into()),
            vendor_balance_micros: Some(vendor_balance_micros),
            sync_timestamp: None,
            usage_count: None,
            logo_url: None,
            brand: None,
            offer_id: None,
        }
    }
}

/// Local records for one owner scope, keyed by `public_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub owner_id: String,
    pub records: BTreeMap<Uuid, Subscription>,
}

impl LocalSnapshot {
    pub fn empty(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn from_records(owner_id: impl Into<String>, records: Vec<Subscription>) -> Self {
        let mut snap = Self::empty(owner_id);
        for r in records {
            snap.records.insert(r.public_id, r);
        }
        snap
    }

    pub fn known_public_ids(&self) -> Vec<Uuid> {
        self.records.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fold a merge outcome back into the snapshot (updates replace, creates
    /// insert). This is what a successful commit makes visible.
    pub fn apply(&mut self, outcome: &MergeOutcome) {
        for u in &outcome.updates {
            self.records.insert(u.public_id, u.clone());
        }
        for c in &outcome.creates {
            self.records.insert(c.public_id, c.clone());
        }
    }
}

/// How vendor-only ids are treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Update existing records only; vendor-only ids are dropped.
    MergeOnly,
    /// Also materialize local records for vendor-only ids.
    FullSync,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::MergeOnly => "merge_only",
            MergeMode::FullSync => "full_sync",
        }
    }
}

/// Commit isolation for one reconciliation cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// Atomic commit; the snapshot read runs at the store's default isolation.
    BestEffort,
    /// Atomic commit; read and write share one serializable transaction holding
    /// a per-owner lock.
    #[default]
    SerializableSnapshot,
}

impl IsolationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationMode::BestEffort => "best_effort",
            IsolationMode::SerializableSnapshot => "serializable_snapshot",
        }
    }
}

/// Why a vendor record was excluded from the write set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InvalidReason {
    MissingStatus,
    MissingBalance,
    MissingOfferId,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::MissingStatus => "missing_status",
            InvalidReason::MissingBalance => "missing_balance",
            InvalidReason::MissingOfferId => "missing_offer_id",
        }
    }
}

/// Non-fatal observations made during a merge. Reported, never raised.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MergeAnomaly {
    /// A later occurrence of an id already processed in this batch.
    DuplicatePublicId { public_id: Uuid },
    /// Vendor id absent from the local snapshot in merge-only mode.
    UnknownPublicId { public_id: Uuid },
    /// Snapshot entry keyed under this id belongs to a different owner.
    ForeignOwner { public_id: Uuid, owner_id: String },
    InvalidRecord { public_id: Uuid, reason: InvalidReason },
}

/// Partition produced by [`crate::merge`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub updates: Vec<Subscription>,
    pub creates: Vec<Subscription>,
    pub anomalies: Vec<MergeAnomaly>,
}

impl MergeOutcome {
    /// Nothing to write.
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty() && self.creates.is_empty()
    }

    pub fn duplicate_count(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| matches!(a, MergeAnomaly::DuplicatePublicId { .. }))
            .count()
    }

    pub fn unknown_count(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| {
                matches!(
                    a,
                    MergeAnomaly::UnknownPublicId { .. } | MergeAnomaly::ForeignOwner { .. }
                )
            })
            .count()
    }

    pub fn invalid_count(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| matches!(a, MergeAnomaly::InvalidRecord { .. }))
            .count()
    }
}
