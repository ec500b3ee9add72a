//! Request and response types for the subsync-daemon HTTP endpoints.
//!
//! Bodies are camelCase JSON. Balances leave the service as decimal strings;
//! internally they stay integer micros.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subsync_reconcile::vendor_adapter::VendorBatch;
use subsync_reconcile::{Subscription, VendorRecord, MICROS_SCALE};
use subsync_runtime::CycleReport;
use uuid::Uuid;

/// `25_500_000` -> `"25.50"`. At least two fractional digits, no float.
pub fn micros_to_decimal(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let scale = MICROS_SCALE as u64;
    let mut frac = format!("{:06}", abs % scale);
    while frac.len() > 2 && frac.ends_with('0') {
        frac.pop();
    }
    format!("{sign}{}.{frac}", abs / scale)
}

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub store: String,
    pub vendor: String,
    pub refreshes_in_flight: usize,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub public_id: Uuid,
    pub owner_id: String,
    pub offer_id: String,
    pub status: String,
    pub balance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vendor_status: Option<String>,
    pub vendor_balance: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub usage_count: Option<i32>,
    pub logo_url: Option<String>,
    pub brand: Option<String>,
}

impl From<&Subscription> for SubscriptionView {
    fn from(s: &Subscription) -> Self {
        Self {
            public_id: s.public_id,
            owner_id: s.owner_id.clone(),
            offer_id: s.offer_id.clone(),
            status: s.status.clone(),
            balance: micros_to_decimal(s.balance_micros),
            created_at: s.created_at,
            updated_at: s.updated_at,
            vendor_status: s.vendor.status.clone(),
            vendor_balance: s.vendor.balance_micros.map(micros_to_decimal),
            last_sync_time: s.vendor.last_sync_time,
            usage_count: s.vendor.usage_count,
            logo_url: s.vendor.logo_url.clone(),
            brand: s.vendor.brand.clone(),
        }
    }
}

/// GET /v1/subscriptions. The list is the local state at read time; a
/// refresh may already be running behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionListResponse {
    pub owner_id: String,
    pub count: usize,
    pub subscriptions: Vec<SubscriptionView>,
}

/// POST /v1/subscriptions/sync
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub report: CycleReport,
    pub subscriptions: Vec<SubscriptionView>,
}

// ---------------------------------------------------------------------------
// /v1/subscriptions/vendor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorRecordView {
    pub public_id: Uuid,
    pub vendor_status: Option<String>,
    pub vendor_balance: Option<String>,
    pub sync_timestamp: Option<DateTime<Utc>>,
    pub usage_count: Option<i32>,
    pub logo_url: Option<String>,
    pub brand: Option<String>,
    pub offer_id: Option<String>,
}

impl From<&VendorRecord> for VendorRecordView {
    fn from(r: &VendorRecord) -> Self {
        Self {
            public_id: r.public_id,
            vendor_status: r.vendor_status.clone(),
            vendor_balance: r.vendor_balance_micros.map(micros_to_decimal),
            sync_timestamp: r.sync_timestamp,
            usage_count: r.usage_count,
            logo_url: r.logo_url.clone(),
            brand: r.brand.clone(),
            offer_id: r.offer_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorFetchResponse {
    pub owner_id: String,
    pub source: String,
    pub subscriptions: Vec<VendorRecordView>,
    /// Entries the wire adapter dropped or degraded.
    pub issues: Vec<String>,
}

impl VendorFetchResponse {
    pub fn new(owner_id: &str, source: &str, batch: &VendorBatch) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            source: source.to_string(),
            subscriptions: batch.records.iter().map(VendorRecordView::from).collect(),
            issues: batch.issues.iter().map(|i| i.to_string()).collect(),
        }
    }
}
