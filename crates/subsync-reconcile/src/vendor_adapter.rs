//! Vendor adapter: deserialize the vendor wire format and normalize to
//! [`VendorRecord`].
//!
//! # Purpose
//! The vendor returns subscription data in its own JSON schema, with every
//! field optional and balances as either JSON numbers or decimal strings.
//! This module mirrors that schema in `Raw*` structs and converts it into the
//! internal [`VendorRecord`] consumed by the merge engine.
//!
//! # Design constraints
//! - Pure, deterministic conversion. No IO, no async.
//! - Balances are converted to integer micros without floating point.
//! - Entries without a usable `publicId` cannot be joined against anything;
//!   they are dropped here and reported as [`AdapterIssue`]s.
//! - A balance that cannot be parsed becomes `None`; the engine then flags
//!   the record as invalid. Nothing malformed is propagated as a value.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{VendorRecord, MICROS_SCALE};

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Problems found while normalizing a vendor batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterIssue {
    /// Entry at `index` has no `publicId`; dropped.
    MissingPublicId { index: usize },
    /// Entry at `index` has a `publicId` that is not a UUID; dropped.
    InvalidPublicId { index: usize, raw: String },
    /// Balance could not be converted to micros; record kept with no balance.
    UnparsableBalance { public_id: Uuid, raw: String },
    /// Sync timestamp could not be parsed; record kept with no timestamp.
    UnparsableTimestamp { public_id: Uuid, raw: String },
}

impl std::fmt::Display for AdapterIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPublicId { index } => {
                write!(f, "vendor entry #{index} has no publicId")
            }
            Self::InvalidPublicId { index, raw } => {
                write!(f, "vendor entry #{index} has non-uuid publicId '{raw}'")
            }
            Self::UnparsableBalance { public_id, raw } => {
                write!(f, "vendor record '{public_id}' has unparsable balance '{raw}'")
            }
            Self::UnparsableTimestamp { public_id, raw } => {
                write!(f, "vendor record '{public_id}' has unparsable timestamp '{raw}'")
            }
        }
    }
}

/// Decimal-to-micros conversion failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    Empty,
    Invalid(String),
    TooManyDecimalPlaces(String),
}

impl std::fmt::Display for DecimalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty decimal"),
            Self::Invalid(raw) => write!(f, "invalid decimal '{raw}'"),
            Self::TooManyDecimalPlaces(raw) => {
                write!(f, "decimal '{raw}' has more than 6 decimal places")
            }
        }
    }
}

impl std::error::Error for DecimalError {}

// ---------------------------------------------------------------------------
// Raw wire-level structs
// ---------------------------------------------------------------------------

/// One entry of the vendor subscription list. Unknown fields are ignored.
///
/// Older vendor builds send `lastSyncTime` / `urlLogo`; both spellings are
/// accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVendorRecord {
    pub public_id: Option<String>,
    pub vendor_status: Option<String>,
    /// JSON number or decimal string.
    pub vendor_balance: Option<Value>,
    /// RFC 3339, or a zone-less local timestamp taken as UTC.
    #[serde(alias = "lastSyncTime")]
    pub sync_timestamp: Option<String>,
    pub usage_count: Option<i32>,
    #[serde(alias = "urlLogo")]
    pub logo_url: Option<String>,
    pub brand: Option<String>,
    pub offer_id: Option<String>,
}

/// Top-level vendor response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVendorBatch {
    #[serde(default)]
    pub subscriptions: Vec<RawVendorRecord>,
    pub total: Option<i64>,
    pub message: Option<String>,
}

/// Normalized batch plus everything that was dropped or degraded on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorBatch {
    /// Records in vendor order. May still contain duplicates; dedup is the
    /// engine's job.
    pub records: Vec<VendorRecord>,
    pub issues: Vec<AdapterIssue>,
}

// ---------------------------------------------------------------------------
// Decimal conversion
// ---------------------------------------------------------------------------

/// Convert a decimal string to integer micros deterministically.
///
/// Accepts an optional sign and an optional fractional part of at most six
/// digits. No floating point at any stage.
pub fn decimal_to_micros(s: &str) -> Result<i64, DecimalError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DecimalError::Empty);
    }
    let invalid = || DecimalError::Invalid(s.to_string());

    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }
    if frac_part.len() > 6 {
        return Err(DecimalError::TooManyDecimalPlaces(s.to_string()));
    }

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| invalid())?
    };
    let frac_val: i64 = format!("{frac_part:0<6}").parse().map_err(|_| invalid())?;

    let micros = int_val
        .checked_mul(MICROS_SCALE)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(invalid)?;

    Ok(if negative { -micros } else { micros })
}

fn balance_to_micros(v: &Value) -> Result<i64, String> {
    match v {
        Value::String(s) => decimal_to_micros(s).map_err(|_| s.clone()),
        Value::Number(n) => decimal_to_micros(&n.to_string()).map_err(|_| n.to_string()),
        other => Err(other.to_string()),
    }
}

/// RFC 3339 first; a zone-less timestamp is read as UTC.
pub fn parse_vendor_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let t = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|n| n.and_utc())
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn normalize_record(
    index: usize,
    raw: RawVendorRecord,
    issues: &mut Vec<AdapterIssue>,
) -> Option<VendorRecord> {
    let raw_id = match raw.public_id.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => {
            issues.push(AdapterIssue::MissingPublicId { index });
            return None;
        }
    };
    let public_id = match Uuid::parse_str(&raw_id) {
        Ok(u) => u,
        Err(_) => {
            issues.push(AdapterIssue::InvalidPublicId { index, raw: raw_id });
            return None;
        }
    };

    let vendor_balance_micros = match raw.vendor_balance.as_ref() {
        None | Some(Value::Null) => None,
        Some(v) => match balance_to_micros(v) {
            Ok(m) => Some(m),
            Err(raw) => {
                issues.push(AdapterIssue::UnparsableBalance { public_id, raw });
                None
            }
        },
    };

    let sync_timestamp = match raw.sync_timestamp.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(ts) => {
            let parsed = parse_vendor_timestamp(ts);
            if parsed.is_none() {
                issues.push(AdapterIssue::UnparsableTimestamp {
                    public_id,
                    raw: ts.to_string(),
                });
            }
            parsed
        }
    };

    Some(VendorRecord {
        public_id,
        vendor_status: raw.vendor_status.map(|s| s.trim().to_string()),
        vendor_balance_micros,
        sync_timestamp,
        usage_count: raw.usage_count,
        logo_url: raw.logo_url,
        brand: raw.brand,
        offer_id: raw.offer_id.map(|s| s.trim().to_string()),
    })
}

/// Normalize a raw batch, keeping vendor order.
pub fn normalize(raw: RawVendorBatch) -> VendorBatch {
    let mut batch = VendorBatch::default();
    for (index, r) in raw.subscriptions.into_iter().enumerate() {
        if let Some(rec) = normalize_record(index, r, &mut batch.issues) {
            batch.records.push(rec);
        }
    }
    batch
}

/// Deserialize a vendor response body and normalize it.
pub fn normalize_json(json: &str) -> Result<VendorBatch, serde_json::Error> {
    let raw: RawVendorBatch = serde_json::from_str(json)?;
    Ok(normalize(raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
