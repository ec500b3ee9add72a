use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::clock::next_updated_at;
use crate::{
    InvalidReason, LocalSnapshot, MergeAnomaly, MergeMode, MergeOutcome, Subscription,
    VendorFields, VendorRecord,
};

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Required for any merge: status and balance.
fn check_required(rec: &VendorRecord) -> Result<(String, i64), InvalidReason> {
    let status = non_blank(&rec.vendor_status).ok_or(InvalidReason::MissingStatus)?;
    let balance = rec
        .vendor_balance_micros
        .ok_or(InvalidReason::MissingBalance)?;
    Ok((status.to_string(), balance))
}

/// Merge vendor-sourced fields of `rec` into `fields`.
///
/// Status and balance always overwrite. Optional fields overwrite only when
/// the vendor supplied them; `last_sync_time` falls back to `now` on a
/// record that has never been synced.
pub fn apply_vendor_fields(
    fields: &mut VendorFields,
    rec: &VendorRecord,
    status: String,
    balance_micros: i64,
    now: DateTime<Utc>,
) {
    fields.status = Some(status);
    fields.balance_micros = Some(balance_micros);

    if let Some(ts) = rec.sync_timestamp {
        fields.last_sync_time = Some(ts);
    } else if fields.last_sync_time.is_none() {
        fields.last_sync_time = Some(now);
    }
    if let Some(n) = rec.usage_count {
        fields.usage_count = Some(n);
    }
    if let Some(url) = non_blank(&rec.logo_url) {
        fields.logo_url = Some(url.to_string());
    }
    if let Some(b) = non_blank(&rec.brand) {
        fields.brand = Some(b.to_string());
    }
}

/// Build a brand-new local record from a vendor record (full-sync only).
pub fn materialize(
    rec: &VendorRecord,
    owner_id: &str,
    now: DateTime<Utc>,
) -> Result<Subscription, InvalidReason> {
    let (status, balance) = check_required(rec)?;
    let offer_id = non_blank(&rec.offer_id).ok_or(InvalidReason::MissingOfferId)?;

    let created_at = rec.sync_timestamp.unwrap_or(now);
    let mut sub = Subscription::new(
        rec.public_id,
        owner_id,
        offer_id,
        status.clone(),
        balance,
        created_at,
    );
    sub.updated_at = now;
    apply_vendor_fields(&mut sub.vendor, rec, status, balance, now);
    Ok(sub)
}

/// Deterministic merge of one vendor batch into one owner snapshot.
///
/// - The batch is walked in order; the first occurrence of a `public_id`
///   wins, including when that first occurrence turns out to be invalid.
/// - A matching local record is copied, vendor fields are merged, and
///   `updated_at` is advanced through the monotonic guard.
/// - A vendor-only id is dropped in [`MergeMode::MergeOnly`] and
///   materialized in [`MergeMode::FullSync`].
/// - Local records the vendor did not mention are left out of the outcome.
///
/// Never fails: everything that cannot be written becomes a [`MergeAnomaly`].
pub fn merge(
    local: &LocalSnapshot,
    batch: &[VendorRecord],
    mode: MergeMode,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let mut out = MergeOutcome::default();
    let mut seen = BTreeSet::new();

    for rec in batch {
        if !seen.insert(rec.public_id) {
            out.anomalies.push(MergeAnomaly::DuplicatePublicId {
                public_id: rec.public_id,
            });
            continue;
        }

        match local.records.get(&rec.public_id) {
            Some(existing) if existing.owner_id != local.owner_id => {
                out.anomalies.push(MergeAnomaly::ForeignOwner {
                    public_id: rec.public_id,
                    owner_id: existing.owner_id.clone(),
                });
            }
            Some(existing) => match check_required(rec) {
                Ok((status, balance)) => {
                    let mut merged = existing.clone();
                    apply_vendor_fields(&mut merged.vendor, rec, status, balance, now);
                    merged.updated_at = next_updated_at(existing.updated_at, now);
                    out.updates.push(merged);
                }
                Err(reason) => out.anomalies.push(MergeAnomaly::InvalidRecord {
                    public_id: rec.public_id,
                    reason,
                }),
            },
            None => match mode {
                MergeMode::MergeOnly => {
                    out.anomalies.push(MergeAnomaly::UnknownPublicId {
                        public_id: rec.public_id,
                    });
                }
                MergeMode::FullSync => match materialize(rec, &local.owner_id, now) {
                    Ok(sub) => out.creates.push(sub),
                    Err(reason) => out.anomalies.push(MergeAnomaly::InvalidRecord {
                        public_id: rec.public_id,
                        reason,
                    }),
                },
            },
        }
    }

    out
}
