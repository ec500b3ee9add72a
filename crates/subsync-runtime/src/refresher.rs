use std::sync::Arc;
use std::time::Duration;

use subsync_errors::{ClassifierTable, ErrorContext, ErrorKind};
use subsync_reconcile::MergeMode;
use subsync_vendor::VendorGateway;
use uuid::Uuid;

use crate::{ConsistencyController, CycleReport};

/// How one background refresh attempt ended. Logged, never surfaced to the
/// reader that triggered it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Committed(CycleReport),
    /// Nothing known locally, so nothing to ask the vendor about.
    Skipped,
    TimedOut,
    VendorFailed(ErrorKind),
    CommitFailed(String),
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::Committed(_) => "committed",
            RefreshOutcome::Skipped => "skipped",
            RefreshOutcome::TimedOut => "timed_out",
            RefreshOutcome::VendorFailed(_) => "vendor_failed",
            RefreshOutcome::CommitFailed(_) => "commit_failed",
        }
    }
}

/// One refresh attempt: a single deadline-bounded vendor call, then a
/// merge-only cycle. No retry inside an attempt.
#[derive(Clone)]
pub struct BackgroundRefresher {
    vendor: Arc<dyn VendorGateway>,
    controller: Arc<ConsistencyController>,
    classifier: Arc<ClassifierTable>,
    deadline: Duration,
}

impl BackgroundRefresher {
    pub fn new(
        vendor: Arc<dyn VendorGateway>,
        controller: Arc<ConsistencyController>,
        classifier: Arc<ClassifierTable>,
        deadline: Duration,
    ) -> Self {
        Self {
            vendor,
            controller,
            classifier,
            deadline,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn refresh_once(&self, owner_id: &str, public_ids: &[Uuid]) -> RefreshOutcome {
        if public_ids.is_empty() {
            return RefreshOutcome::Skipped;
        }

        let fetched = tokio::time::timeout(self.deadline, self.vendor.fetch(owner_id, public_ids)).await;
        let batch = match fetched {
            Err(_elapsed) => {
                tracing::warn!(
                    owner_id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "background refresh abandoned: vendor deadline exceeded"
                );
                return RefreshOutcome::TimedOut;
            }
            Ok(Err(failure)) => {
                let err = self
                    .classifier
                    .classify(&failure, &ErrorContext::for_customer(owner_id));
                tracing::warn!(
                    owner_id,
                    kind = err.kind.as_str(),
                    error = %failure,
                    "background refresh abandoned: vendor call failed"
                );
                return RefreshOutcome::VendorFailed(err.kind);
            }
            Ok(Ok(batch)) => batch,
        };

        match self
            .controller
            .run_cycle(owner_id, &batch.records, MergeMode::MergeOnly)
            .await
        {
            Ok(report) => RefreshOutcome::Committed(report),
            Err(e) => {
                tracing::error!(owner_id, error = %e, "background refresh commit failed");
                RefreshOutcome::CommitFailed(e.to_string())
            }
        }
    }
}
