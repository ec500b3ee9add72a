use subsync_reconcile::{IsolationMode, Subscription};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Uniqueness violation, serialization failure, or an update whose row
    /// vanished. The whole cycle must be treated as not applied.
    #[error("store conflict: {detail}")]
    Conflict {
        public_id: Option<Uuid>,
        detail: String,
    },
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn conflict(public_id: Option<Uuid>, detail: impl Into<String>) -> Self {
        StoreError::Conflict {
            public_id,
            detail: detail.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Persistent home of [`Subscription`] records.
///
/// `public_id` is unique across the whole store, not per owner.
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>, StoreError>;

    async fn find_by_owner_and_ids(
        &self,
        owner_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Owner-initiated create. Vendor-sourced fields are not written here.
    async fn insert(&self, sub: &Subscription) -> Result<Subscription, StoreError>;

    /// Open a transaction scoped to `owner_id`.
    async fn begin(
        &self,
        owner_id: &str,
        mode: IsolationMode,
    ) -> Result<Box<dyn StoreTx>, StoreError>;

    /// One-shot `commit(owner, updates, creates)`: everything or nothing.
    async fn commit(
        &self,
        owner_id: &str,
        updates: &[Subscription],
        creates: &[Subscription],
    ) -> Result<(), StoreError> {
        let mut tx = self.begin(owner_id, IsolationMode::BestEffort).await?;
        let written = async {
            tx.apply_updates(updates).await?;
            if !creates.is_empty() {
                tx.insert_chunk(creates).await?;
            }
            Ok::<_, StoreError>(())
        }
        .await;
        match written {
            Ok(()) => tx.commit().await,
            Err(e) => {
                // the write error is what the caller sees
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(owner_id, error = %rb, "rollback after failed commit also failed");
                }
                Err(e)
            }
        }
    }
}

/// An open, owner-scoped transaction. Dropping it without [`StoreTx::commit`]
/// discards every staged write.
#[async_trait::async_trait]
pub trait StoreTx: Send {
    fn owner_id(&self) -> &str;

    async fn find_by_owner(&mut self) -> Result<Vec<Subscription>, StoreError>;

    async fn find_by_owner_and_ids(&mut self, ids: &[Uuid]) -> Result<Vec<Subscription>, StoreError>;

    /// Write vendor-sourced columns and `updated_at` of existing rows. A row
    /// that no longer exists for this owner is a conflict.
    async fn apply_updates(&mut self, updates: &[Subscription]) -> Result<u64, StoreError>;

    /// Insert one chunk of new rows.
    async fn insert_chunk(&mut self, creates: &[Subscription]) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
