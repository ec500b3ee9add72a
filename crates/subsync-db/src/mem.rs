//! In-process store.
//!
//! Same contract as the Postgres store: global `public_id` uniqueness,
//! all-or-nothing commit, per-owner serialization in
//! [`IsolationMode::SerializableSnapshot`]. Writes are staged in the
//! transaction and validated + applied under one lock at commit.
//!
//! Fault hooks ([`CommitFault`]) let tests force a failing chunk or commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use subsync_reconcile::{IsolationMode, Subscription, VendorFields};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::{StoreError, StoreTx, SubscriptionStore};

/// One-shot fault, consumed by the first transaction that trips it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitFault {
    /// The Nth `insert_chunk` call (1-based) of a transaction fails.
    CreateChunk(usize),
    /// The next commit fails as a conflict after validation.
    Commit,
}

#[derive(Default)]
struct MemState {
    rows: BTreeMap<Uuid, Subscription>,
    next_id: i64,
}

#[derive(Default)]
struct Inner {
    state: Mutex<MemState>,
    owner_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    fault: Mutex<Option<CommitFault>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // state is only mutated after validation, so a poisoned lock still holds
    // a consistent value
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_fault(&self, fault: CommitFault) {
        *lock(&self.inner.fault) = Some(fault);
    }

    pub fn clear_fault(&self) {
        *lock(&self.inner.fault) = None;
    }

    /// Every row, ordered by storage id.
    pub fn dump(&self) -> Vec<Subscription> {
        let mut rows: Vec<Subscription> = lock(&self.inner.state).rows.values().cloned().collect();
        rows.sort_by_key(|s| s.storage_id);
        rows
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.state).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn owner_lock(&self, owner_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.inner.owner_locks)
            .entry(owner_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the owner's lock entry once no transaction holds or awaits it.
    fn release_owner_lock(&self, owner_id: &str) {
        let mut locks = lock(&self.inner.owner_locks);
        if locks
            .get(owner_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(owner_id);
        }
    }

    /// Owners with a live lock entry.
    pub fn owner_lock_count(&self) -> usize {
        lock(&self.inner.owner_locks).len()
    }

    fn take_fault_if(&self, pred: impl Fn(CommitFault) -> bool) -> bool {
        let mut f = lock(&self.inner.fault);
        match *f {
            Some(fault) if pred(fault) => {
                *f = None;
                true
            }
            _ => false,
        }
    }

    fn read_owner(&self, owner_id: &str, ids: Option<&[Uuid]>) -> Vec<Subscription> {
        let st = lock(&self.inner.state);
        let mut out: Vec<Subscription> = st
            .rows
            .values()
            .filter(|s| s.owner_id == owner_id)
            .filter(|s| ids.map(|ids| ids.contains(&s.public_id)).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.storage_id);
        out
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for MemStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.read_owner(owner_id, None))
    }

    async fn find_by_owner_and_ids(
        &self,
        owner_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.read_owner(owner_id, Some(ids)))
    }

    async fn insert(&self, sub: &Subscription) -> Result<Subscription, StoreError> {
        let mut st = lock(&self.inner.state);
        if st.rows.contains_key(&sub.public_id) {
            return Err(StoreError::conflict(
                Some(sub.public_id),
                "duplicate public id",
            ));
        }
        st.next_id += 1;
        let mut stored = sub.clone();
        stored.storage_id = Some(st.next_id);
        stored.vendor = VendorFields::default();
        st.rows.insert(stored.public_id, stored.clone());
        Ok(stored)
    }

    async fn begin(
        &self,
        owner_id: &str,
        mode: IsolationMode,
    ) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = match mode {
            IsolationMode::SerializableSnapshot => Some(OwnerLease {
                store: self.clone(),
                owner_id: owner_id.to_string(),
                guard: Some(self.owner_lock(owner_id).lock_owned().await),
            }),
            IsolationMode::BestEffort => None,
        };
        Ok(Box::new(MemTx {
            store: self.clone(),
            owner_id: owner_id.to_string(),
            updates: Vec::new(),
            creates: Vec::new(),
            chunks: 0,
            _owner_guard: guard,
        }))
    }
}

/// Held owner lock; releasing it prunes the entry when nobody else waits.
struct OwnerLease {
    store: MemStore,
    owner_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OwnerLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.store.release_owner_lock(&self.owner_id);
    }
}

struct MemTx {
    store: MemStore,
    owner_id: String,
    updates: Vec<Subscription>,
    creates: Vec<Subscription>,
    chunks: usize,
    _owner_guard: Option<OwnerLease>,
}

#[async_trait::async_trait]
impl StoreTx for MemTx {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    async fn find_by_owner(&mut self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.store.read_owner(&self.owner_id, None))
    }

    async fn find_by_owner_and_ids(&mut self, ids: &[Uuid]) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.store.read_owner(&self.owner_id, Some(ids)))
    }

    async fn apply_updates(&mut self, updates: &[Subscription]) -> Result<u64, StoreError> {
        self.updates.extend_from_slice(updates);
        Ok(updates.len() as u64)
    }

    async fn insert_chunk(&mut self, creates: &[Subscription]) -> Result<u64, StoreError> {
        self.chunks += 1;
        let n = self.chunks;
        if self
            .store
            .take_fault_if(|f| f == CommitFault::CreateChunk(n))
        {
            return Err(StoreError::Backend(format!("injected failure on create chunk {n}")));
        }
        self.creates.extend_from_slice(creates);
        Ok(creates.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut st = lock(&self.store.inner.state);

        for u in &self.updates {
            match st.rows.get(&u.public_id) {
                Some(row) if row.owner_id == self.owner_id => {}
                _ => {
                    return Err(StoreError::conflict(
                        Some(u.public_id),
                        "update matched no row for this owner",
                    ))
                }
            }
        }
        let mut staged = std::collections::BTreeSet::new();
        for c in &self.creates {
            if st.rows.contains_key(&c.public_id) || !staged.insert(c.public_id) {
                return Err(StoreError::conflict(
                    Some(c.public_id),
                    "duplicate public id",
                ));
            }
        }
        if self.store.take_fault_if(|f| f == CommitFault::Commit) {
            return Err(StoreError::conflict(None, "injected commit failure"));
        }

        for u in &self.updates {
            if let Some(row) = st.rows.get_mut(&u.public_id) {
                row.vendor = u.vendor.clone();
                row.updated_at = u.updated_at;
            }
        }
        for c in &self.creates {
            st.next_id += 1;
            let mut row = c.clone();
            row.storage_id = Some(st.next_id);
            row.owner_id = self.owner_id.clone();
            st.rows.insert(row.public_id, row);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sub(n: u128, owner: &str) -> Subscription {
        let t = Utc.timestamp_opt(1_000, 0).single().unwrap();
        Subscription::new(Uuid::from_u128(n), owner, "OFFER-BASIC", "ACTIVE", 0, t)
    }

    #[tokio::test]
    async fn insert_enforces_global_uniqueness() {
        let s = MemStore::new();
        s.insert(&sub(1, "U1")).await.unwrap();
        let err = s.insert(&sub(1, "U2")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(s.len(), 1);
    }

    #[tokio::test]
    async fn owner_scoped_reads() {
        let s = MemStore::new();
        s.insert(&sub(1, "U1")).await.unwrap();
        s.insert(&sub(2, "U2")).await.unwrap();
        s.insert(&sub(3, "U1")).await.unwrap();

        let u1 = s.find_by_owner("U1").await.unwrap();
        assert_eq!(u1.len(), 2);
        let some = s
            .find_by_owner_and_ids("U1", &[Uuid::from_u128(2), Uuid::from_u128(3)])
            .await
            .unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].public_id, Uuid::from_u128(3));
    }

    #[tokio::test]
    async fn dropped_tx_leaves_store_untouched() {
        let s = MemStore::new();
        {
            let mut tx = s.begin("U1", IsolationMode::BestEffort).await.unwrap();
            tx.insert_chunk(&[sub(9, "U1")]).await.unwrap();
        }
        assert!(s.is_empty());
    }

    #[tokio::test]
    async fn update_only_touches_vendor_columns() {
        let s = MemStore::new();
        let stored = s.insert(&sub(1, "U1")).await.unwrap();

        let mut changed = stored.clone();
        changed.status = "CANCELLED".to_string();
        changed.offer_id = "OTHER".to_string();
        changed.vendor.status = Some("EXPIRED".to_string());
        changed.updated_at = stored.updated_at + chrono::Duration::seconds(5);

        s.commit("U1", &[changed.clone()], &[]).await.unwrap();
        let row = &s.dump()[0];
        assert_eq!(row.status, "ACTIVE");
        assert_eq!(row.offer_id, "OFFER-BASIC");
        assert_eq!(row.vendor.status.as_deref(), Some("EXPIRED"));
        assert_eq!(row.updated_at, changed.updated_at);
    }

    #[tokio::test]
    async fn update_of_foreign_row_is_conflict_and_nothing_applies() {
        let s = MemStore::new();
        s.insert(&sub(1, "U2")).await.unwrap();
        let mut foreign = sub(1, "U2");
        foreign.vendor.status = Some("ACTIVE".to_string());

        let err = s.commit("U1", &[foreign], &[sub(5, "U1")]).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(s.len(), 1);
        assert!(s.dump()[0].vendor.status.is_none());
    }

    #[tokio::test]
    async fn serializable_tx_blocks_second_tx_for_same_owner() {
        let s = MemStore::new();
        let first = s
            .begin("U1", IsolationMode::SerializableSnapshot)
            .await
            .unwrap();

        let s2 = s.clone();
        let second = tokio::spawn(async move {
            s2.begin("U1", IsolationMode::SerializableSnapshot)
                .await
                .map(|_| ())
        });
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(!second.is_finished());

        // other owners are not blocked
        let other = s.begin("U2", IsolationMode::SerializableSnapshot).await;
        assert!(other.is_ok());

        first.rollback().await.unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn owner_locks_are_pruned_after_release() {
        let s = MemStore::new();
        let first = s
            .begin("U1", IsolationMode::SerializableSnapshot)
            .await
            .unwrap();
        let other = s
            .begin("U2", IsolationMode::SerializableSnapshot)
            .await
            .unwrap();
        assert_eq!(s.owner_lock_count(), 2);

        let s2 = s.clone();
        let waiter = tokio::spawn(async move {
            let tx = s2.begin("U1", IsolationMode::SerializableSnapshot).await?;
            tx.commit().await
        });
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        // U1 still has a waiter, so its entry survives the first release
        first.rollback().await.unwrap();
        other.commit().await.unwrap();
        waiter.await.unwrap().unwrap();
        assert_eq!(s.owner_lock_count(), 0);
    }

    #[tokio::test]
    async fn failed_write_in_one_shot_commit_rolls_back() {
        let s = MemStore::new();
        s.inject_fault(CommitFault::CreateChunk(1));
        let err = s.commit("U1", &[], &[sub(1, "U1")]).await.unwrap_err();
        assert!(!err.is_conflict());
        assert!(s.is_empty());
        assert_eq!(s.owner_lock_count(), 0);
    }

    #[tokio::test]
    async fn fault_on_second_chunk_is_one_shot() {
        let s = MemStore::new();
        s.inject_fault(CommitFault::CreateChunk(2));

        let mut tx = s.begin("U1", IsolationMode::BestEffort).await.unwrap();
        tx.insert_chunk(&[sub(1, "U1")]).await.unwrap();
        assert!(tx.insert_chunk(&[sub(2, "U1")]).await.is_err());
        tx.rollback().await.unwrap();
        assert!(s.is_empty());

        let mut tx = s.begin("U1", IsolationMode::BestEffort).await.unwrap();
        tx.insert_chunk(&[sub(1, "U1")]).await.unwrap();
        tx.insert_chunk(&[sub(2, "U1")]).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(s.len(), 2);
    }
}
