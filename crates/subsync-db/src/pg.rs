use anyhow::{Context, Result};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use subsync_reconcile::{IsolationMode, Subscription, VendorFields};
use uuid::Uuid;

use crate::{StoreError, StoreTx, SubscriptionStore};

pub const ENV_DB_URL: &str = "SUBSYNC_DATABASE_URL";

const UQ_PUBLIC_ID: &str = "uq_subscriptions_public_id";

const SELECT_COLUMNS: &str = r#"
    select id, public_id, owner_id, offer_id, status, balance_micros, created_at, updated_at,
           vendor_status, vendor_balance_micros, last_sync_time, usage_count, logo_url, brand
    from subscriptions
"#;

// ---------------------------------------------------------------------------
// Pool / schema plumbing
// ---------------------------------------------------------------------------

/// Connect to Postgres using SUBSYNC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_subscriptions_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'subscriptions'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_subscriptions_table: exists,
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

/// serialization_failure (40001) or deadlock_detected (40P01).
fn is_serialization_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

fn map_err(err: sqlx::Error, what: &str) -> StoreError {
    if is_unique_constraint_violation(&err, UQ_PUBLIC_ID) {
        tracing::warn!(op = what, error = %err, "public id already taken; mapped to conflict");
        return StoreError::conflict(None, format!("{what}: duplicate public id ({err})"));
    }
    if is_serialization_failure(&err) {
        tracing::warn!(op = what, error = %err, "serialization failure; mapped to conflict");
        return StoreError::conflict(None, format!("{what}: concurrent owner write ({err})"));
    }
    StoreError::Backend(format!("{what}: {err}"))
}

fn row_to_subscription(row: &PgRow) -> Result<Subscription, sqlx::Error> {
    Ok(Subscription {
        storage_id: Some(row.try_get("id")?),
        public_id: row.try_get("public_id")?,
        owner_id: row.try_get("owner_id")?,
        offer_id: row.try_get("offer_id")?,
        status: row.try_get("status")?,
        balance_micros: row.try_get("balance_micros")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        vendor: VendorFields {
            status: row.try_get("vendor_status")?,
            balance_micros: row.try_get("vendor_balance_micros")?,
            last_sync_time: row.try_get("last_sync_time")?,
            usage_count: row.try_get("usage_count")?,
            logo_url: row.try_get("logo_url")?,
            brand: row.try_get("brand")?,
        },
    })
}

fn rows_to_subscriptions(rows: Vec<PgRow>, what: &str) -> Result<Vec<Subscription>, StoreError> {
    rows.iter()
        .map(row_to_subscription)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_err(e, what))
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} where owner_id = $1 order by id"))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err(e, "find_by_owner"))?;
        rows_to_subscriptions(rows, "find_by_owner")
    }

    async fn find_by_owner_and_ids(
        &self,
        owner_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} where owner_id = $1 and public_id = any($2) order by id"
        ))
        .bind(owner_id)
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_err(e, "find_by_owner_and_ids"))?;
        rows_to_subscriptions(rows, "find_by_owner_and_ids")
    }

    async fn insert(&self, sub: &Subscription) -> Result<Subscription, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            insert into subscriptions (
              public_id, owner_id, offer_id, status, balance_micros, created_at, updated_at
            ) values ($1, $2, $3, $4, $5, $6, $7)
            returning id
            "#,
        )
        .bind(sub.public_id)
        .bind(&sub.owner_id)
        .bind(&sub.offer_id)
        .bind(&sub.status)
        .bind(sub.balance_micros)
        .bind(sub.created_at)
        .bind(sub.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_err(e, "insert") {
            StoreError::Conflict { detail, .. } => StoreError::conflict(Some(sub.public_id), detail),
            other => other,
        })?;

        let mut stored = sub.clone();
        stored.storage_id = Some(id);
        stored.vendor = VendorFields::default();
        Ok(stored)
    }

    async fn begin(
        &self,
        owner_id: &str,
        mode: IsolationMode,
    ) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_err(e, "begin"))?;

        if mode == IsolationMode::SerializableSnapshot {
            // must be the first statement of the transaction
            sqlx::query("set transaction isolation level serializable")
                .execute(&mut *tx)
                .await
                .map_err(|e| map_err(e, "set isolation"))?;
            sqlx::query("select pg_advisory_xact_lock(hashtext($1))")
                .bind(owner_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_err(e, "owner lock"))?;
        }

        Ok(Box::new(PgTx {
            owner_id: owner_id.to_string(),
            tx,
        }))
    }
}

struct PgTx {
    owner_id: String,
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl StoreTx for PgTx {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    async fn find_by_owner(&mut self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} where owner_id = $1 order by id"))
            .bind(&self.owner_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_err(e, "tx find_by_owner"))?;
        rows_to_subscriptions(rows, "tx find_by_owner")
    }

    async fn find_by_owner_and_ids(&mut self, ids: &[Uuid]) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} where owner_id = $1 and public_id = any($2) order by id"
        ))
        .bind(&self.owner_id)
        .bind(ids.to_vec())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_err(e, "tx find_by_owner_and_ids"))?;
        rows_to_subscriptions(rows, "tx find_by_owner_and_ids")
    }

    async fn apply_updates(&mut self, updates: &[Subscription]) -> Result<u64, StoreError> {
        let mut n = 0;
        for u in updates {
            let res = sqlx::query(
                r#"
                update subscriptions
                set vendor_status = $1,
                    vendor_balance_micros = $2,
                    last_sync_time = $3,
                    usage_count = $4,
                    logo_url = $5,
                    brand = $6,
                    updated_at = $7
                where public_id = $8 and owner_id = $9
                "#,
            )
            .bind(&u.vendor.status)
            .bind(u.vendor.balance_micros)
            .bind(u.vendor.last_sync_time)
            .bind(u.vendor.usage_count)
            .bind(&u.vendor.logo_url)
            .bind(&u.vendor.brand)
            .bind(u.updated_at)
            .bind(u.public_id)
            .bind(&self.owner_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_err(e, "apply_updates"))?;

            if res.rows_affected() == 0 {
                return Err(StoreError::conflict(
                    Some(u.public_id),
                    "update matched no row for this owner",
                ));
            }
            n += res.rows_affected();
        }
        Ok(n)
    }

    async fn insert_chunk(&mut self, creates: &[Subscription]) -> Result<u64, StoreError> {
        if creates.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "insert into subscriptions (public_id, owner_id, offer_id, status, balance_micros, \
             created_at, updated_at, vendor_status, vendor_balance_micros, last_sync_time, \
             usage_count, logo_url, brand) ",
        );
        qb.push_values(creates, |mut b, s| {
            b.push_bind(s.public_id)
                .push_bind(&self.owner_id)
                .push_bind(&s.offer_id)
                .push_bind(&s.status)
                .push_bind(s.balance_micros)
                .push_bind(s.created_at)
                .push_bind(s.updated_at)
                .push_bind(&s.vendor.status)
                .push_bind(s.vendor.balance_micros)
                .push_bind(s.vendor.last_sync_time)
                .push_bind(s.vendor.usage_count)
                .push_bind(&s.vendor.logo_url)
                .push_bind(&s.vendor.brand);
        });
        let res = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_err(e, "insert_chunk"))?;
        Ok(res.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx, .. } = *self;
        tx.commit().await.map_err(|e| map_err(e, "commit"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx, .. } = *self;
        tx.rollback().await.map_err(|e| map_err(e, "rollback"))
    }
}
