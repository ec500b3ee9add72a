//! subsync-db
//!
//! Store boundary for subscription records:
//! - [`SubscriptionStore`] / [`StoreTx`]: owner-scoped reads and atomic,
//!   owner-scoped reconciliation writes
//! - [`PgStore`]: Postgres via sqlx, embedded migrations
//! - [`MemStore`]: in-process store with the same contract plus fault hooks

mod mem;
mod pg;
mod store;

pub use mem::{CommitFault, MemStore};
pub use pg::{connect, connect_from_env, migrate, status, DbStatus, PgStore, ENV_DB_URL};
pub use store::{StoreError, StoreTx, SubscriptionStore};
