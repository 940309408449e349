//! SQLite implementation of the operation traits.

mod agency;
mod catalog;
mod client;
mod dashboard;
mod funnel;
mod history;
mod proposal;

use chrono::Utc;
use sqlx::{Sqlite, Transaction};

use tourdesk_core::Timestamp;

use crate::error::StoreResult;
use crate::DbPool;

/// Main store handle that implements all operation traits
#[derive(Debug, Clone)]
pub struct CrmStore {
    pool: DbPool,
}

impl CrmStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// `BEGIN IMMEDIATE` takes the write lock up front, so concurrent writers
    /// queue on the busy timeout instead of failing a read-to-write upgrade.
    async fn begin_write(&self) -> StoreResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    fn now() -> Timestamp {
        Utc::now()
    }
}
