//! Tourdesk Store - SQLite persistence for the CRM
//!
//! [`CrmStore`] implements the operation traits in [`api`] on top of a sqlx
//! SQLite pool. Domain rules live in `tourdesk-core`; this crate loads
//! records, lets the domain decide and writes the outcome back, using one
//! transaction per operation that touches more than one row.
//!
//! # Example
//!
//! ```rust,ignore
//! use tourdesk_store::{api::*, connect, migrations, CrmStore};
//!
//! let pool = connect("sqlite::memory:", 1).await?;
//! migrations::run_pending(&pool).await?;
//! let store = CrmStore::new(pool);
//! let agency = store.create_agency(NewAgency { name: "Sol".into(), ..Default::default() }).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
pub mod error;
pub mod migrations;
mod rows;
mod store;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub use api::{
    AgencyManager, Catalog, ClientDirectory, FunnelManager, ProposalWorkflow, Reporting,
    StatusHistory,
};
pub use error::{StoreError, StoreResult};
pub use store::CrmStore;

/// Connection pool shared by every store operation
pub type DbPool = sqlx::SqlitePool;

/// Open a pool; the database file is created when missing.
///
/// An in-memory database lives as long as its single connection, so memory
/// URLs get one connection that is never recycled.
pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<DbPool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    let pool = pool_options.connect_with(options).await?;
    debug!(database_url, in_memory, "database pool opened");
    Ok(pool)
}

/// Fresh migrated in-memory database
pub async fn connect_in_memory() -> StoreResult<DbPool> {
    let pool = connect("sqlite::memory:", 1).await?;
    migrations::run_pending(&pool).await?;
    Ok(pool)
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
