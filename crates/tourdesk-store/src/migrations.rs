//! Embedded schema migrations.

use sqlx::migrate::Migrator;
use tracing::info;

use crate::error::StoreResult;
use crate::DbPool;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply every migration not yet recorded in the database
pub async fn run_pending(pool: &DbPool) -> StoreResult<()> {
    MIGRATOR.run(pool).await?;
    info!(migrations = MIGRATOR.iter().count(), "database schema up to date");
    Ok(())
}
