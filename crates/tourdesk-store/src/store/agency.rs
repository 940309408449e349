use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

use tourdesk_core::{Agency, AgencyId, AgencyPatch, CrmError, NewAgency};

use super::CrmStore;
use crate::api::AgencyManager;
use crate::error::StoreResult;
use crate::rows::{parse, timestamp, ts};

const COLUMNS: &str = "id, name, default_currency, default_commission_rate, created_at";

impl CrmStore {
    pub(super) async fn load_agency(conn: &mut SqliteConnection, id: AgencyId) -> StoreResult<Agency> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM agencies WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| CrmError::not_found("agency", id))?;
        agency_from_row(&row)
    }
}

#[async_trait]
impl AgencyManager for CrmStore {
    async fn create_agency(&self, input: NewAgency) -> StoreResult<Agency> {
        let agency = Agency::create(input, Self::now())?;
        sqlx::query(
            "INSERT INTO agencies (id, name, default_currency, default_commission_rate, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(agency.id.to_string())
        .bind(&agency.name)
        .bind(agency.default_currency.as_str())
        .bind(agency.default_commission_rate.to_string())
        .bind(ts(&agency.created_at))
        .execute(&self.pool)
        .await?;

        info!(agency = %agency.id, name = %agency.name, "agency created");
        Ok(agency)
    }

    async fn get_agency(&self, id: AgencyId) -> StoreResult<Agency> {
        let mut conn = self.pool.acquire().await?;
        Self::load_agency(&mut conn, id).await
    }

    async fn update_agency_settings(
        &self,
        id: AgencyId,
        patch: AgencyPatch,
    ) -> StoreResult<Agency> {
        let mut tx = self.begin_write().await?;
        let mut agency = Self::load_agency(&mut tx, id).await?;
        agency.apply(patch)?;
        sqlx::query(
            "UPDATE agencies SET name = ?, default_currency = ?, default_commission_rate = ?
             WHERE id = ?",
        )
        .bind(&agency.name)
        .bind(agency.default_currency.as_str())
        .bind(agency.default_commission_rate.to_string())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(agency = %id, "agency settings updated");
        Ok(agency)
    }
}

fn agency_from_row(row: &SqliteRow) -> StoreResult<Agency> {
    Ok(Agency {
        id: parse(row, "id")?,
        name: row.try_get("name")?,
        default_currency: parse(row, "default_currency")?,
        default_commission_rate: parse(row, "default_commission_rate")?,
        created_at: timestamp(row, "created_at")?,
    })
}
