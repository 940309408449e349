use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use tracing::{debug, info};

use tourdesk_core::{AgencyId, CrmError, Funnel, FunnelId, NewFunnel, NewStage, Stage, StageId};

use super::CrmStore;
use crate::api::FunnelManager;
use crate::error::{StoreError, StoreResult};
use crate::rows::{parse, timestamp, ts, unsigned};

const FUNNEL_COLUMNS: &str = "id, agency_id, name, is_default, created_at";
const STAGE_COLUMNS: &str = "id, funnel_id, name, position, color";

impl CrmStore {
    pub(super) async fn ensure_agency(
        conn: &mut SqliteConnection,
        agency: AgencyId,
    ) -> StoreResult<()> {
        let found = sqlx::query("SELECT 1 FROM agencies WHERE id = ?")
            .bind(agency.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        match found {
            Some(_) => Ok(()),
            None => Err(CrmError::not_found("agency", agency).into()),
        }
    }

    pub(super) async fn load_funnel(
        conn: &mut SqliteConnection,
        agency: AgencyId,
        id: FunnelId,
    ) -> StoreResult<Funnel> {
        let row = sqlx::query(&format!(
            "SELECT {FUNNEL_COLUMNS} FROM funnels WHERE id = ? AND agency_id = ?"
        ))
        .bind(id.to_string())
        .bind(agency.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CrmError::not_found("funnel", id))?;

        let stages = sqlx::query(&format!(
            "SELECT {STAGE_COLUMNS} FROM stages WHERE funnel_id = ? ORDER BY position"
        ))
        .bind(id.to_string())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(stage_from_row)
        .collect::<StoreResult<Vec<_>>>()?;

        funnel_from_row(&row, stages)
    }

    pub(super) async fn load_default_funnel(
        conn: &mut SqliteConnection,
        agency: AgencyId,
    ) -> StoreResult<Option<Funnel>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM funnels WHERE agency_id = ? AND is_default = 1")
                .bind(agency.to_string())
                .fetch_optional(&mut *conn)
                .await?;
        match id {
            Some(id) => {
                let id = id
                    .parse()
                    .map_err(|err| StoreError::Decode(format!("invalid funnel id: {err}")))?;
                Ok(Some(Self::load_funnel(conn, agency, id).await?))
            }
            None => Ok(None),
        }
    }

    /// Stage that belongs to one of the agency's funnels
    pub(super) async fn load_stage(
        conn: &mut SqliteConnection,
        agency: AgencyId,
        id: StageId,
    ) -> StoreResult<Stage> {
        let row = sqlx::query(
            "SELECT s.id, s.funnel_id, s.name, s.position, s.color
             FROM stages s JOIN funnels f ON f.id = s.funnel_id
             WHERE s.id = ? AND f.agency_id = ?",
        )
        .bind(id.to_string())
        .bind(agency.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CrmError::not_found("stage", id))?;
        stage_from_row(&row)
    }

    async fn save_stages(conn: &mut SqliteConnection, funnel: &Funnel) -> StoreResult<()> {
        for stage in &funnel.stages {
            sqlx::query(
                "INSERT INTO stages (id, funnel_id, name, position, color) VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    position = excluded.position,
                    color = excluded.color",
            )
            .bind(stage.id.to_string())
            .bind(funnel.id.to_string())
            .bind(&stage.name)
            .bind(i64::from(stage.position))
            .bind(stage.color.as_deref())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn count_clients(
        conn: &mut SqliteConnection,
        column: &str,
        id: String,
    ) -> StoreResult<usize> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM clients WHERE {column} = ?"))
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Load, let `change` mutate, persist the stages; one transaction
    async fn edit_funnel<F>(&self, agency: AgencyId, id: FunnelId, change: F) -> StoreResult<Funnel>
    where
        F: FnOnce(&mut Funnel) -> Result<(), CrmError> + Send,
    {
        let mut tx = self.begin_write().await?;
        let mut funnel = Self::load_funnel(&mut tx, agency, id).await?;
        change(&mut funnel)?;
        Self::save_stages(&mut tx, &funnel).await?;
        tx.commit().await?;
        Ok(funnel)
    }
}

#[async_trait]
impl FunnelManager for CrmStore {
    async fn create_funnel(&self, agency: AgencyId, input: NewFunnel) -> StoreResult<Funnel> {
        let mut tx = self.begin_write().await?;
        Self::ensure_agency(&mut tx, agency).await?;
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM funnels WHERE agency_id = ?")
            .bind(agency.to_string())
            .fetch_one(&mut *tx)
            .await?;

        let funnel = Funnel::create(agency, input, existing == 0, Self::now())?;
        sqlx::query(
            "INSERT INTO funnels (id, agency_id, name, is_default, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(funnel.id.to_string())
        .bind(agency.to_string())
        .bind(&funnel.name)
        .bind(funnel.is_default)
        .bind(ts(&funnel.created_at))
        .execute(&mut *tx)
        .await?;
        Self::save_stages(&mut tx, &funnel).await?;
        tx.commit().await?;

        info!(%agency, funnel = %funnel.id, stages = funnel.stages.len(), is_default = funnel.is_default, "funnel created");
        Ok(funnel)
    }

    async fn list_funnels(&self, agency: AgencyId) -> StoreResult<Vec<Funnel>> {
        let rows = sqlx::query(&format!(
            "SELECT {FUNNEL_COLUMNS} FROM funnels WHERE agency_id = ? ORDER BY created_at, name"
        ))
        .bind(agency.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut stages: HashMap<FunnelId, Vec<Stage>> = HashMap::new();
        let stage_rows = sqlx::query(
            "SELECT s.id, s.funnel_id, s.name, s.position, s.color
             FROM stages s JOIN funnels f ON f.id = s.funnel_id
             WHERE f.agency_id = ? ORDER BY s.funnel_id, s.position",
        )
        .bind(agency.to_string())
        .fetch_all(&self.pool)
        .await?;
        for row in &stage_rows {
            let stage = stage_from_row(row)?;
            stages.entry(stage.funnel_id).or_default().push(stage);
        }

        let funnels = rows
            .iter()
            .map(|row| {
                let id: FunnelId = parse(row, "id")?;
                funnel_from_row(row, stages.remove(&id).unwrap_or_default())
            })
            .collect::<StoreResult<Vec<_>>>()?;
        debug!(%agency, count = funnels.len(), "funnels listed");
        Ok(funnels)
    }

    async fn get_funnel(&self, agency: AgencyId, id: FunnelId) -> StoreResult<Funnel> {
        let mut conn = self.pool.acquire().await?;
        Self::load_funnel(&mut conn, agency, id).await
    }

    async fn default_funnel(&self, agency: AgencyId) -> StoreResult<Option<Funnel>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_default_funnel(&mut conn, agency).await
    }

    async fn add_stage(
        &self,
        agency: AgencyId,
        funnel: FunnelId,
        input: NewStage,
    ) -> StoreResult<Funnel> {
        let updated = self
            .edit_funnel(agency, funnel, |f| f.add_stage(input).map(|_| ()))
            .await?;
        info!(%agency, %funnel, "stage added");
        Ok(updated)
    }

    async fn rename_stage(
        &self,
        agency: AgencyId,
        funnel: FunnelId,
        stage: StageId,
        name: String,
    ) -> StoreResult<Funnel> {
        self.edit_funnel(agency, funnel, |f| f.rename_stage(stage, &name))
            .await
    }

    async fn reorder_stages(
        &self,
        agency: AgencyId,
        funnel: FunnelId,
        order: Vec<StageId>,
    ) -> StoreResult<Funnel> {
        let updated = self
            .edit_funnel(agency, funnel, |f| f.reorder_stages(&order))
            .await?;
        info!(%agency, %funnel, "stages reordered");
        Ok(updated)
    }

    async fn remove_stage(
        &self,
        agency: AgencyId,
        funnel: FunnelId,
        stage: StageId,
    ) -> StoreResult<Funnel> {
        let mut tx = self.begin_write().await?;
        let mut loaded = Self::load_funnel(&mut tx, agency, funnel).await?;
        let occupants = Self::count_clients(&mut tx, "stage_id", stage.to_string()).await?;
        loaded.remove_stage(stage, occupants)?;

        sqlx::query("DELETE FROM stages WHERE id = ?")
            .bind(stage.to_string())
            .execute(&mut *tx)
            .await?;
        Self::save_stages(&mut tx, &loaded).await?;
        tx.commit().await?;

        info!(%agency, %funnel, %stage, "stage removed");
        Ok(loaded)
    }

    async fn set_default_funnel(&self, agency: AgencyId, funnel: FunnelId) -> StoreResult<Funnel> {
        let mut tx = self.begin_write().await?;
        let mut loaded = Self::load_funnel(&mut tx, agency, funnel).await?;
        sqlx::query("UPDATE funnels SET is_default = 0 WHERE agency_id = ?")
            .bind(agency.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE funnels SET is_default = 1 WHERE id = ?")
            .bind(funnel.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        loaded.is_default = true;
        info!(%agency, %funnel, "default funnel changed");
        Ok(loaded)
    }

    async fn delete_funnel(&self, agency: AgencyId, funnel: FunnelId) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let loaded = Self::load_funnel(&mut tx, agency, funnel).await?;
        let clients = Self::count_clients(&mut tx, "funnel_id", funnel.to_string()).await?;
        if clients > 0 {
            return Err(CrmError::Conflict(format!(
                "funnel '{}' still holds {clients} client(s)",
                loaded.name
            ))
            .into());
        }
        if loaded.is_default {
            let others: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM funnels WHERE agency_id = ? AND id != ?")
                    .bind(agency.to_string())
                    .bind(funnel.to_string())
                    .fetch_one(&mut *tx)
                    .await?;
            if others > 0 {
                return Err(CrmError::Conflict(
                    "choose another default funnel before deleting this one".to_string(),
                )
                .into());
            }
        }

        sqlx::query("DELETE FROM funnels WHERE id = ?")
            .bind(funnel.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(%agency, %funnel, "funnel deleted");
        Ok(())
    }
}

fn funnel_from_row(row: &SqliteRow, stages: Vec<Stage>) -> StoreResult<Funnel> {
    Ok(Funnel {
        id: parse(row, "id")?,
        agency_id: parse(row, "agency_id")?,
        name: row.try_get("name")?,
        is_default: row.try_get("is_default")?,
        stages,
        created_at: timestamp(row, "created_at")?,
    })
}

fn stage_from_row(row: &SqliteRow) -> StoreResult<Stage> {
    Ok(Stage {
        id: parse(row, "id")?,
        funnel_id: parse(row, "funnel_id")?,
        name: row.try_get("name")?,
        position: unsigned(row, "position")?,
        color: row.try_get("color")?,
    })
}
