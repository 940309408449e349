use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use tourdesk_core::client::Placement;
use tourdesk_core::{
    AgencyId, Client, ClientFilter, ClientId, ClientPatch, CrmError, NewClient, ProposalStatus,
    StageId, ValidationError,
};

use super::CrmStore;
use crate::api::ClientDirectory;
use crate::error::{StoreError, StoreResult};
use crate::rows::{from_json, json, parse, parse_opt, timestamp, ts};

const COLUMNS: &str = "id, agency_id, name, email, phone, document, source, funnel_id, stage_id, \
                       notes, tags, created_at, updated_at";

impl CrmStore {
    pub(super) async fn load_client(
        conn: &mut SqliteConnection,
        agency: AgencyId,
        id: ClientId,
    ) -> StoreResult<Client> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM clients WHERE id = ? AND agency_id = ?"
        ))
        .bind(id.to_string())
        .bind(agency.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CrmError::not_found("client", id))?;
        client_from_row(&row)
    }

    pub(super) async fn load_clients(
        conn: &mut SqliteConnection,
        agency: AgencyId,
    ) -> StoreResult<Vec<Client>> {
        let mut clients = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM clients WHERE agency_id = ? ORDER BY id"
        ))
        .bind(agency.to_string())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(client_from_row)
        .collect::<StoreResult<Vec<_>>>()?;
        // NOCASE only folds ASCII
        clients.sort_by_cached_key(|c| c.name.to_lowercase());
        Ok(clients)
    }

    async fn save_client(conn: &mut SqliteConnection, client: &Client) -> StoreResult<()> {
        sqlx::query(
            "UPDATE clients SET name = ?, email = ?, phone = ?, document = ?, source = ?,
                funnel_id = ?, stage_id = ?, notes = ?, tags = ?, updated_at = ?
             WHERE id = ? AND agency_id = ?",
        )
        .bind(&client.name)
        .bind(client.email.as_deref())
        .bind(client.phone.as_deref())
        .bind(client.document.as_deref())
        .bind(client.source.as_str())
        .bind(client.funnel_id.map(|id| id.to_string()))
        .bind(client.stage_id.map(|id| id.to_string()))
        .bind(&client.notes)
        .bind(json(&client.tags)?)
        .bind(ts(&client.updated_at))
        .bind(client.id.to_string())
        .bind(client.agency_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|err| email_taken(err, client.email.as_deref()))?;
        Ok(())
    }
}

fn email_taken(err: sqlx::Error, email: Option<&str>) -> StoreError {
    StoreError::on_unique(err, || {
        ValidationError::Duplicate {
            field: "email",
            value: email.unwrap_or_default().to_string(),
        }
        .into()
    })
}

#[async_trait]
impl ClientDirectory for CrmStore {
    async fn create_client(&self, agency: AgencyId, input: NewClient) -> StoreResult<Client> {
        let mut tx = self.begin_write().await?;
        Self::ensure_agency(&mut tx, agency).await?;

        let placement = match input.stage_id {
            Some(stage_id) => {
                let stage = Self::load_stage(&mut tx, agency, stage_id).await?;
                Some(Placement {
                    funnel_id: stage.funnel_id,
                    stage_id,
                })
            }
            None => Self::load_default_funnel(&mut tx, agency)
                .await?
                .and_then(|funnel| {
                    funnel.first_stage().map(|stage| Placement {
                        funnel_id: funnel.id,
                        stage_id: stage.id,
                    })
                }),
        };

        let client = Client::create(agency, input, placement, Self::now())?;
        sqlx::query(
            "INSERT INTO clients (id, agency_id, name, email, phone, document, source, funnel_id,
                stage_id, notes, tags, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(client.id.to_string())
        .bind(agency.to_string())
        .bind(&client.name)
        .bind(client.email.as_deref())
        .bind(client.phone.as_deref())
        .bind(client.document.as_deref())
        .bind(client.source.as_str())
        .bind(client.funnel_id.map(|id| id.to_string()))
        .bind(client.stage_id.map(|id| id.to_string()))
        .bind(&client.notes)
        .bind(json(&client.tags)?)
        .bind(ts(&client.created_at))
        .bind(ts(&client.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|err| email_taken(err, client.email.as_deref()))?;
        tx.commit().await?;

        info!(%agency, client = %client.id, stage = ?client.stage_id, "client created");
        Ok(client)
    }

    async fn update_client(
        &self,
        agency: AgencyId,
        id: ClientId,
        patch: ClientPatch,
    ) -> StoreResult<Client> {
        let mut tx = self.begin_write().await?;
        let mut client = Self::load_client(&mut tx, agency, id).await?;
        client.apply(patch, Self::now())?;
        Self::save_client(&mut tx, &client).await?;
        tx.commit().await?;

        info!(%agency, client = %id, "client updated");
        Ok(client)
    }

    async fn get_client(&self, agency: AgencyId, id: ClientId) -> StoreResult<Client> {
        let mut conn = self.pool.acquire().await?;
        Self::load_client(&mut conn, agency, id).await
    }

    async fn delete_client(&self, agency: AgencyId, id: ClientId) -> StoreResult<()> {
        let mut tx = self.begin_write().await?;
        let client = Self::load_client(&mut tx, agency, id).await?;
        let open: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM proposals WHERE client_id = ? AND status != ?")
                .bind(id.to_string())
                .bind(ProposalStatus::Cancelled.as_str())
                .fetch_one(&mut *tx)
                .await?;
        if open > 0 {
            return Err(CrmError::Conflict(format!(
                "client '{}' still has {open} proposal(s) that are not cancelled",
                client.name
            ))
            .into());
        }

        sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(%agency, client = %id, "client deleted");
        Ok(())
    }

    async fn list_clients(
        &self,
        agency: AgencyId,
        filter: &ClientFilter,
    ) -> StoreResult<Vec<Client>> {
        let mut conn = self.pool.acquire().await?;
        let mut clients = Self::load_clients(&mut conn, agency).await?;
        clients.retain(|c| filter.matches(c));
        debug!(%agency, count = clients.len(), "clients listed");
        Ok(clients)
    }

    async fn move_client_to_stage(
        &self,
        agency: AgencyId,
        id: ClientId,
        stage: StageId,
    ) -> StoreResult<Client> {
        let mut tx = self.begin_write().await?;
        let mut client = Self::load_client(&mut tx, agency, id).await?;
        let target = Self::load_stage(&mut tx, agency, stage).await?;
        client.move_to(
            Placement {
                funnel_id: target.funnel_id,
                stage_id: target.id,
            },
            Self::now(),
        );
        Self::save_client(&mut tx, &client).await?;
        tx.commit().await?;

        info!(%agency, client = %id, stage = %target.name, "client moved");
        Ok(client)
    }
}

fn client_from_row(row: &SqliteRow) -> StoreResult<Client> {
    Ok(Client {
        id: parse(row, "id")?,
        agency_id: parse(row, "agency_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        document: row.try_get("document")?,
        source: parse(row, "source")?,
        funnel_id: parse_opt(row, "funnel_id")?,
        stage_id: parse_opt(row, "stage_id")?,
        notes: row.try_get("notes")?,
        tags: from_json(row, "tags")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}
