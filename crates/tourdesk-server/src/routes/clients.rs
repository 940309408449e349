use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use tourdesk_core::{Client, ClientFilter, ClientId, ClientPatch, NewClient, StageId};
use tourdesk_store::ClientDirectory;

use crate::error::AppError;
use crate::extract::{Params, Payload, Tenant};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct MoveToStage {
    stage_id: StageId,
}

pub(super) async fn list(
    State(state): State<AppState>,
    tenant: Tenant,
    Params(filter): Params<ClientFilter>,
) -> Result<Json<Vec<Client>>, AppError> {
    Ok(Json(state.store.list_clients(tenant.agency, &filter).await?))
}

pub(super) async fn create(
    State(state): State<AppState>,
    tenant: Tenant,
    Payload(input): Payload<NewClient>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    let client = state.store.create_client(tenant.agency, input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub(super) async fn get(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ClientId>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(state.store.get_client(tenant.agency, id).await?))
}

pub(super) async fn update(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ClientId>,
    Payload(patch): Payload<ClientPatch>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(state.store.update_client(tenant.agency, id, patch).await?))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ClientId>,
) -> Result<StatusCode, AppError> {
    state.store.delete_client(tenant.agency, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn move_to_stage(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ClientId>,
    Payload(body): Payload<MoveToStage>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(
        state
            .store
            .move_client_to_stage(tenant.agency, id, body.stage_id)
            .await?,
    ))
}
