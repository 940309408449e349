use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use tourdesk_core::{Funnel, FunnelId, NewFunnel, NewStage, StageId};
use tourdesk_store::FunnelManager;

use crate::error::AppError;
use crate::extract::{Payload, Tenant};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct RenameStage {
    name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct StageOrder {
    stages: Vec<StageId>,
}

pub(super) async fn list(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<Vec<Funnel>>, AppError> {
    Ok(Json(state.store.list_funnels(tenant.agency).await?))
}

pub(super) async fn create(
    State(state): State<AppState>,
    tenant: Tenant,
    Payload(input): Payload<NewFunnel>,
) -> Result<(StatusCode, Json<Funnel>), AppError> {
    let funnel = state.store.create_funnel(tenant.agency, input).await?;
    Ok((StatusCode::CREATED, Json(funnel)))
}

pub(super) async fn get(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<FunnelId>,
) -> Result<Json<Funnel>, AppError> {
    Ok(Json(state.store.get_funnel(tenant.agency, id).await?))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<FunnelId>,
) -> Result<StatusCode, AppError> {
    state.store.delete_funnel(tenant.agency, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn make_default(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<FunnelId>,
) -> Result<Json<Funnel>, AppError> {
    Ok(Json(state.store.set_default_funnel(tenant.agency, id).await?))
}

pub(super) async fn add_stage(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<FunnelId>,
    Payload(input): Payload<NewStage>,
) -> Result<(StatusCode, Json<Funnel>), AppError> {
    let funnel = state.store.add_stage(tenant.agency, id, input).await?;
    Ok((StatusCode::CREATED, Json(funnel)))
}

pub(super) async fn reorder_stages(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<FunnelId>,
    Payload(order): Payload<StageOrder>,
) -> Result<Json<Funnel>, AppError> {
    Ok(Json(
        state
            .store
            .reorder_stages(tenant.agency, id, order.stages)
            .await?,
    ))
}

pub(super) async fn rename_stage(
    State(state): State<AppState>,
    tenant: Tenant,
    Path((id, stage)): Path<(FunnelId, StageId)>,
    Payload(body): Payload<RenameStage>,
) -> Result<Json<Funnel>, AppError> {
    Ok(Json(
        state
            .store
            .rename_stage(tenant.agency, id, stage, body.name)
            .await?,
    ))
}

pub(super) async fn remove_stage(
    State(state): State<AppState>,
    tenant: Tenant,
    Path((id, stage)): Path<(FunnelId, StageId)>,
) -> Result<Json<Funnel>, AppError> {
    Ok(Json(state.store.remove_stage(tenant.agency, id, stage).await?))
}
