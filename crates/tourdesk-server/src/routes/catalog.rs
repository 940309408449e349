use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use tourdesk_core::{
    BaseItem, BaseItemId, BaseItemPatch, ItemCategory, NewBaseItem, NewOperatorItem,
    OperatorItem, OperatorItemId, OperatorItemPatch,
};
use tourdesk_store::Catalog;

use crate::error::AppError;
use crate::extract::{Params, Payload, Tenant};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub(super) struct BaseItemQuery {
    category: Option<ItemCategory>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct OperatorItemQuery {
    base_item: Option<BaseItemId>,
}

pub(super) async fn list_base_items(
    State(state): State<AppState>,
    tenant: Tenant,
    Params(query): Params<BaseItemQuery>,
) -> Result<Json<Vec<BaseItem>>, AppError> {
    Ok(Json(
        state
            .store
            .list_base_items(tenant.agency, query.category)
            .await?,
    ))
}

pub(super) async fn create_base_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Payload(input): Payload<NewBaseItem>,
) -> Result<(StatusCode, Json<BaseItem>), AppError> {
    let item = state.store.create_base_item(tenant.agency, input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub(super) async fn get_base_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<BaseItemId>,
) -> Result<Json<BaseItem>, AppError> {
    Ok(Json(state.store.get_base_item(tenant.agency, id).await?))
}

pub(super) async fn update_base_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<BaseItemId>,
    Payload(patch): Payload<BaseItemPatch>,
) -> Result<Json<BaseItem>, AppError> {
    Ok(Json(
        state.store.update_base_item(tenant.agency, id, patch).await?,
    ))
}

pub(super) async fn deactivate_base_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<BaseItemId>,
) -> Result<Json<BaseItem>, AppError> {
    Ok(Json(
        state.store.deactivate_base_item(tenant.agency, id).await?,
    ))
}

pub(super) async fn list_operator_items(
    State(state): State<AppState>,
    tenant: Tenant,
    Params(query): Params<OperatorItemQuery>,
) -> Result<Json<Vec<OperatorItem>>, AppError> {
    Ok(Json(
        state
            .store
            .list_operator_items(tenant.agency, query.base_item)
            .await?,
    ))
}

pub(super) async fn create_operator_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Payload(input): Payload<NewOperatorItem>,
) -> Result<(StatusCode, Json<OperatorItem>), AppError> {
    let item = state.store.create_operator_item(tenant.agency, input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub(super) async fn get_operator_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<OperatorItemId>,
) -> Result<Json<OperatorItem>, AppError> {
    Ok(Json(state.store.get_operator_item(tenant.agency, id).await?))
}

pub(super) async fn update_operator_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<OperatorItemId>,
    Payload(patch): Payload<OperatorItemPatch>,
) -> Result<Json<OperatorItem>, AppError> {
    Ok(Json(
        state
            .store
            .update_operator_item(tenant.agency, id, patch)
            .await?,
    ))
}

pub(super) async fn deactivate_operator_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<OperatorItemId>,
) -> Result<Json<OperatorItem>, AppError> {
    Ok(Json(
        state
            .store
            .deactivate_operator_item(tenant.agency, id)
            .await?,
    ))
}
