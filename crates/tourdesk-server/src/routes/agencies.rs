use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use tourdesk_core::{Agency, AgencyPatch, NewAgency};
use tourdesk_store::AgencyManager;

use crate::error::AppError;
use crate::extract::{Payload, Tenant};
use crate::state::AppState;

/// Open a new tenant; needs no tenant headers
pub(super) async fn create(
    State(state): State<AppState>,
    Payload(input): Payload<NewAgency>,
) -> Result<(StatusCode, Json<Agency>), AppError> {
    let agency = state.store.create_agency(input).await?;
    Ok((StatusCode::CREATED, Json(agency)))
}

pub(super) async fn current(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<Agency>, AppError> {
    Ok(Json(state.store.get_agency(tenant.agency).await?))
}

pub(super) async fn update(
    State(state): State<AppState>,
    tenant: Tenant,
    Payload(patch): Payload<AgencyPatch>,
) -> Result<Json<Agency>, AppError> {
    Ok(Json(
        state.store.update_agency_settings(tenant.agency, patch).await?,
    ))
}
