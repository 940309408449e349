use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use tourdesk_core::{quote as price, Dashboard, Quote, QuoteRequest};
use tourdesk_store::Reporting;

use crate::error::AppError;
use crate::extract::{Payload, Tenant};
use crate::state::{AppState, SweepStatus};

#[derive(Debug, Serialize)]
pub(super) struct Health {
    status: &'static str,
    version: &'static str,
    sweep: SweepStatus,
}

pub(super) async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: crate::VERSION,
        sweep: state.sweep_status(),
    })
}

pub(super) async fn dashboard(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(state.store.dashboard(tenant.agency, Utc::now()).await?))
}

/// Price arbitrary lines without touching storage
pub(super) async fn quote(
    _tenant: Tenant,
    Payload(request): Payload<QuoteRequest>,
) -> Result<Json<Quote>, AppError> {
    Ok(Json(price(&request)?))
}
