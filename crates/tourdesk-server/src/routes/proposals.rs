use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use tourdesk_core::{
    state_machine, IntegrityReport, NewProposal, Proposal, ProposalFilter, ProposalId,
    ProposalPatch, ProposalStatus, StatusChange,
};
use tourdesk_store::{ProposalWorkflow, StatusHistory};

use crate::error::AppError;
use crate::extract::{Params, Payload, Tenant};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct TransitionRequest {
    status: ProposalStatus,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct AllowedTransitions {
    status: ProposalStatus,
    allowed: Vec<ProposalStatus>,
}

#[derive(Debug, Serialize)]
pub(super) struct Expired {
    expired: Vec<ProposalId>,
}

pub(super) async fn list(
    State(state): State<AppState>,
    tenant: Tenant,
    Params(filter): Params<ProposalFilter>,
) -> Result<Json<Vec<Proposal>>, AppError> {
    Ok(Json(state.store.list_proposals(tenant.agency, &filter).await?))
}

pub(super) async fn create(
    State(state): State<AppState>,
    tenant: Tenant,
    Payload(input): Payload<NewProposal>,
) -> Result<(StatusCode, Json<Proposal>), AppError> {
    let user = tenant.user()?;
    let proposal = state
        .store
        .create_proposal(tenant.agency, user, input)
        .await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

pub(super) async fn get(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ProposalId>,
) -> Result<Json<Proposal>, AppError> {
    Ok(Json(state.store.get_proposal(tenant.agency, id).await?))
}

pub(super) async fn update(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ProposalId>,
    Payload(patch): Payload<ProposalPatch>,
) -> Result<Json<Proposal>, AppError> {
    Ok(Json(
        state.store.update_proposal(tenant.agency, id, patch).await?,
    ))
}

pub(super) async fn transition(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ProposalId>,
    Payload(body): Payload<TransitionRequest>,
) -> Result<Json<Proposal>, AppError> {
    let actor = tenant.actor()?;
    let proposal = state
        .store
        .transition_proposal(tenant.agency, id, body.status, actor, body.reason)
        .await?;
    Ok(Json(proposal))
}

pub(super) async fn allowed_transitions(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ProposalId>,
) -> Result<Json<AllowedTransitions>, AppError> {
    let proposal = state.store.get_proposal(tenant.agency, id).await?;
    Ok(Json(AllowedTransitions {
        status: proposal.status,
        allowed: state_machine::allowed_transitions(proposal.status),
    }))
}

pub(super) async fn duplicate(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ProposalId>,
) -> Result<(StatusCode, Json<Proposal>), AppError> {
    let user = tenant.user()?;
    let copy = state
        .store
        .duplicate_proposal(tenant.agency, id, user)
        .await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub(super) async fn history(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ProposalId>,
) -> Result<Json<Vec<StatusChange>>, AppError> {
    Ok(Json(state.store.history(tenant.agency, id).await?))
}

pub(super) async fn verify_history(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<ProposalId>,
) -> Result<Json<IntegrityReport>, AppError> {
    Ok(Json(state.store.verify_history(tenant.agency, id).await?))
}

/// Expire this agency's overdue proposals now
pub(super) async fn expire(
    State(state): State<AppState>,
    tenant: Tenant,
) -> Result<Json<Expired>, AppError> {
    let expired = state
        .store
        .expire_overdue(Some(tenant.agency), Utc::now())
        .await?;
    Ok(Json(Expired { expired }))
}
