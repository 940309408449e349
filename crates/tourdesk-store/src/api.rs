//! Operation traits implemented by [`crate::CrmStore`].
//!
//! Every method except agency creation is scoped by an [`AgencyId`]; records
//! owned by another agency are reported as not found.

use async_trait::async_trait;

use tourdesk_core::catalog::{BaseItemPatch, NewBaseItem, NewOperatorItem, OperatorItemPatch};
use tourdesk_core::{
    Actor, Agency, AgencyId, AgencyPatch, BaseItem, BaseItemId, Client, ClientFilter, ClientId,
    ClientPatch, Dashboard, Funnel, FunnelId, IntegrityReport, ItemCategory, NewAgency, NewClient,
    NewFunnel, NewProposal, NewStage, OperatorItem, OperatorItemId, Proposal, ProposalFilter,
    ProposalId, ProposalPatch, ProposalStatus, StageId, StatusChange, Timestamp, UserId,
};

use crate::error::StoreResult;

#[async_trait]
pub trait AgencyManager: Send + Sync {
    async fn create_agency(&self, input: NewAgency) -> StoreResult<Agency>;
    async fn get_agency(&self, id: AgencyId) -> StoreResult<Agency>;
    async fn update_agency_settings(&self, id: AgencyId, patch: AgencyPatch)
        -> StoreResult<Agency>;
}

#[async_trait]
pub trait FunnelManager: Send + Sync {
    /// The agency's first funnel becomes its default
    async fn create_funnel(&self, agency: AgencyId, input: NewFunnel) -> StoreResult<Funnel>;
    async fn list_funnels(&self, agency: AgencyId) -> StoreResult<Vec<Funnel>>;
    async fn get_funnel(&self, agency: AgencyId, id: FunnelId) -> StoreResult<Funnel>;
    async fn default_funnel(&self, agency: AgencyId) -> StoreResult<Option<Funnel>>;
    async fn add_stage(
        &self,
        agency: AgencyId,
        funnel: FunnelId,
        input: NewStage,
    ) -> StoreResult<Funnel>;
    async fn rename_stage(
        &self,
        agency: AgencyId,
        funnel: FunnelId,
        stage: StageId,
        name: String,
    ) -> StoreResult<Funnel>;
    async fn reorder_stages(
        &self,
        agency: AgencyId,
        funnel: FunnelId,
        order: Vec<StageId>,
    ) -> StoreResult<Funnel>;
    async fn remove_stage(
        &self,
        agency: AgencyId,
        funnel: FunnelId,
        stage: StageId,
    ) -> StoreResult<Funnel>;
    async fn set_default_funnel(&self, agency: AgencyId, funnel: FunnelId) -> StoreResult<Funnel>;
    async fn delete_funnel(&self, agency: AgencyId, funnel: FunnelId) -> StoreResult<()>;
}

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn create_client(&self, agency: AgencyId, input: NewClient) -> StoreResult<Client>;
    async fn update_client(
        &self,
        agency: AgencyId,
        id: ClientId,
        patch: ClientPatch,
    ) -> StoreResult<Client>;
    async fn get_client(&self, agency: AgencyId, id: ClientId) -> StoreResult<Client>;
    async fn delete_client(&self, agency: AgencyId, id: ClientId) -> StoreResult<()>;
    /// Ordered by name
    async fn list_clients(&self, agency: AgencyId, filter: &ClientFilter)
        -> StoreResult<Vec<Client>>;
    async fn move_client_to_stage(
        &self,
        agency: AgencyId,
        id: ClientId,
        stage: StageId,
    ) -> StoreResult<Client>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn create_base_item(&self, agency: AgencyId, input: NewBaseItem)
        -> StoreResult<BaseItem>;
    async fn update_base_item(
        &self,
        agency: AgencyId,
        id: BaseItemId,
        patch: BaseItemPatch,
    ) -> StoreResult<BaseItem>;
    async fn get_base_item(&self, agency: AgencyId, id: BaseItemId) -> StoreResult<BaseItem>;
    async fn list_base_items(
        &self,
        agency: AgencyId,
        category: Option<ItemCategory>,
    ) -> StoreResult<Vec<BaseItem>>;
    async fn deactivate_base_item(&self, agency: AgencyId, id: BaseItemId)
        -> StoreResult<BaseItem>;

    async fn create_operator_item(
        &self,
        agency: AgencyId,
        input: NewOperatorItem,
    ) -> StoreResult<OperatorItem>;
    async fn update_operator_item(
        &self,
        agency: AgencyId,
        id: OperatorItemId,
        patch: OperatorItemPatch,
    ) -> StoreResult<OperatorItem>;
    async fn get_operator_item(
        &self,
        agency: AgencyId,
        id: OperatorItemId,
    ) -> StoreResult<OperatorItem>;
    async fn list_operator_items(
        &self,
        agency: AgencyId,
        base: Option<BaseItemId>,
    ) -> StoreResult<Vec<OperatorItem>>;
    async fn deactivate_operator_item(
        &self,
        agency: AgencyId,
        id: OperatorItemId,
    ) -> StoreResult<OperatorItem>;
}

#[async_trait]
pub trait ProposalWorkflow: Send + Sync {
    async fn create_proposal(
        &self,
        agency: AgencyId,
        actor: UserId,
        input: NewProposal,
    ) -> StoreResult<Proposal>;
    /// Draft only
    async fn update_proposal(
        &self,
        agency: AgencyId,
        id: ProposalId,
        patch: ProposalPatch,
    ) -> StoreResult<Proposal>;
    async fn get_proposal(&self, agency: AgencyId, id: ProposalId) -> StoreResult<Proposal>;
    /// Newest first
    async fn list_proposals(
        &self,
        agency: AgencyId,
        filter: &ProposalFilter,
    ) -> StoreResult<Vec<Proposal>>;
    /// Status update and history entry commit together
    async fn transition_proposal(
        &self,
        agency: AgencyId,
        id: ProposalId,
        to: ProposalStatus,
        actor: Actor,
        reason: Option<String>,
    ) -> StoreResult<Proposal>;
    async fn duplicate_proposal(
        &self,
        agency: AgencyId,
        id: ProposalId,
        actor: UserId,
    ) -> StoreResult<Proposal>;
    /// Expire overdue proposals of one agency, or of all when `None`
    async fn expire_overdue(
        &self,
        agency: Option<AgencyId>,
        now: Timestamp,
    ) -> StoreResult<Vec<ProposalId>>;
}

#[async_trait]
pub trait StatusHistory: Send + Sync {
    /// Oldest first
    async fn history(&self, agency: AgencyId, proposal: ProposalId)
        -> StoreResult<Vec<StatusChange>>;
    async fn verify_history(
        &self,
        agency: AgencyId,
        proposal: ProposalId,
    ) -> StoreResult<IntegrityReport>;
}

#[async_trait]
pub trait Reporting: Send + Sync {
    async fn dashboard(&self, agency: AgencyId, now: Timestamp) -> StoreResult<Dashboard>;
}
