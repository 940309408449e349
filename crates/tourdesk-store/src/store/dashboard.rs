use async_trait::async_trait;
use tracing::debug;

use tourdesk_core::{build_dashboard, AgencyId, Dashboard, Timestamp};

use super::CrmStore;
use crate::api::Reporting;
use crate::error::StoreResult;

#[async_trait]
impl Reporting for CrmStore {
    async fn dashboard(&self, agency: AgencyId, now: Timestamp) -> StoreResult<Dashboard> {
        // one connection so the three reads see the same snapshot
        let mut tx = self.pool.begin().await?;
        Self::ensure_agency(&mut tx, agency).await?;
        let clients = Self::load_clients(&mut tx, agency).await?;
        let funnel = Self::load_default_funnel(&mut tx, agency).await?;
        let proposals = Self::load_proposals(&mut tx, agency).await?;
        tx.commit().await?;

        let dashboard = build_dashboard(&clients, funnel.as_ref(), &proposals, now);
        debug!(
            %agency,
            clients = dashboard.client_count,
            proposals = proposals.len(),
            "dashboard built"
        );
        Ok(dashboard)
    }
}
