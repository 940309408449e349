//! Periodic expiry of overdue proposals across all agencies.

use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use tourdesk_core::{ProposalId, Timestamp};
use tourdesk_store::{ProposalWorkflow, StoreResult};

use crate::state::AppState;

/// Run one sweep at `now` and record it in the shared status
pub async fn sweep_once(state: &AppState, now: Timestamp) -> StoreResult<Vec<ProposalId>> {
    let result = state.store.expire_overdue(None, now).await;
    state.record_sweep(now, &result);
    result
}

/// Sweep every `every`, starting immediately
pub fn spawn(state: AppState, every: Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs(), "expiry sweeper started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_once(&state, Utc::now()).await {
                Ok(expired) if expired.is_empty() => debug!("expiry sweep found nothing"),
                Ok(expired) => info!(count = expired.len(), "expiry sweep finished"),
                Err(err) => error!(error = %err, "expiry sweep failed"),
            }
        }
    })
}
