use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use tourdesk_core::{ProposalId, Timestamp};
use tourdesk_store::{CrmStore, StoreResult};

/// Outcome of the most recent expiry sweep, reported by `/health`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStatus {
    pub last_run: Option<Timestamp>,
    pub last_expired: usize,
    pub total_expired: u64,
    pub last_error: Option<String>,
}

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: CrmStore,
    sweep: Arc<Mutex<SweepStatus>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: CrmStore) -> Self {
        Self {
            store,
            sweep: Arc::new(Mutex::new(SweepStatus::default())),
        }
    }

    #[must_use]
    pub fn sweep_status(&self) -> SweepStatus {
        self.sweep.lock().clone()
    }

    pub(crate) fn record_sweep(&self, now: Timestamp, result: &StoreResult<Vec<ProposalId>>) {
        let mut status = self.sweep.lock();
        status.last_run = Some(now);
        match result {
            Ok(expired) => {
                status.last_expired = expired.len();
                status.total_expired += expired.len() as u64;
                status.last_error = None;
            }
            Err(err) => {
                status.last_expired = 0;
                status.last_error = Some(err.to_string());
            }
        }
    }
}
