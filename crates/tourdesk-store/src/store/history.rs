use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, warn};

use tourdesk_core::{
    verify_chain, Actor, AgencyId, ChainHash, CrmError, IntegrityReport, ProposalId,
    ProposalStatus, StatusChange,
};

use super::CrmStore;
use crate::api::StatusHistory;
use crate::error::{StoreError, StoreResult};
use crate::rows::{parse, parse_opt, timestamp, ts};

const COLUMNS: &str = "id, proposal_id, agency_id, from_status, to_status, changed_by, reason, \
                       changed_at, prev_hash, hash";

impl CrmStore {
    /// Seal `change` after the proposal's latest entry and insert it
    pub(super) async fn append_history(
        conn: &mut SqliteConnection,
        change: StatusChange,
    ) -> StoreResult<StatusChange> {
        let last = sqlx::query(
            "SELECT seq, hash FROM proposal_status_history
             WHERE proposal_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(change.proposal_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
        let (seq, prev) = match last {
            Some(row) => (row.try_get::<i64, _>("seq")? + 1, hash(&row, "hash")?),
            None => (0, ChainHash::GENESIS),
        };

        let entry = change.seal(prev);
        sqlx::query(
            "INSERT INTO proposal_status_history (id, proposal_id, agency_id, seq, from_status,
                to_status, changed_by, reason, changed_at, prev_hash, hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.proposal_id.to_string())
        .bind(entry.agency_id.to_string())
        .bind(seq)
        .bind(entry.from_status.map(ProposalStatus::as_str))
        .bind(entry.to_status.as_str())
        .bind(entry.changed_by.to_key())
        .bind(entry.reason.as_deref())
        .bind(ts(&entry.changed_at))
        .bind(entry.prev_hash.to_hex())
        .bind(entry.hash.to_hex())
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            StoreError::on_unique(err, || {
                CrmError::Conflict("proposal status changed concurrently".to_string())
            })
        })?;
        Ok(entry)
    }

    async fn load_history(
        conn: &mut SqliteConnection,
        agency: AgencyId,
        proposal: ProposalId,
    ) -> StoreResult<(ProposalStatus, Vec<StatusChange>)> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM proposals WHERE id = ? AND agency_id = ?")
                .bind(proposal.to_string())
                .bind(agency.to_string())
                .fetch_optional(&mut *conn)
                .await?;
        let status = status.ok_or_else(|| CrmError::not_found("proposal", proposal))?;
        let status: ProposalStatus = status
            .parse()
            .map_err(|err| StoreError::Decode(format!("invalid proposal status: {err}")))?;

        let entries = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM proposal_status_history WHERE proposal_id = ? ORDER BY seq"
        ))
        .bind(proposal.to_string())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(entry_from_row)
        .collect::<StoreResult<Vec<_>>>()?;
        Ok((status, entries))
    }
}

#[async_trait]
impl StatusHistory for CrmStore {
    async fn history(
        &self,
        agency: AgencyId,
        proposal: ProposalId,
    ) -> StoreResult<Vec<StatusChange>> {
        let mut conn = self.pool.acquire().await?;
        let (_, entries) = Self::load_history(&mut conn, agency, proposal).await?;
        debug!(%agency, %proposal, entries = entries.len(), "history loaded");
        Ok(entries)
    }

    async fn verify_history(
        &self,
        agency: AgencyId,
        proposal: ProposalId,
    ) -> StoreResult<IntegrityReport> {
        let mut conn = self.pool.acquire().await?;
        let (status, entries) = Self::load_history(&mut conn, agency, proposal).await?;

        let mut report = verify_chain(&entries);
        // the chain must end where the proposal is now
        if report.valid && entries.last().map(|e| e.to_status) != Some(status) {
            let index = entries.len().saturating_sub(1);
            report = IntegrityReport {
                valid: false,
                entries_checked: entries.len(),
                first_invalid_index: Some(index),
            };
        }
        if !report.valid {
            warn!(%agency, %proposal, index = ?report.first_invalid_index, "status history does not verify");
        }
        Ok(report)
    }
}

fn hash(row: &SqliteRow, column: &str) -> StoreResult<ChainHash> {
    let raw: String = row.try_get(column)?;
    ChainHash::from_hex(&raw)
        .map_err(|err| StoreError::Decode(format!("invalid {column} '{raw}': {err}")))
}

fn entry_from_row(row: &SqliteRow) -> StoreResult<StatusChange> {
    let actor: String = row.try_get("changed_by")?;
    Ok(StatusChange {
        id: parse(row, "id")?,
        proposal_id: parse(row, "proposal_id")?,
        agency_id: parse(row, "agency_id")?,
        from_status: parse_opt(row, "from_status")?,
        to_status: parse(row, "to_status")?,
        changed_by: Actor::from_key(&actor)
            .ok_or_else(|| StoreError::Decode(format!("invalid changed_by '{actor}'")))?,
        reason: row.try_get("reason")?,
        changed_at: timestamp(row, "changed_at")?,
        prev_hash: hash(row, "prev_hash")?,
        hash: hash(row, "hash")?,
    })
}
