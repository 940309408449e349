use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use tourdesk_core::proposal::build_items;
use tourdesk_core::{
    Actor, AgencyId, CrmError, DraftContext, NewProposal, Proposal, ProposalFilter, ProposalId,
    ProposalItem, ProposalPatch, ProposalStatus, Timestamp, UserId,
};

use super::CrmStore;
use crate::api::ProposalWorkflow;
use crate::error::{StoreError, StoreResult};
use crate::rows::{
    from_json, json, opt_date, opt_timestamp, opt_ts, parse, parse_opt, timestamp, ts, unsigned,
};

const COLUMNS: &str = "id, agency_id, client_id, number, title, currency, status, discount, totals, \
                       valid_until, travel_start, travel_end, notes, created_by, created_at, \
                       updated_at, sent_at, approved_at, contract_signed_at, paid_at, \
                       cancelled_at, rejection_reason, cancellation_reason";

const ITEM_COLUMNS: &str = "i.id, i.proposal_id, i.operator_item_id, i.description, i.quantity, \
                            i.unit_price, i.discount, i.commission_rate, i.totals";

impl CrmStore {
    pub(super) async fn load_proposal(
        conn: &mut SqliteConnection,
        agency: AgencyId,
        id: ProposalId,
    ) -> StoreResult<Proposal> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM proposals WHERE id = ? AND agency_id = ?"
        ))
        .bind(id.to_string())
        .bind(agency.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CrmError::not_found("proposal", id))?;

        let items = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM proposal_items i WHERE i.proposal_id = ? ORDER BY i.position"
        ))
        .bind(id.to_string())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(item_from_row)
        .collect::<StoreResult<Vec<_>>>()?;

        proposal_from_row(&row, items)
    }

    /// Every proposal of the agency, newest first
    pub(super) async fn load_proposals(
        conn: &mut SqliteConnection,
        agency: AgencyId,
    ) -> StoreResult<Vec<Proposal>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM proposals WHERE agency_id = ? ORDER BY seq DESC"
        ))
        .bind(agency.to_string())
        .fetch_all(&mut *conn)
        .await?;

        let mut items: HashMap<ProposalId, Vec<ProposalItem>> = HashMap::new();
        let item_rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM proposal_items i
             JOIN proposals p ON p.id = i.proposal_id
             WHERE p.agency_id = ? ORDER BY i.proposal_id, i.position"
        ))
        .bind(agency.to_string())
        .fetch_all(&mut *conn)
        .await?;
        for row in &item_rows {
            let proposal: ProposalId = parse(row, "proposal_id")?;
            items.entry(proposal).or_default().push(item_from_row(row)?);
        }

        rows.iter()
            .map(|row| {
                let id: ProposalId = parse(row, "id")?;
                proposal_from_row(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn next_sequence(conn: &mut SqliteConnection, agency: AgencyId) -> StoreResult<u64> {
        let next: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM proposals WHERE agency_id = ?")
                .bind(agency.to_string())
                .fetch_one(&mut *conn)
                .await?;
        u64::try_from(next).map_err(|_| StoreError::Decode(format!("invalid proposal sequence {next}")))
    }

    /// Insert a new draft with its lines and opening history entry
    async fn insert_proposal(
        conn: &mut SqliteConnection,
        proposal: &Proposal,
        sequence: u64,
    ) -> StoreResult<()> {
        let seq = i64::try_from(sequence)
            .map_err(|_| StoreError::Decode(format!("invalid proposal sequence {sequence}")))?;
        sqlx::query(
            "INSERT INTO proposals (id, agency_id, client_id, seq, number, title, currency, status,
                discount, totals, valid_until, travel_start, travel_end, notes, created_by,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(proposal.id.to_string())
        .bind(proposal.agency_id.to_string())
        .bind(proposal.client_id.to_string())
        .bind(seq)
        .bind(&proposal.number)
        .bind(&proposal.title)
        .bind(proposal.currency.as_str())
        .bind(proposal.status.as_str())
        .bind(json(&proposal.discount)?)
        .bind(json(&proposal.totals)?)
        .bind(opt_ts(proposal.valid_until.as_ref()))
        .bind(proposal.travel_start.map(|d| d.to_string()))
        .bind(proposal.travel_end.map(|d| d.to_string()))
        .bind(&proposal.notes)
        .bind(proposal.created_by.to_string())
        .bind(ts(&proposal.created_at))
        .bind(ts(&proposal.updated_at))
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            StoreError::on_unique(err, || {
                CrmError::Conflict(format!("proposal number {} already taken", proposal.number))
            })
        })?;

        Self::replace_items(conn, proposal).await?;
        Self::append_history(conn, proposal.opening_entry()).await?;
        Ok(())
    }

    async fn replace_items(conn: &mut SqliteConnection, proposal: &Proposal) -> StoreResult<()> {
        sqlx::query("DELETE FROM proposal_items WHERE proposal_id = ?")
            .bind(proposal.id.to_string())
            .execute(&mut *conn)
            .await?;
        for (position, item) in (0_i64..).zip(&proposal.items) {
            sqlx::query(
                "INSERT INTO proposal_items (id, proposal_id, position, operator_item_id,
                    description, quantity, unit_price, discount, commission_rate, totals)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(item.id.to_string())
            .bind(proposal.id.to_string())
            .bind(position)
            .bind(item.operator_item_id.map(|id| id.to_string()))
            .bind(&item.description)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.to_string())
            .bind(json(&item.discount)?)
            .bind(item.commission_rate.to_string())
            .bind(json(&item.totals)?)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn save_content(conn: &mut SqliteConnection, proposal: &Proposal) -> StoreResult<()> {
        sqlx::query(
            "UPDATE proposals SET title = ?, discount = ?, totals = ?, valid_until = ?,
                travel_start = ?, travel_end = ?, notes = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(&proposal.title)
        .bind(json(&proposal.discount)?)
        .bind(json(&proposal.totals)?)
        .bind(opt_ts(proposal.valid_until.as_ref()))
        .bind(proposal.travel_start.map(|d| d.to_string()))
        .bind(proposal.travel_end.map(|d| d.to_string()))
        .bind(&proposal.notes)
        .bind(ts(&proposal.updated_at))
        .bind(proposal.id.to_string())
        .bind(ProposalStatus::Draft.as_str())
        .execute(&mut *conn)
        .await?;
        Self::replace_items(conn, proposal).await
    }

    /// Status columns are written only if the row still holds `expected`
    async fn save_status(
        conn: &mut SqliteConnection,
        proposal: &Proposal,
        expected: ProposalStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE proposals SET status = ?, updated_at = ?, sent_at = ?, approved_at = ?,
                contract_signed_at = ?, paid_at = ?, cancelled_at = ?, rejection_reason = ?,
                cancellation_reason = ?
             WHERE id = ? AND status = ?",
        )
        .bind(proposal.status.as_str())
        .bind(ts(&proposal.updated_at))
        .bind(opt_ts(proposal.sent_at.as_ref()))
        .bind(opt_ts(proposal.approved_at.as_ref()))
        .bind(opt_ts(proposal.contract_signed_at.as_ref()))
        .bind(opt_ts(proposal.paid_at.as_ref()))
        .bind(opt_ts(proposal.cancelled_at.as_ref()))
        .bind(proposal.rejection_reason.as_deref())
        .bind(proposal.cancellation_reason.as_deref())
        .bind(proposal.id.to_string())
        .bind(expected.as_str())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CrmError::Conflict(format!(
                "proposal {} is no longer {expected}",
                proposal.number
            ))
            .into());
        }
        Ok(())
    }

    /// Guarded status change plus history entry, one transaction
    async fn apply_transition(
        &self,
        agency: AgencyId,
        id: ProposalId,
        to: ProposalStatus,
        actor: Actor,
        reason: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<Proposal> {
        let mut tx = self.begin_write().await?;
        let mut proposal = Self::load_proposal(&mut tx, agency, id).await?;
        let from = proposal.status;

        let change = match proposal.transition(to, actor, reason, now) {
            Ok(change) => change,
            Err(err) => {
                warn!(%agency, proposal = %id, %from, %to, error = %err, "transition rejected");
                return Err(err.into());
            }
        };
        Self::save_status(&mut tx, &proposal, from).await?;
        let entry = Self::append_history(&mut tx, change).await?;
        tx.commit().await?;

        info!(
            %agency,
            proposal = %id,
            number = %proposal.number,
            %from,
            %to,
            actor = %actor,
            hash = %entry.hash.to_hex(),
            "proposal status changed"
        );
        Ok(proposal)
    }
}

#[async_trait]
impl ProposalWorkflow for CrmStore {
    async fn create_proposal(
        &self,
        agency: AgencyId,
        actor: UserId,
        mut input: NewProposal,
    ) -> StoreResult<Proposal> {
        let mut tx = self.begin_write().await?;
        let settings = Self::load_agency(&mut tx, agency).await?;
        Self::load_client(&mut tx, agency, input.client_id).await?;

        let currency = input
            .currency
            .clone()
            .unwrap_or_else(|| settings.default_currency.clone());
        let lines = std::mem::take(&mut input.items);
        let catalog = Self::load_operator_items(
            &mut tx,
            agency,
            lines.iter().filter_map(|l| l.operator_item_id),
        )
        .await?;
        let items = build_items(lines, &currency, &catalog, settings.default_commission_rate)?;

        let sequence = Self::next_sequence(&mut tx, agency).await?;
        let proposal = Proposal::draft(
            DraftContext {
                agency_id: agency,
                sequence,
                created_by: actor,
                currency,
                now: Self::now(),
            },
            input,
            items,
        )?;
        Self::insert_proposal(&mut tx, &proposal, sequence).await?;
        tx.commit().await?;

        info!(
            %agency,
            proposal = %proposal.id,
            number = %proposal.number,
            total = %proposal.totals.total,
            currency = %proposal.currency,
            "proposal created"
        );
        Ok(proposal)
    }

    async fn update_proposal(
        &self,
        agency: AgencyId,
        id: ProposalId,
        mut patch: ProposalPatch,
    ) -> StoreResult<Proposal> {
        let mut tx = self.begin_write().await?;
        let mut proposal = Self::load_proposal(&mut tx, agency, id).await?;
        proposal.ensure_editable()?;

        let items = match patch.items.take() {
            Some(lines) => {
                let settings = Self::load_agency(&mut tx, agency).await?;
                let catalog = Self::load_operator_items(
                    &mut tx,
                    agency,
                    lines.iter().filter_map(|l| l.operator_item_id),
                )
                .await?;
                Some(build_items(
                    lines,
                    &proposal.currency,
                    &catalog,
                    settings.default_commission_rate,
                )?)
            }
            None => None,
        };
        proposal.apply_patch(patch, items, Self::now())?;
        Self::save_content(&mut tx, &proposal).await?;
        tx.commit().await?;

        info!(%agency, proposal = %id, total = %proposal.totals.total, "proposal updated");
        Ok(proposal)
    }

    async fn get_proposal(&self, agency: AgencyId, id: ProposalId) -> StoreResult<Proposal> {
        let mut conn = self.pool.acquire().await?;
        Self::load_proposal(&mut conn, agency, id).await
    }

    async fn list_proposals(
        &self,
        agency: AgencyId,
        filter: &ProposalFilter,
    ) -> StoreResult<Vec<Proposal>> {
        let mut conn = self.pool.acquire().await?;
        let mut proposals = Self::load_proposals(&mut conn, agency).await?;
        proposals.retain(|p| filter.matches(p));
        debug!(%agency, count = proposals.len(), "proposals listed");
        Ok(proposals)
    }

    async fn transition_proposal(
        &self,
        agency: AgencyId,
        id: ProposalId,
        to: ProposalStatus,
        actor: Actor,
        reason: Option<String>,
    ) -> StoreResult<Proposal> {
        self.apply_transition(agency, id, to, actor, reason.as_deref(), Self::now())
            .await
    }

    async fn duplicate_proposal(
        &self,
        agency: AgencyId,
        id: ProposalId,
        actor: UserId,
    ) -> StoreResult<Proposal> {
        let mut tx = self.begin_write().await?;
        let source = Self::load_proposal(&mut tx, agency, id).await?;
        let sequence = Self::next_sequence(&mut tx, agency).await?;
        let copy = source.duplicate(DraftContext {
            agency_id: agency,
            sequence,
            created_by: actor,
            currency: source.currency.clone(),
            now: Self::now(),
        });
        Self::insert_proposal(&mut tx, &copy, sequence).await?;
        tx.commit().await?;

        info!(%agency, source = %source.number, copy = %copy.number, "proposal duplicated");
        Ok(copy)
    }

    async fn expire_overdue(
        &self,
        agency: Option<AgencyId>,
        now: Timestamp,
    ) -> StoreResult<Vec<ProposalId>> {
        let scope = agency.map(|a| a.to_string());
        let candidates = sqlx::query(
            "SELECT id, agency_id FROM proposals
             WHERE status IN (?, ?) AND valid_until IS NOT NULL AND valid_until < ?
               AND (? IS NULL OR agency_id = ?)
             ORDER BY valid_until",
        )
        .bind(ProposalStatus::Sent.as_str())
        .bind(ProposalStatus::AwaitingPayment.as_str())
        .bind(ts(&now))
        .bind(scope.as_deref())
        .bind(scope.as_deref())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> StoreResult<(AgencyId, ProposalId)> {
            Ok((parse(row, "agency_id")?, parse(row, "id")?))
        })
        .collect::<StoreResult<Vec<_>>>()?;

        let mut expired = Vec::with_capacity(candidates.len());
        for (owner, id) in candidates {
            match self
                .apply_transition(owner, id, ProposalStatus::Expired, Actor::System, None, now)
                .await
            {
                Ok(_) => expired.push(id),
                // changed or locked by another writer since the scan
                Err(err) if err.is_conflict() => {
                    debug!(proposal = %id, error = %err, "skipping expiry");
                }
                Err(err) => return Err(err),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "overdue proposals expired");
        }
        Ok(expired)
    }
}

fn proposal_from_row(row: &SqliteRow, items: Vec<ProposalItem>) -> StoreResult<Proposal> {
    Ok(Proposal {
        id: parse(row, "id")?,
        agency_id: parse(row, "agency_id")?,
        client_id: parse(row, "client_id")?,
        number: row.try_get("number")?,
        title: row.try_get("title")?,
        currency: parse(row, "currency")?,
        status: parse(row, "status")?,
        items,
        discount: from_json(row, "discount")?,
        totals: from_json(row, "totals")?,
        valid_until: opt_timestamp(row, "valid_until")?,
        travel_start: opt_date(row, "travel_start")?,
        travel_end: opt_date(row, "travel_end")?,
        notes: row.try_get("notes")?,
        created_by: parse(row, "created_by")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        sent_at: opt_timestamp(row, "sent_at")?,
        approved_at: opt_timestamp(row, "approved_at")?,
        contract_signed_at: opt_timestamp(row, "contract_signed_at")?,
        paid_at: opt_timestamp(row, "paid_at")?,
        cancelled_at: opt_timestamp(row, "cancelled_at")?,
        rejection_reason: row.try_get("rejection_reason")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
    })
}

fn item_from_row(row: &SqliteRow) -> StoreResult<ProposalItem> {
    Ok(ProposalItem {
        id: parse(row, "id")?,
        operator_item_id: parse_opt(row, "operator_item_id")?,
        description: row.try_get("description")?,
        quantity: unsigned(row, "quantity")?,
        unit_price: parse(row, "unit_price")?,
        discount: from_json(row, "discount")?,
        commission_rate: parse(row, "commission_rate")?,
        totals: from_json(row, "totals")?,
    })
}
