//! Sales proposals: content, pricing and lifecycle.
//!
//! A proposal is editable only while it is a draft. Every status change goes
//! through [`Proposal::transition`], which runs the state machine guard and
//! returns the [`StatusChange`] the caller must persist together with the
//! new status.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::calculator::{combine, line_totals, Discount, LineInput, LineTotals, ProposalTotals};
use crate::catalog::OperatorItem;
use crate::error::{CalculationError, CrmError, TransitionError, ValidationError};
use crate::history::StatusChange;
use crate::state_machine;
use crate::types::{
    Actor, AgencyId, ClientId, Currency, OperatorItemId, ProposalId, ProposalItemId,
    ProposalStatus, Timestamp, UserId,
};
use crate::validation::{optional_text, percentage, required_text};

/// Human-facing proposal number for the n-th proposal of an agency
#[must_use]
pub fn format_number(sequence: u64) -> String {
    format!("P-{sequence:06}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalItem {
    pub id: ProposalItemId,
    /// Catalog entry the line was priced from, if any
    pub operator_item_id: Option<OperatorItemId>,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount: Discount,
    pub commission_rate: Decimal,
    pub totals: LineTotals,
}

impl ProposalItem {
    #[must_use]
    pub fn line_input(&self) -> LineInput {
        LineInput {
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount: self.discount,
            commission_rate: self.commission_rate,
        }
    }
}

fn one() -> u32 {
    1
}

/// Line as submitted; catalog values fill whatever is left out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProposalItem {
    #[serde(default)]
    pub operator_item_id: Option<OperatorItemId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
}

impl NewProposalItem {
    /// Free-text line without a catalog entry
    #[must_use]
    pub fn custom(description: &str, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            operator_item_id: None,
            description: Some(description.to_string()),
            quantity,
            unit_price: Some(unit_price),
            discount: Discount::None,
            commission_rate: None,
        }
    }

    /// Line priced from the catalog
    #[must_use]
    pub fn from_catalog(operator_item_id: OperatorItemId, quantity: u32) -> Self {
        Self {
            operator_item_id: Some(operator_item_id),
            description: None,
            quantity,
            unit_price: None,
            discount: Discount::None,
            commission_rate: None,
        }
    }
}

/// Resolve submitted lines against the catalog and price them.
///
/// `catalog` must hold every referenced operator item of the agency;
/// `default_rate` applies to free-text lines without a rate.
pub fn build_items(
    inputs: Vec<NewProposalItem>,
    currency: &Currency,
    catalog: &HashMap<OperatorItemId, OperatorItem>,
    default_rate: Decimal,
) -> Result<Vec<ProposalItem>, CrmError> {
    inputs
        .into_iter()
        .map(|input| build_item(input, currency, catalog, default_rate))
        .collect()
}

fn build_item(
    input: NewProposalItem,
    currency: &Currency,
    catalog: &HashMap<OperatorItemId, OperatorItem>,
    default_rate: Decimal,
) -> Result<ProposalItem, CrmError> {
    let (description, unit_price, commission_rate) = match input.operator_item_id {
        Some(id) => {
            let offer = catalog
                .get(&id)
                .ok_or_else(|| CrmError::not_found("operator item", id))?;
            if !offer.active {
                return Err(CrmError::Conflict(format!(
                    "operator item '{}' is inactive",
                    offer.name
                )));
            }
            if &offer.currency != currency {
                return Err(CalculationError::CurrencyMismatch {
                    expected: currency.clone(),
                    actual: offer.currency.clone(),
                }
                .into());
            }
            (
                optional_text(input.description.as_deref())
                    .unwrap_or_else(|| format!("{} - {}", offer.name, offer.operator_name)),
                input.unit_price.unwrap_or(offer.price),
                input.commission_rate.unwrap_or(offer.commission_rate),
            )
        }
        None => (
            required_text("item description", input.description.as_deref().unwrap_or(""))?,
            input
                .unit_price
                .ok_or(ValidationError::Empty { field: "unit_price" })?,
            input.commission_rate.unwrap_or(default_rate),
        ),
    };
    percentage("commission_rate", commission_rate)?;

    let mut item = ProposalItem {
        id: ProposalItemId::new(),
        operator_item_id: input.operator_item_id,
        description,
        quantity: input.quantity,
        unit_price,
        discount: input.discount,
        commission_rate,
        totals: LineTotals::default(),
    };
    item.totals = line_totals(&item.line_input())?;
    Ok(item)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub agency_id: AgencyId,
    pub client_id: ClientId,
    /// `P-000042`, unique per agency
    pub number: String,
    pub title: String,
    pub currency: Currency,
    pub status: ProposalStatus,
    pub items: Vec<ProposalItem>,
    pub discount: Discount,
    pub totals: ProposalTotals,
    /// Offer deadline; sent or awaiting-payment proposals expire after it
    pub valid_until: Option<Timestamp>,
    pub travel_start: Option<NaiveDate>,
    pub travel_end: Option<NaiveDate>,
    pub notes: String,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub sent_at: Option<Timestamp>,
    pub approved_at: Option<Timestamp>,
    pub contract_signed_at: Option<Timestamp>,
    pub paid_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProposal {
    pub client_id: ClientId,
    pub title: String,
    /// Defaults to the agency currency
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub items: Vec<NewProposalItem>,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub valid_until: Option<Timestamp>,
    #[serde(default)]
    pub travel_start: Option<NaiveDate>,
    #[serde(default)]
    pub travel_end: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalPatch {
    #[serde(default)]
    pub title: Option<String>,
    /// Replaces every line when present
    #[serde(default)]
    pub items: Option<Vec<NewProposalItem>>,
    #[serde(default)]
    pub discount: Option<Discount>,
    #[serde(default)]
    pub valid_until: Option<Timestamp>,
    #[serde(default)]
    pub travel_start: Option<NaiveDate>,
    #[serde(default)]
    pub travel_end: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Values assigned by the storage layer when a draft is opened
#[derive(Debug, Clone)]
pub struct DraftContext {
    pub agency_id: AgencyId,
    pub sequence: u64,
    pub created_by: UserId,
    pub currency: Currency,
    pub now: Timestamp,
}

impl Proposal {
    /// New draft; `items` come from [`build_items`] in `ctx.currency`
    pub fn draft(
        ctx: DraftContext,
        input: NewProposal,
        items: Vec<ProposalItem>,
    ) -> Result<Self, CrmError> {
        check_travel_dates(input.travel_start, input.travel_end)?;
        input.discount.validate()?;

        let mut proposal = Self {
            id: ProposalId::new(),
            agency_id: ctx.agency_id,
            client_id: input.client_id,
            number: format_number(ctx.sequence),
            title: required_text("title", &input.title)?,
            currency: ctx.currency,
            status: ProposalStatus::Draft,
            items,
            discount: input.discount,
            totals: ProposalTotals::default(),
            valid_until: input.valid_until,
            travel_start: input.travel_start,
            travel_end: input.travel_end,
            notes: input.notes.unwrap_or_default().trim().to_string(),
            created_by: ctx.created_by,
            created_at: ctx.now,
            updated_at: ctx.now,
            sent_at: None,
            approved_at: None,
            contract_signed_at: None,
            paid_at: None,
            cancelled_at: None,
            rejection_reason: None,
            cancellation_reason: None,
        };
        proposal.recompute()?;
        Ok(proposal)
    }

    /// History entry that opens the chain (`∅ → draft`)
    #[must_use]
    pub fn opening_entry(&self) -> StatusChange {
        StatusChange::new(
            self.id,
            self.agency_id,
            None,
            ProposalStatus::Draft,
            Actor::User(self.created_by),
            None,
            self.created_at,
        )
    }

    pub fn ensure_editable(&self) -> Result<(), CrmError> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(CrmError::NotEditable {
                status: self.status,
            })
        }
    }

    /// Apply an edit; `items` are the resolved replacement lines, if any
    pub fn apply_patch(
        &mut self,
        patch: ProposalPatch,
        items: Option<Vec<ProposalItem>>,
        now: Timestamp,
    ) -> Result<(), CrmError> {
        self.ensure_editable()?;
        let title = patch
            .title
            .as_deref()
            .map(|t| required_text("title", t))
            .transpose()?;
        if let Some(discount) = &patch.discount {
            discount.validate()?;
        }
        check_travel_dates(
            patch.travel_start.or(self.travel_start),
            patch.travel_end.or(self.travel_end),
        )?;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(items) = items {
            self.items = items;
        }
        if let Some(discount) = patch.discount {
            self.discount = discount;
        }
        if patch.valid_until.is_some() {
            self.valid_until = patch.valid_until;
        }
        if patch.travel_start.is_some() {
            self.travel_start = patch.travel_start;
        }
        if patch.travel_end.is_some() {
            self.travel_end = patch.travel_end;
        }
        if let Some(notes) = patch.notes {
            self.notes = notes.trim().to_string();
        }
        self.updated_at = now;
        self.recompute()?;
        Ok(())
    }

    /// Move to `to` and return the history entry to persist with it
    pub fn transition(
        &mut self,
        to: ProposalStatus,
        actor: Actor,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<StatusChange, CrmError> {
        let from = self.status;
        state_machine::validate_transition(from, to)?;

        if to == ProposalStatus::Sent {
            if self.items.is_empty() {
                return Err(TransitionError::EmptyProposal.into());
            }
            if let Some(deadline) = self.valid_until.filter(|d| *d < now) {
                return Err(TransitionError::ValidityElapsed(deadline).into());
            }
        }

        let reason = optional_text(reason);
        match to {
            ProposalStatus::Draft => {
                self.rejection_reason = None;
            }
            ProposalStatus::Sent => self.sent_at = Some(now),
            ProposalStatus::Approved => self.approved_at = Some(now),
            ProposalStatus::Contract => self.contract_signed_at = Some(now),
            ProposalStatus::ActiveBooking => self.paid_at = Some(now),
            ProposalStatus::Rejected => self.rejection_reason.clone_from(&reason),
            ProposalStatus::Cancelled => {
                self.cancelled_at = Some(now);
                self.cancellation_reason.clone_from(&reason);
            }
            ProposalStatus::AwaitingPayment | ProposalStatus::Expired => {}
        }
        self.status = to;
        self.updated_at = now;

        debug!(proposal = %self.id, %from, %to, %actor, "proposal status changed");
        Ok(StatusChange::new(
            self.id,
            self.agency_id,
            Some(from),
            to,
            actor,
            reason,
            now,
        ))
    }

    /// Validity deadline passed while waiting on the client
    #[must_use]
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status.can_expire() && self.valid_until.is_some_and(|d| d < now)
    }

    /// Fresh draft with copies of every line
    #[must_use]
    pub fn duplicate(&self, ctx: DraftContext) -> Proposal {
        let items = self
            .items
            .iter()
            .map(|item| ProposalItem {
                id: ProposalItemId::new(),
                ..item.clone()
            })
            .collect();
        Proposal {
            id: ProposalId::new(),
            agency_id: ctx.agency_id,
            client_id: self.client_id,
            number: format_number(ctx.sequence),
            title: format!("{} (copy)", self.title),
            currency: self.currency.clone(),
            status: ProposalStatus::Draft,
            items,
            discount: self.discount,
            totals: self.totals,
            valid_until: None,
            travel_start: self.travel_start,
            travel_end: self.travel_end,
            notes: self.notes.clone(),
            created_by: ctx.created_by,
            created_at: ctx.now,
            updated_at: ctx.now,
            sent_at: None,
            approved_at: None,
            contract_signed_at: None,
            paid_at: None,
            cancelled_at: None,
            rejection_reason: None,
            cancellation_reason: None,
        }
    }

    fn recompute(&mut self) -> Result<(), CalculationError> {
        let lines: Vec<LineTotals> = self.items.iter().map(|i| i.totals).collect();
        self.totals = combine(&lines, self.discount)?;
        Ok(())
    }
}

fn check_travel_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(ValidationError::Invalid {
            field: "travel_end",
            reason: format!("{end} is before travel start {start}"),
        }),
        _ => Ok(()),
    }
}

/// List filter; every set field must match
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalFilter {
    #[serde(default)]
    pub status: Option<ProposalStatus>,
    #[serde(default, rename = "client")]
    pub client_id: Option<ClientId>,
    /// Case-insensitive match on number or title
    #[serde(default, rename = "q")]
    pub search: Option<String>,
}

impl ProposalFilter {
    #[must_use]
    pub fn matches(&self, proposal: &Proposal) -> bool {
        if self.status.is_some_and(|s| s != proposal.status) {
            return false;
        }
        if self.client_id.is_some_and(|c| c != proposal.client_id) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                proposal.number.to_lowercase().contains(&needle)
                    || proposal.title.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}
