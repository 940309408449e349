//! Tourdesk Core - domain model of a travel agency CRM
//!
//! Pure, storage-free logic:
//! - agencies, sales funnels, clients and the product catalog
//! - the proposal status state machine
//! - pricing (discounts, commissions, totals) in decimal arithmetic
//! - the hash-chained proposal status history
//! - dashboard aggregation
//!
//! # Example
//!
//! ```rust
//! use tourdesk_core::{state_machine, ProposalStatus};
//!
//! assert!(state_machine::is_valid_transition(ProposalStatus::Draft, ProposalStatus::Sent));
//! assert!(state_machine::validate_transition(ProposalStatus::Cancelled, ProposalStatus::Draft).is_err());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod agency;
pub mod calculator;
pub mod catalog;
pub mod client;
pub mod dashboard;
pub mod error;
pub mod funnel;
pub mod history;
pub mod proposal;
pub mod state_machine;
pub mod types;
pub mod validation;

pub use agency::{Agency, AgencyPatch, NewAgency};
pub use calculator::{quote, Discount, LineInput, LineTotals, ProposalTotals, Quote, QuoteRequest};
pub use catalog::{
    BaseItem, BaseItemPatch, CatalogDefaults, FieldDefinition, FieldKind, ItemCategory,
    NewBaseItem, NewOperatorItem, OperatorItem, OperatorItemPatch,
};
pub use client::{Client, ClientFilter, ClientPatch, LeadSource, NewClient, Placement};
pub use dashboard::{build_dashboard, Dashboard};
pub use error::{CalculationError, CrmError, TransitionError, ValidationError};
pub use funnel::{Funnel, NewFunnel, NewStage, Stage};
pub use history::{verify_chain, ChainHash, IntegrityReport, StatusChange};
pub use proposal::{
    DraftContext, NewProposal, NewProposalItem, Proposal, ProposalFilter, ProposalItem,
    ProposalPatch,
};
pub use types::{
    Actor, AgencyId, BaseItemId, ClientId, Currency, FunnelId, HistoryEntryId, OperatorItemId,
    ProposalId, ProposalItemId, ProposalStatus, StageId, Timestamp, UserId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Tourdesk Core
    pub use crate::{
        Actor, AgencyId, ClientId, CrmError, Currency, Discount, Proposal, ProposalId,
        ProposalStatus, StatusChange, UserId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
