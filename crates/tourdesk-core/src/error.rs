//! Error types for Tourdesk core
//!
//! - Input validation failures
//! - Illegal proposal status transitions
//! - Pricing/calculation failures
//! - Lookups that cross the tenant boundary or miss entirely

use rust_decimal::Decimal;

use crate::types::{Currency, ProposalStatus, Timestamp};

/// Main domain error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrmError {
    /// Entity missing or owned by another agency
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Rejected input
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Proposal status guard refused the change
    #[error("invalid transition: {0}")]
    Transition(#[from] TransitionError),

    /// Pricing inputs out of range
    #[error("calculation failed: {0}")]
    Calculation(#[from] CalculationError),

    /// Proposal content is frozen outside of draft
    #[error("proposal is {status} and can no longer be edited")]
    NotEditable { status: ProposalStatus },

    /// Operation conflicts with existing records
    #[error("conflict: {0}")]
    Conflict(String),

    /// History chain does not verify
    #[error("status history integrity violation at entry {index}")]
    HistoryIntegrity { index: usize },
}

impl CrmError {
    #[inline]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Maps to HTTP 409: the request was well-formed but the current state refuses it
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Transition(_)
                | Self::NotEditable { .. }
                | Self::Conflict(_)
                | Self::HistoryIntegrity { .. }
        )
    }

    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Calculation(_))
    }

    /// Short machine-readable tag
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation",
            Self::Transition(_) => "invalid_transition",
            Self::Calculation(_) => "calculation",
            Self::NotEditable { .. } => "not_editable",
            Self::Conflict(_) => "conflict",
            Self::HistoryIntegrity { .. } => "history_integrity",
        }
    }
}

/// Input validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: Decimal,
        max: Decimal,
        value: Decimal,
    },

    #[error("{field} '{value}' is already in use")]
    Duplicate { field: &'static str, value: String },
}

/// Status transition errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move a proposal from {from} to {to}")]
    Illegal {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("a proposal needs at least one item before it is sent")]
    EmptyProposal,

    #[error("proposal validity ended at {0}")]
    ValidityElapsed(Timestamp),
}

/// Pricing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalculationError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("unit price must not be negative, got {0}")]
    NegativePrice(Decimal),

    #[error("{field} must be between 0 and 100, got {value}")]
    RateOutOfRange { field: &'static str, value: Decimal },

    #[error("discount amount must not be negative, got {0}")]
    NegativeDiscount(Decimal),

    #[error("currency mismatch: proposal is {expected}, item is {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// A product or sum does not fit in a decimal
    #[error("amount is too large to price")]
    Overflow,
}
