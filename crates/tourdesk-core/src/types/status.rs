use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Lifecycle status of a sales proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Sent,
    Approved,
    Contract,
    AwaitingPayment,
    ActiveBooking,
    Rejected,
    Expired,
    Cancelled,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 9] = [
        ProposalStatus::Draft,
        ProposalStatus::Sent,
        ProposalStatus::Approved,
        ProposalStatus::Contract,
        ProposalStatus::AwaitingPayment,
        ProposalStatus::ActiveBooking,
        ProposalStatus::Rejected,
        ProposalStatus::Expired,
        ProposalStatus::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::Sent => "sent",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Contract => "contract",
            ProposalStatus::AwaitingPayment => "awaiting_payment",
            ProposalStatus::ActiveBooking => "active_booking",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
            ProposalStatus::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// No transition leaves this status
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ProposalStatus::Cancelled)
    }

    /// Still being negotiated; counts toward the open pipeline
    #[inline]
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(
            self,
            ProposalStatus::Draft
                | ProposalStatus::Sent
                | ProposalStatus::Approved
                | ProposalStatus::Contract
                | ProposalStatus::AwaitingPayment
        )
    }

    #[inline]
    #[must_use]
    pub fn is_won(self) -> bool {
        matches!(self, ProposalStatus::ActiveBooking)
    }

    #[inline]
    #[must_use]
    pub fn is_lost(self) -> bool {
        matches!(
            self,
            ProposalStatus::Rejected | ProposalStatus::Expired | ProposalStatus::Cancelled
        )
    }

    /// Items, prices and discounts may only change while drafting
    #[inline]
    #[must_use]
    pub fn is_editable(self) -> bool {
        matches!(self, ProposalStatus::Draft)
    }

    /// Whether the validity deadline applies in this status
    #[inline]
    #[must_use]
    pub fn can_expire(self) -> bool {
        matches!(self, ProposalStatus::Sent | ProposalStatus::AwaitingPayment)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::Invalid {
            field: "status",
            reason: format!("unknown proposal status '{s}'"),
        })
    }
}
