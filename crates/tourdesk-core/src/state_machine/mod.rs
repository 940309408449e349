use crate::error::TransitionError;
use crate::types::ProposalStatus;

/// Validates a status transition.
///
/// Callers must run this before writing a new status; the proposal and its
/// history are only touched when it returns `Ok`.
pub fn validate_transition(from: ProposalStatus, to: ProposalStatus) -> Result<(), TransitionError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError::Illegal { from, to })
    }
}

pub fn allowed_transitions(from: ProposalStatus) -> Vec<ProposalStatus> {
    use ProposalStatus::*;
    match from {
        Draft => vec![Sent, Cancelled],
        Sent => vec![Approved, Rejected, Expired, Cancelled, Draft],
        Approved => vec![Contract, Cancelled],
        Contract => vec![AwaitingPayment, Cancelled],
        AwaitingPayment => vec![ActiveBooking, Expired, Cancelled],
        ActiveBooking => vec![Cancelled],
        Rejected => vec![Draft],
        Expired => vec![Draft],
        Cancelled => vec![],
    }
}

pub fn is_valid_transition(from: ProposalStatus, to: ProposalStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
