use tourdesk_core::state_machine::{allowed_transitions, is_valid_transition, validate_transition};
use tourdesk_core::ProposalStatus;
use proptest::prelude::*;

fn any_status() -> impl Strategy<Value = ProposalStatus> {
    prop_oneof![
        Just(ProposalStatus::Draft),
        Just(ProposalStatus::Sent),
        Just(ProposalStatus::Approved),
        Just(ProposalStatus::Contract),
        Just(ProposalStatus::AwaitingPayment),
        Just(ProposalStatus::ActiveBooking),
        Just(ProposalStatus::Rejected),
        Just(ProposalStatus::Expired),
        Just(ProposalStatus::Cancelled),
    ]
}

#[test]
fn test_draft_transitions() {
    assert!(validate_transition(ProposalStatus::Draft, ProposalStatus::Sent).is_ok());
    assert!(validate_transition(ProposalStatus::Draft, ProposalStatus::Cancelled).is_ok());

    // Invalid
    assert!(validate_transition(ProposalStatus::Draft, ProposalStatus::Approved).is_err());
    assert!(validate_transition(ProposalStatus::Draft, ProposalStatus::ActiveBooking).is_err());
}

#[test]
fn test_payment_transitions() {
    assert!(validate_transition(ProposalStatus::AwaitingPayment, ProposalStatus::ActiveBooking).is_ok());
    assert!(validate_transition(ProposalStatus::AwaitingPayment, ProposalStatus::Expired).is_ok());

    assert!(validate_transition(ProposalStatus::AwaitingPayment, ProposalStatus::Rejected).is_err());
    assert!(validate_transition(ProposalStatus::Contract, ProposalStatus::ActiveBooking).is_err());
}

#[test]
fn test_cancelled_is_terminal() {
    assert!(allowed_transitions(ProposalStatus::Cancelled).is_empty());
    assert!(ProposalStatus::Cancelled.is_terminal());
}

#[test]
fn test_lost_proposals_reopen_as_draft() {
    for from in [ProposalStatus::Rejected, ProposalStatus::Expired] {
        assert_eq!(allowed_transitions(from), vec![ProposalStatus::Draft]);
    }
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_status(), to in any_status()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        prop_assert_eq!(res.is_ok(), allowed.contains(&to));
        prop_assert_eq!(res.is_ok(), is_valid_transition(from, to));
    }

    #[test]
    fn prop_no_self_transitions(status in any_status()) {
        prop_assert!(!is_valid_transition(status, status));
    }

    #[test]
    fn prop_every_status_but_cancelled_can_move(status in any_status()) {
        prop_assert_eq!(allowed_transitions(status).is_empty(), status.is_terminal());
    }

    #[test]
    fn prop_editable_only_in_draft(status in any_status()) {
        prop_assert_eq!(status.is_editable(), status == ProposalStatus::Draft);
    }

    #[test]
    fn prop_random_walk_stays_on_table(steps in prop::collection::vec(0usize..16, 0..24)) {
        let mut status = ProposalStatus::Draft;
        for pick in steps {
            let next = allowed_transitions(status);
            if next.is_empty() {
                break;
            }
            let to = next[pick % next.len()];
            prop_assert!(validate_transition(status, to).is_ok());
            status = to;
        }
        prop_assert!(ProposalStatus::ALL.contains(&status));
    }
}
