use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use tourdesk_core::{
    Actor, AgencyPatch, ClientFilter, ClientPatch, CrmError, Currency, Discount, NewClient,
    NewFunnel, NewProposalItem, NewStage, ProposalFilter, ProposalPatch, ProposalStatus,
    TransitionError, ValidationError,
};
use tourdesk_store::{
    connect, migrations, AgencyManager, Catalog, ClientDirectory, CrmStore, FunnelManager,
    ProposalWorkflow, Reporting, StatusHistory,
};
use tourdesk_test_utils::{draft_input, seed, seeded_store, Seed, STAGES};

async fn send(store: &CrmStore, seed: &Seed, title: &str) -> tourdesk_core::Proposal {
    let draft = store
        .create_proposal(seed.agency.id, seed.user, seed.trip(title))
        .await
        .expect("create proposal");
    store
        .transition_proposal(
            seed.agency.id,
            draft.id,
            ProposalStatus::Sent,
            Actor::User(seed.user),
            None,
        )
        .await
        .expect("send proposal")
}

// ---------------------------------------------------------------------------
// Agencies and tenancy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn agency_settings_update() {
    let (store, seed) = seeded_store().await;
    let updated = store
        .update_agency_settings(
            seed.agency.id,
            AgencyPatch {
                default_currency: Some(Currency::new("usd").expect("currency")),
                default_commission_rate: Some(dec!(15)),
                ..Default::default()
            },
        )
        .await
        .expect("update settings");
    assert_eq!(updated.default_currency.as_str(), "USD");

    let reloaded = store.get_agency(seed.agency.id).await.expect("get agency");
    assert_eq!(reloaded.default_commission_rate, dec!(15));
}

#[tokio::test]
async fn commission_rate_above_hundred_is_rejected() {
    let (store, seed) = seeded_store().await;
    let err = store
        .update_agency_settings(
            seed.agency.id,
            AgencyPatch {
                default_commission_rate: Some(dec!(101)),
                ..Default::default()
            },
        )
        .await
        .expect_err("rate out of range");
    assert!(err.is_validation(), "{err}");
}

#[tokio::test]
async fn records_are_invisible_to_other_agencies() {
    let (store, mine) = seeded_store().await;
    let theirs = seed(&store, "Mar Turismo").await;
    let proposal = store
        .create_proposal(mine.agency.id, mine.user, mine.trip("Beach week"))
        .await
        .expect("create proposal");

    let err = store
        .get_client(theirs.agency.id, mine.client.id)
        .await
        .expect_err("foreign client");
    assert!(err.is_not_found());
    let err = store
        .get_proposal(theirs.agency.id, proposal.id)
        .await
        .expect_err("foreign proposal");
    assert!(err.is_not_found());
    let err = store
        .get_operator_item(theirs.agency.id, mine.hotel.id)
        .await
        .expect_err("foreign catalog item");
    assert!(err.is_not_found());

    let listed = store
        .list_proposals(theirs.agency.id, &ProposalFilter::default())
        .await
        .expect("list");
    assert!(listed.is_empty());
}

#[tokio::test]
async fn foreign_catalog_items_cannot_be_quoted() {
    let (store, mine) = seeded_store().await;
    let theirs = seed(&store, "Mar Turismo").await;
    let input = draft_input(
        mine.client.id,
        "Borrowed hotel",
        vec![NewProposalItem::from_catalog(theirs.hotel.id, 1)],
    );
    let err = store
        .create_proposal(mine.agency.id, mine.user, input)
        .await
        .expect_err("foreign item");
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn file_database_survives_reconnect() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("crm.db").display());

    let pool = connect(&url, 2).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    let seeded = seed(&CrmStore::new(pool.clone()), "Sol Viagens").await;
    pool.close().await;

    let pool = connect(&url, 2).await.expect("reconnect");
    migrations::run_pending(&pool).await.expect("migrations are idempotent");
    let store = CrmStore::new(pool);
    let client = store
        .get_client(seeded.agency.id, seeded.client.id)
        .await
        .expect("client persisted");
    assert_eq!(client.name, "Ana Souza");
}

// ---------------------------------------------------------------------------
// Funnels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_funnel_is_default_and_clients_land_in_first_stage() {
    let (store, seed) = seeded_store().await;
    assert!(seed.funnel.is_default);
    let names: Vec<_> = seed.funnel.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, STAGES);
    assert_eq!(seed.client.stage_id, Some(seed.funnel.stages[0].id));

    let second = store
        .create_funnel(
            seed.agency.id,
            NewFunnel {
                name: "Corporate".to_string(),
                stages: vec!["Inbound".to_string(), "Qualified".to_string()],
            },
        )
        .await
        .expect("second funnel");
    assert!(!second.is_default);

    store
        .set_default_funnel(seed.agency.id, second.id)
        .await
        .expect("switch default");
    let funnels = store.list_funnels(seed.agency.id).await.expect("list");
    assert_eq!(funnels.iter().filter(|f| f.is_default).count(), 1);
    let default = store
        .default_funnel(seed.agency.id)
        .await
        .expect("default")
        .expect("has default");
    assert_eq!(default.id, second.id);
}

#[tokio::test]
async fn stages_can_be_added_renamed_and_reordered() {
    let (store, seed) = seeded_store().await;
    let funnel = store
        .add_stage(
            seed.agency.id,
            seed.funnel.id,
            NewStage {
                name: "Won".to_string(),
                ..Default::default()
            },
        )
        .await
        .expect("add stage");
    assert_eq!(funnel.stages.len(), 5);

    let last = funnel.stages[4].id;
    let funnel = store
        .rename_stage(seed.agency.id, seed.funnel.id, last, "Booked".to_string())
        .await
        .expect("rename");
    assert_eq!(funnel.stages[4].name, "Booked");

    let mut order: Vec<_> = funnel.stages.iter().map(|s| s.id).collect();
    order.reverse();
    let funnel = store
        .reorder_stages(seed.agency.id, seed.funnel.id, order.clone())
        .await
        .expect("reorder");
    let reloaded = store
        .get_funnel(seed.agency.id, funnel.id)
        .await
        .expect("reload");
    let ids: Vec<_> = reloaded.stages.iter().map(|s| s.id).collect();
    assert_eq!(ids, order);
}

#[tokio::test]
async fn occupied_stage_and_funnel_cannot_be_removed() {
    let (store, seed) = seeded_store().await;
    let occupied = seed.funnel.stages[0].id;
    let err = store
        .remove_stage(seed.agency.id, seed.funnel.id, occupied)
        .await
        .expect_err("stage has a client");
    assert!(err.is_conflict(), "{err}");

    let err = store
        .delete_funnel(seed.agency.id, seed.funnel.id)
        .await
        .expect_err("funnel has a client");
    assert!(err.is_conflict(), "{err}");

    let empty = seed.funnel.stages[3].id;
    let funnel = store
        .remove_stage(seed.agency.id, seed.funnel.id, empty)
        .await
        .expect("empty stage");
    assert_eq!(funnel.stages.len(), 3);
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

#[tokio::test]
async fn email_is_unique_per_agency() {
    let (store, seed) = seeded_store().await;
    let err = store
        .create_client(
            seed.agency.id,
            NewClient {
                name: "Another Ana".to_string(),
                email: seed.client.email.clone(),
                ..Default::default()
            },
        )
        .await
        .expect_err("duplicate email");
    assert!(matches!(
        err.domain(),
        Some(CrmError::Validation(ValidationError::Duplicate { field: "email", .. }))
    ));

    let other = tourdesk_test_utils::seed(&store, "Mar Turismo").await;
    assert_eq!(other.client.email, seed.client.email);
}

#[tokio::test]
async fn clients_are_filtered_and_moved() {
    let (store, seed) = seeded_store().await;
    let bruno = store
        .create_client(
            seed.agency.id,
            NewClient {
                name: "Bruno Lima".to_string(),
                tags: vec!["vip".to_string()],
                ..Default::default()
            },
        )
        .await
        .expect("create");

    let negotiation = seed.funnel.stages[2].id;
    let moved = store
        .move_client_to_stage(seed.agency.id, bruno.id, negotiation)
        .await
        .expect("move");
    assert_eq!(moved.stage_id, Some(negotiation));

    let in_stage = store
        .list_clients(
            seed.agency.id,
            &ClientFilter {
                stage_id: Some(negotiation),
                ..Default::default()
            },
        )
        .await
        .expect("filter by stage");
    assert_eq!(in_stage.len(), 1);
    assert_eq!(in_stage[0].id, bruno.id);

    let searched = store
        .list_clients(
            seed.agency.id,
            &ClientFilter {
                search: Some("ANA".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("search");
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].id, seed.client.id);

    let all = store
        .list_clients(seed.agency.id, &ClientFilter::default())
        .await
        .expect("all");
    let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Ana Souza", "Bruno Lima"]);
}

#[tokio::test]
async fn clients_sort_by_folded_name() {
    let (store, seed) = seeded_store().await;
    for name in ["ÉVORA Turismo", "éder Costa", "Bruno Lima"] {
        store
            .create_client(
                seed.agency.id,
                NewClient {
                    name: name.to_string(),
                    ..Default::default()
                },
            )
            .await
            .expect("create");
    }

    let all = store
        .list_clients(seed.agency.id, &ClientFilter::default())
        .await
        .expect("all");
    let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Ana Souza", "Bruno Lima", "éder Costa", "ÉVORA Turismo"]);
}

#[tokio::test]
async fn client_with_open_proposals_cannot_be_deleted() {
    let (store, seed) = seeded_store().await;
    let draft = store
        .create_proposal(seed.agency.id, seed.user, seed.trip("Beach week"))
        .await
        .expect("create");

    let err = store
        .delete_client(seed.agency.id, seed.client.id)
        .await
        .expect_err("open proposal");
    assert!(err.is_conflict(), "{err}");

    store
        .transition_proposal(
            seed.agency.id,
            draft.id,
            ProposalStatus::Cancelled,
            Actor::User(seed.user),
            Some("client gave up".to_string()),
        )
        .await
        .expect("cancel");
    store
        .delete_client(seed.agency.id, seed.client.id)
        .await
        .expect("delete");
    let err = store
        .get_proposal(seed.agency.id, draft.id)
        .await
        .expect_err("cascaded");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn client_update_keeps_unset_fields() {
    let (store, seed) = seeded_store().await;
    let updated = store
        .update_client(
            seed.agency.id,
            seed.client.id,
            ClientPatch {
                notes: Some("Prefers window seats".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.notes, "Prefers window seats");
    assert_eq!(updated.email, seed.client.email);
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operator_items_inherit_agency_defaults() {
    let (store, seed) = seeded_store().await;
    assert_eq!(seed.hotel.currency, seed.agency.default_currency);
    assert_eq!(seed.hotel.commission_rate, dec!(10));
    assert_eq!(seed.hotel.name, "Beach Hotel");
    assert_eq!(seed.transfer.commission_rate, dec!(12.5));

    let for_hotel = store
        .list_operator_items(seed.agency.id, Some(seed.hotel_base.id))
        .await
        .expect("list");
    assert_eq!(for_hotel.len(), 1);
    assert_eq!(for_hotel[0].id, seed.hotel.id);
}

#[tokio::test]
async fn inactive_items_cannot_be_quoted() {
    let (store, seed) = seeded_store().await;
    let hotel = store
        .deactivate_operator_item(seed.agency.id, seed.hotel.id)
        .await
        .expect("deactivate");
    assert!(!hotel.active);

    let err = store
        .create_proposal(seed.agency.id, seed.user, seed.trip("Beach week"))
        .await
        .expect_err("inactive item");
    assert!(err.is_conflict(), "{err}");
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn draft_is_priced_from_catalog() {
    let (store, seed) = seeded_store().await;
    let draft = store
        .create_proposal(seed.agency.id, seed.user, seed.trip("Beach week"))
        .await
        .expect("create");

    assert_eq!(draft.number, "P-000001");
    assert_eq!(draft.status, ProposalStatus::Draft);
    assert_eq!(draft.currency, seed.agency.default_currency);
    assert_eq!(draft.items[0].description, "Beach Hotel - CVC");
    assert_eq!(draft.totals.total, dec!(3150.00));
    assert_eq!(draft.totals.commission, dec!(318.75));

    let reloaded = store
        .get_proposal(seed.agency.id, draft.id)
        .await
        .expect("reload");
    assert_eq!(reloaded, draft);
}

#[tokio::test]
async fn numbers_are_sequential_per_agency() {
    let (store, mine) = seeded_store().await;
    let theirs = seed(&store, "Mar Turismo").await;
    for expected in ["P-000001", "P-000002", "P-000003"] {
        let p = store
            .create_proposal(mine.agency.id, mine.user, mine.trip("Trip"))
            .await
            .expect("create");
        assert_eq!(p.number, expected);
    }
    let p = store
        .create_proposal(theirs.agency.id, theirs.user, theirs.trip("Trip"))
        .await
        .expect("create");
    assert_eq!(p.number, "P-000001");

    let listed = store
        .list_proposals(mine.agency.id, &ProposalFilter::default())
        .await
        .expect("list");
    let numbers: Vec<_> = listed.iter().map(|p| p.number.as_str()).collect();
    assert_eq!(numbers, ["P-000003", "P-000002", "P-000001"]);
}

#[tokio::test]
async fn draft_edit_reprices() {
    let (store, seed) = seeded_store().await;
    let draft = store
        .create_proposal(seed.agency.id, seed.user, seed.trip("Beach week"))
        .await
        .expect("create");

    let edited = store
        .update_proposal(
            seed.agency.id,
            draft.id,
            ProposalPatch {
                items: Some(vec![
                    NewProposalItem::from_catalog(seed.hotel.id, 2),
                    NewProposalItem::custom("City tour", 1, dec!(200.00)),
                ]),
                discount: Some(Discount::Percent(dec!(10))),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(edited.items.len(), 2);
    assert_eq!(edited.totals.subtotal, dec!(2200.00));
    assert_eq!(edited.totals.total, dec!(1980.00));

    let reloaded = store
        .get_proposal(seed.agency.id, draft.id)
        .await
        .expect("reload");
    assert_eq!(reloaded.items, edited.items);
    assert_eq!(reloaded.totals, edited.totals);
}

#[tokio::test]
async fn sent_proposal_is_frozen() {
    let (store, seed) = seeded_store().await;
    let sent = send(&store, &seed, "Beach week").await;
    assert!(sent.sent_at.is_some());

    let err = store
        .update_proposal(
            seed.agency.id,
            sent.id,
            ProposalPatch {
                title: Some("Changed".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("not editable");
    assert!(matches!(err.domain(), Some(CrmError::NotEditable { .. })));
}

#[tokio::test]
async fn empty_draft_cannot_be_sent() {
    let (store, seed) = seeded_store().await;
    let draft = store
        .create_proposal(
            seed.agency.id,
            seed.user,
            draft_input(seed.client.id, "Empty", Vec::new()),
        )
        .await
        .expect("create");
    let err = store
        .transition_proposal(
            seed.agency.id,
            draft.id,
            ProposalStatus::Sent,
            Actor::User(seed.user),
            None,
        )
        .await
        .expect_err("empty");
    assert_eq!(
        err.domain(),
        Some(&CrmError::Transition(TransitionError::EmptyProposal))
    );

    let history = store.history(seed.agency.id, draft.id).await.expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn full_lifecycle_records_verified_history() {
    let (store, seed) = seeded_store().await;
    let sent = send(&store, &seed, "Beach week").await;
    let actor = Actor::User(seed.user);

    let mut last = sent;
    for to in [
        ProposalStatus::Approved,
        ProposalStatus::Contract,
        ProposalStatus::AwaitingPayment,
        ProposalStatus::ActiveBooking,
    ] {
        last = store
            .transition_proposal(seed.agency.id, last.id, to, actor, None)
            .await
            .expect("advance");
        assert_eq!(last.status, to);
    }
    assert!(last.approved_at.is_some());
    assert!(last.contract_signed_at.is_some());
    assert!(last.paid_at.is_some());

    let history = store.history(seed.agency.id, last.id).await.expect("history");
    let statuses: Vec<_> = history.iter().map(|h| h.to_status).collect();
    assert_eq!(
        statuses,
        [
            ProposalStatus::Draft,
            ProposalStatus::Sent,
            ProposalStatus::Approved,
            ProposalStatus::Contract,
            ProposalStatus::AwaitingPayment,
            ProposalStatus::ActiveBooking,
        ]
    );
    assert_eq!(history[0].from_status, None);
    for pair in history.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
        assert_eq!(pair[1].from_status, Some(pair[0].to_status));
    }

    let report = store
        .verify_history(seed.agency.id, last.id)
        .await
        .expect("verify");
    assert!(report.valid);
    assert_eq!(report.entries_checked, 6);
}

#[tokio::test]
async fn illegal_transition_changes_nothing() {
    let (store, seed) = seeded_store().await;
    let draft = store
        .create_proposal(seed.agency.id, seed.user, seed.trip("Beach week"))
        .await
        .expect("create");

    let err = store
        .transition_proposal(
            seed.agency.id,
            draft.id,
            ProposalStatus::ActiveBooking,
            Actor::User(seed.user),
            None,
        )
        .await
        .expect_err("skip ahead");
    assert!(err.is_conflict());

    let reloaded = store
        .get_proposal(seed.agency.id, draft.id)
        .await
        .expect("reload");
    assert_eq!(reloaded.status, ProposalStatus::Draft);
    assert_eq!(
        store.history(seed.agency.id, draft.id).await.expect("history").len(),
        1
    );
}

#[tokio::test]
async fn rejection_reason_is_kept_until_redrafted() {
    let (store, seed) = seeded_store().await;
    let sent = send(&store, &seed, "Beach week").await;
    let actor = Actor::User(seed.user);

    let rejected = store
        .transition_proposal(
            seed.agency.id,
            sent.id,
            ProposalStatus::Rejected,
            actor,
            Some("Too expensive".to_string()),
        )
        .await
        .expect("reject");
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Too expensive"));

    let redrafted = store
        .transition_proposal(seed.agency.id, sent.id, ProposalStatus::Draft, actor, None)
        .await
        .expect("redraft");
    assert_eq!(redrafted.rejection_reason, None);

    let history = store.history(seed.agency.id, sent.id).await.expect("history");
    assert_eq!(history[2].reason.as_deref(), Some("Too expensive"));
}

#[tokio::test]
async fn cancelled_is_final() {
    let (store, seed) = seeded_store().await;
    let sent = send(&store, &seed, "Beach week").await;
    let actor = Actor::User(seed.user);
    let cancelled = store
        .transition_proposal(
            seed.agency.id,
            sent.id,
            ProposalStatus::Cancelled,
            actor,
            Some("Trip postponed".to_string()),
        )
        .await
        .expect("cancel");
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Trip postponed"));

    let err = store
        .transition_proposal(seed.agency.id, sent.id, ProposalStatus::Draft, actor, None)
        .await
        .expect_err("terminal");
    assert!(err.is_conflict());
}

#[tokio::test]
async fn duplicate_makes_a_fresh_draft() {
    let (store, seed) = seeded_store().await;
    let sent = send(&store, &seed, "Beach week").await;
    let copy = store
        .duplicate_proposal(seed.agency.id, sent.id, seed.user)
        .await
        .expect("duplicate");

    assert_ne!(copy.id, sent.id);
    assert_eq!(copy.number, "P-000002");
    assert_eq!(copy.title, "Beach week (copy)");
    assert_eq!(copy.status, ProposalStatus::Draft);
    assert_eq!(copy.sent_at, None);
    assert_eq!(copy.totals, sent.totals);
    assert_eq!(copy.items.len(), sent.items.len());
    assert!(copy.items.iter().zip(&sent.items).all(|(a, b)| a.id != b.id));

    let report = store
        .verify_history(seed.agency.id, copy.id)
        .await
        .expect("verify");
    assert!(report.valid);
    assert_eq!(report.entries_checked, 1);
}

#[tokio::test]
async fn overdue_proposals_expire() {
    let (store, seed) = seeded_store().await;
    let actor = Actor::User(seed.user);
    let mut input = seed.trip("Beach week");
    input.valid_until = Some(Utc::now() + Duration::days(1));
    let draft = store
        .create_proposal(seed.agency.id, seed.user, input)
        .await
        .expect("create");
    store
        .transition_proposal(seed.agency.id, draft.id, ProposalStatus::Sent, actor, None)
        .await
        .expect("send");

    let mut input = seed.trip("Mountain lodge");
    input.valid_until = Some(Utc::now() + Duration::days(1) + Duration::hours(1));
    let unpaid = store
        .create_proposal(seed.agency.id, seed.user, input)
        .await
        .expect("create");
    for to in [
        ProposalStatus::Sent,
        ProposalStatus::Approved,
        ProposalStatus::Contract,
        ProposalStatus::AwaitingPayment,
    ] {
        store
            .transition_proposal(seed.agency.id, unpaid.id, to, actor, None)
            .await
            .expect("advance");
    }
    let undated = send(&store, &seed, "No deadline").await;

    let none = store
        .expire_overdue(Some(seed.agency.id), Utc::now())
        .await
        .expect("sweep now");
    assert!(none.is_empty());

    let later = Utc::now() + Duration::days(2);
    let expired = store.expire_overdue(None, later).await.expect("sweep later");
    assert_eq!(expired, vec![draft.id, unpaid.id]);

    for id in [draft.id, unpaid.id] {
        let reloaded = store
            .get_proposal(seed.agency.id, id)
            .await
            .expect("reload");
        assert_eq!(reloaded.status, ProposalStatus::Expired);
        let history = store.history(seed.agency.id, id).await.expect("history");
        let last = history.last().expect("entry");
        assert_eq!(last.changed_by, Actor::System);
        assert_eq!(last.to_status, ProposalStatus::Expired);
    }
    let history = store.history(seed.agency.id, unpaid.id).await.expect("history");
    assert_eq!(
        history.last().and_then(|h| h.from_status),
        Some(ProposalStatus::AwaitingPayment)
    );

    let still_sent = store
        .get_proposal(seed.agency.id, undated.id)
        .await
        .expect("reload");
    assert_eq!(still_sent.status, ProposalStatus::Sent);

    let again = store.expire_overdue(None, later).await.expect("sweep again");
    assert!(again.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_transitions_yield_one_winner() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("crm.db").display());
    let pool = connect(&url, 8).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    let store = CrmStore::new(pool);
    let seed = seed(&store, "Sol Viagens").await;
    let actor = Actor::User(seed.user);

    for round in 0..10 {
        let sent = send(&store, &seed, &format!("Trip {round}")).await;
        let racers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let agency = seed.agency.id;
                tokio::spawn(async move {
                    store
                        .transition_proposal(agency, sent.id, ProposalStatus::Approved, actor, None)
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for racer in racers {
            match racer.await.expect("task") {
                Ok(proposal) => {
                    assert_eq!(proposal.status, ProposalStatus::Approved);
                    winners += 1;
                }
                Err(err) => assert!(err.is_conflict(), "round {round}: {err}"),
            }
        }
        assert_eq!(winners, 1, "round {round}");

        let history = store.history(seed.agency.id, sent.id).await.expect("history");
        assert_eq!(history.len(), 3);
        let report = store
            .verify_history(seed.agency.id, sent.id)
            .await
            .expect("verify");
        assert!(report.valid);
    }
}

#[tokio::test]
async fn edited_history_row_breaks_the_chain() {
    let (store, seed) = seeded_store().await;
    let sent = send(&store, &seed, "Beach week").await;
    store
        .transition_proposal(
            seed.agency.id,
            sent.id,
            ProposalStatus::Approved,
            Actor::User(seed.user),
            None,
        )
        .await
        .expect("approve");

    sqlx::query("UPDATE proposal_status_history SET reason = 'x' WHERE proposal_id = ? AND seq = 1")
        .bind(sent.id.to_string())
        .execute(store.pool())
        .await
        .expect("edit row");

    let report = store
        .verify_history(seed.agency.id, sent.id)
        .await
        .expect("verify");
    assert!(!report.valid);
    assert_eq!(report.first_invalid_index, Some(1));
    assert_eq!(report.entries_checked, 2);
}

#[tokio::test]
async fn status_without_history_entry_fails_verification() {
    let (store, seed) = seeded_store().await;
    let sent = send(&store, &seed, "Beach week").await;

    sqlx::query("UPDATE proposals SET status = 'approved' WHERE id = ?")
        .bind(sent.id.to_string())
        .execute(store.pool())
        .await
        .expect("edit status");

    let report = store
        .verify_history(seed.agency.id, sent.id)
        .await
        .expect("verify");
    assert!(!report.valid);
    assert_eq!(report.first_invalid_index, Some(1));
}

#[tokio::test]
async fn proposals_filter_by_status_and_search() {
    let (store, seed) = seeded_store().await;
    store
        .create_proposal(seed.agency.id, seed.user, seed.trip("Beach week"))
        .await
        .expect("create");
    let sent = send(&store, &seed, "Mountain escape").await;

    let only_sent = store
        .list_proposals(
            seed.agency.id,
            &ProposalFilter {
                status: Some(ProposalStatus::Sent),
                ..Default::default()
            },
        )
        .await
        .expect("by status");
    assert_eq!(only_sent.len(), 1);
    assert_eq!(only_sent[0].id, sent.id);

    let searched = store
        .list_proposals(
            seed.agency.id,
            &ProposalFilter {
                search: Some("beach".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("search");
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].title, "Beach week");
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dashboard_summarizes_agency() {
    let (store, seed) = seeded_store().await;
    let actor = Actor::User(seed.user);

    store
        .create_proposal(seed.agency.id, seed.user, seed.trip("Open draft"))
        .await
        .expect("draft");

    let won = send(&store, &seed, "Won trip").await;
    for to in [
        ProposalStatus::Approved,
        ProposalStatus::Contract,
        ProposalStatus::AwaitingPayment,
        ProposalStatus::ActiveBooking,
    ] {
        store
            .transition_proposal(seed.agency.id, won.id, to, actor, None)
            .await
            .expect("advance");
    }

    let lost = send(&store, &seed, "Lost trip").await;
    store
        .transition_proposal(seed.agency.id, lost.id, ProposalStatus::Rejected, actor, None)
        .await
        .expect("reject");

    let dashboard = store
        .dashboard(seed.agency.id, Utc::now())
        .await
        .expect("dashboard");
    let brl = Currency::brl();

    assert_eq!(dashboard.client_count, 1);
    assert_eq!(dashboard.clients_by_stage.len(), STAGES.len());
    assert_eq!(dashboard.clients_by_stage[0].count, 1);
    assert_eq!(dashboard.proposals_by_status[&ProposalStatus::Draft], 1);
    assert_eq!(dashboard.proposals_by_status[&ProposalStatus::ActiveBooking], 1);
    assert_eq!(dashboard.proposals_by_status[&ProposalStatus::Rejected], 1);
    assert_eq!(dashboard.pipeline_value[&brl], dec!(3150.00));
    assert_eq!(dashboard.won_value[&brl], dec!(3150.00));
    assert_eq!(dashboard.commission_earned[&brl], dec!(318.75));
    assert_eq!(dashboard.conversion_rate, dec!(50.00));
}

#[tokio::test]
async fn dashboard_for_unknown_agency_is_not_found() {
    let store = tourdesk_test_utils::memory_store().await;
    let err = store
        .dashboard(tourdesk_core::AgencyId::new(), Utc::now())
        .await
        .expect_err("unknown agency");
    assert!(err.is_not_found());
}
