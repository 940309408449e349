//! Agency dashboard figures.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calculator::round_money;
use crate::client::Client;
use crate::funnel::Funnel;
use crate::proposal::Proposal;
use crate::types::{Currency, ProposalId, ProposalStatus, StageId, Timestamp};

/// Look-ahead for [`Dashboard::expiring_soon`]
pub const EXPIRY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCount {
    pub stage_id: StageId,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringProposal {
    pub id: ProposalId,
    pub number: String,
    pub title: String,
    pub status: ProposalStatus,
    pub valid_until: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub client_count: usize,
    /// Stages of the default funnel, in funnel order
    pub clients_by_stage: Vec<StageCount>,
    pub proposals_by_status: BTreeMap<ProposalStatus, usize>,
    /// Totals of open proposals
    pub pipeline_value: BTreeMap<Currency, Decimal>,
    /// Totals of active bookings
    pub won_value: BTreeMap<Currency, Decimal>,
    pub commission_earned: BTreeMap<Currency, Decimal>,
    /// Percentage of decided proposals that were won
    pub conversion_rate: Decimal,
    /// Oldest deadline first
    pub expiring_soon: Vec<ExpiringProposal>,
}

/// Aggregate one agency's clients and proposals
#[must_use]
pub fn build_dashboard(
    clients: &[Client],
    default_funnel: Option<&Funnel>,
    proposals: &[Proposal],
    now: Timestamp,
) -> Dashboard {
    let clients_by_stage = default_funnel
        .map(|funnel| {
            funnel
                .stages
                .iter()
                .map(|stage| StageCount {
                    stage_id: stage.id,
                    name: stage.name.clone(),
                    count: clients
                        .iter()
                        .filter(|c| c.stage_id == Some(stage.id))
                        .count(),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut proposals_by_status: BTreeMap<ProposalStatus, usize> =
        ProposalStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    let mut pipeline_value = BTreeMap::new();
    let mut won_value = BTreeMap::new();
    let mut commission_earned = BTreeMap::new();
    let (mut won, mut lost) = (0u32, 0u32);
    let horizon = now + Duration::days(EXPIRY_WINDOW_DAYS);
    let mut expiring_soon = Vec::new();

    for p in proposals {
        *proposals_by_status.entry(p.status).or_default() += 1;

        if p.status.is_open() {
            add(&mut pipeline_value, &p.currency, p.totals.total);
        }
        if p.status.is_won() {
            won += 1;
            add(&mut won_value, &p.currency, p.totals.total);
            add(&mut commission_earned, &p.currency, p.totals.commission);
        }
        // cancellations count once the proposal was sent
        let decided_lost = match p.status {
            ProposalStatus::Cancelled => p.sent_at.is_some(),
            status => status.is_lost(),
        };
        if decided_lost {
            lost += 1;
        }

        if let Some(deadline) = p.valid_until {
            if p.status.can_expire() && deadline >= now && deadline <= horizon {
                expiring_soon.push(ExpiringProposal {
                    id: p.id,
                    number: p.number.clone(),
                    title: p.title.clone(),
                    status: p.status,
                    valid_until: deadline,
                });
            }
        }
    }
    expiring_soon.sort_by_key(|e| e.valid_until);

    let decided = won + lost;
    let conversion_rate = if decided == 0 {
        Decimal::ZERO
    } else {
        round_money(Decimal::from(won) * Decimal::ONE_HUNDRED / Decimal::from(decided))
    };

    Dashboard {
        client_count: clients.len(),
        clients_by_stage,
        proposals_by_status,
        pipeline_value,
        won_value,
        commission_earned,
        conversion_rate,
        expiring_soon,
    }
}

fn add(map: &mut BTreeMap<Currency, Decimal>, currency: &Currency, value: Decimal) {
    *map.entry(currency.clone()).or_default() += value;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NewClient;
    use crate::funnel::NewFunnel;
    use crate::proposal::{build_items, DraftContext, NewProposal, NewProposalItem};
    use crate::types::{Actor, AgencyId, ClientId, UserId};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn proposal(agency_id: AgencyId, seq: u64, price: Decimal, now: Timestamp) -> Proposal {
        let items = build_items(
            vec![NewProposalItem::custom("Package", 1, price)],
            &Currency::brl(),
            &HashMap::new(),
            dec!(10),
        )
        .unwrap();
        Proposal::draft(
            DraftContext {
                agency_id,
                sequence: seq,
                created_by: UserId::new(),
                currency: Currency::brl(),
                now,
            },
            NewProposal {
                client_id: ClientId::new(),
                title: format!("Trip {seq}"),
                currency: None,
                items: vec![],
                discount: Default::default(),
                valid_until: None,
                travel_start: None,
                travel_end: None,
                notes: None,
            },
            items,
        )
        .unwrap()
    }

    fn walk(p: &mut Proposal, path: &[ProposalStatus], now: Timestamp) {
        for to in path {
            p.transition(*to, Actor::System, None, now).unwrap();
        }
    }

    #[test]
    fn empty_agency() {
        let d = build_dashboard(&[], None, &[], Utc::now());
        assert_eq!(d.client_count, 0);
        assert!(d.clients_by_stage.is_empty());
        assert_eq!(d.conversion_rate, Decimal::ZERO);
        assert_eq!(d.proposals_by_status[&ProposalStatus::Draft], 0);
    }

    #[test]
    fn aggregates_pipeline_and_conversion() {
        use ProposalStatus::*;
        let now = Utc::now();
        let agency = AgencyId::new();
        let funnel = Funnel::create(
            agency,
            NewFunnel {
                name: "Sales".into(),
                stages: vec!["New".into(), "Won".into()],
            },
            true,
            now,
        )
        .unwrap();
        let placement = crate::client::Placement {
            funnel_id: funnel.id,
            stage_id: funnel.stages[0].id,
        };
        let clients: Vec<Client> = ["Ana", "Bruno"]
            .into_iter()
            .map(|name| {
                Client::create(
                    agency,
                    NewClient {
                        name: name.into(),
                        ..Default::default()
                    },
                    Some(placement),
                    now,
                )
                .unwrap()
            })
            .collect();

        let open = proposal(agency, 1, dec!(1000), now);
        let mut booked = proposal(agency, 2, dec!(5000), now);
        walk(&mut booked, &[Sent, Approved, Contract, AwaitingPayment, ActiveBooking], now);
        let mut rejected = proposal(agency, 3, dec!(700), now);
        walk(&mut rejected, &[Sent, Rejected], now);
        let mut binned = proposal(agency, 4, dec!(300), now);
        walk(&mut binned, &[Cancelled], now);
        let mut waiting = proposal(agency, 5, dec!(200), now);
        waiting.valid_until = Some(now + Duration::days(3));
        walk(&mut waiting, &[Sent], now);

        let d = build_dashboard(&clients, Some(&funnel), &[open, booked, rejected, binned, waiting], now);

        assert_eq!(d.client_count, 2);
        assert_eq!(d.clients_by_stage[0].count, 2);
        assert_eq!(d.clients_by_stage[1].count, 0);
        assert_eq!(d.proposals_by_status[&Draft], 1);
        assert_eq!(d.proposals_by_status[&Sent], 1);
        assert_eq!(d.pipeline_value[&Currency::brl()], dec!(1200));
        assert_eq!(d.won_value[&Currency::brl()], dec!(5000));
        assert_eq!(d.commission_earned[&Currency::brl()], dec!(500));
        // won 1, lost 1; the unsent cancellation does not count
        assert_eq!(d.conversion_rate, dec!(50));
        assert_eq!(d.expiring_soon.len(), 1);
        assert_eq!(d.expiring_soon[0].number, "P-000005");
    }
}
