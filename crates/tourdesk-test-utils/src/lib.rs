//! Testing utilities for the Tourdesk workspace
//!
//! Shared fixtures: a migrated in-memory store and a seeded agency with a
//! default funnel, one client and a small catalog.

#![allow(missing_docs)]

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tourdesk_core::{
    Agency, BaseItem, Client, ClientId, Currency, Discount, Funnel, ItemCategory, NewAgency,
    NewBaseItem, NewClient, NewFunnel, NewOperatorItem, NewProposal, NewProposalItem,
    OperatorItem, Timestamp, UserId,
};
use tourdesk_store::{connect_in_memory, AgencyManager, Catalog, ClientDirectory, CrmStore, FunnelManager};

/// Stage names of the seeded default funnel
pub const STAGES: [&str; 4] = ["Lead", "Contacted", "Negotiation", "Closed"];

pub const HOTEL_PRICE: Decimal = dec!(1000.00);
pub const TRANSFER_PRICE: Decimal = dec!(150.00);

/// Records created by [`seed`]
#[derive(Debug, Clone)]
pub struct Seed {
    pub agency: Agency,
    pub user: UserId,
    pub funnel: Funnel,
    pub client: Client,
    pub hotel_base: BaseItem,
    /// BRL 1000.00 per night, 10% commission
    pub hotel: OperatorItem,
    /// BRL 150.00, 12.5% commission
    pub transfer: OperatorItem,
}

pub async fn memory_store() -> CrmStore {
    CrmStore::new(connect_in_memory().await.unwrap())
}

/// Store with one seeded agency
pub async fn seeded_store() -> (CrmStore, Seed) {
    let store = memory_store().await;
    let seed = seed(&store, "Sol Viagens").await;
    (store, seed)
}

pub async fn seed(store: &CrmStore, agency_name: &str) -> Seed {
    let agency = store
        .create_agency(NewAgency {
            name: agency_name.to_string(),
            default_currency: Some(Currency::brl()),
            default_commission_rate: Some(dec!(10)),
        })
        .await
        .unwrap();

    let funnel = store
        .create_funnel(
            agency.id,
            NewFunnel {
                name: "Sales".to_string(),
                stages: STAGES.iter().map(ToString::to_string).collect(),
            },
        )
        .await
        .unwrap();

    let client = store
        .create_client(
            agency.id,
            NewClient {
                name: "Ana Souza".to_string(),
                email: Some("ana@example.com".to_string()),
                phone: Some("+55 11 99999-0000".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let hotel_base = store
        .create_base_item(
            agency.id,
            NewBaseItem {
                name: "Beach Hotel".to_string(),
                category: ItemCategory::Hotel,
                description: Some("Ocean view room".to_string()),
                fields: Vec::new(),
            },
        )
        .await
        .unwrap();
    let transfer_base = store
        .create_base_item(
            agency.id,
            NewBaseItem {
                name: "Airport Transfer".to_string(),
                category: ItemCategory::Transfer,
                description: None,
                fields: Vec::new(),
            },
        )
        .await
        .unwrap();

    let hotel = store
        .create_operator_item(
            agency.id,
            NewOperatorItem {
                base_item_id: hotel_base.id,
                operator_name: "CVC".to_string(),
                name: None,
                price: HOTEL_PRICE,
                currency: None,
                commission_rate: None,
                custom_fields: Default::default(),
            },
        )
        .await
        .unwrap();
    let transfer = store
        .create_operator_item(
            agency.id,
            NewOperatorItem {
                base_item_id: transfer_base.id,
                operator_name: "Transfer Co".to_string(),
                name: None,
                price: TRANSFER_PRICE,
                currency: None,
                commission_rate: Some(dec!(12.5)),
                custom_fields: Default::default(),
            },
        )
        .await
        .unwrap();

    Seed {
        agency,
        user: UserId::new(),
        funnel,
        client,
        hotel_base,
        hotel,
        transfer,
    }
}

/// Draft input with no discount or dates
pub fn draft_input(client: ClientId, title: &str, items: Vec<NewProposalItem>) -> NewProposal {
    NewProposal {
        client_id: client,
        title: title.to_string(),
        currency: None,
        items,
        discount: Discount::None,
        valid_until: None,
        travel_start: None,
        travel_end: None,
        notes: None,
    }
}

impl Seed {
    /// Three hotel nights plus one transfer
    #[must_use]
    pub fn trip_items(&self) -> Vec<NewProposalItem> {
        vec![
            NewProposalItem::from_catalog(self.hotel.id, 3),
            NewProposalItem::from_catalog(self.transfer.id, 1),
        ]
    }

    #[must_use]
    pub fn trip(&self, title: &str) -> NewProposal {
        draft_input(self.client.id, title, self.trip_items())
    }
}

/// Midnight UTC on the given day
pub fn day(year: i32, month: u32, day: u32) -> Timestamp {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}
