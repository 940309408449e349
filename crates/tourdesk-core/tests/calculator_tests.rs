use proptest::prelude::*;
use rust_decimal::Decimal;
use tourdesk_core::calculator::{line_totals, proposal_totals, round_money};
use tourdesk_core::{quote, Discount, LineInput, QuoteRequest};

fn money() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn rate() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|bp| Decimal::new(bp, 2))
}

fn discount() -> impl Strategy<Value = Discount> {
    prop_oneof![
        Just(Discount::None),
        rate().prop_map(Discount::Percent),
        money().prop_map(Discount::Amount),
    ]
}

fn line() -> impl Strategy<Value = LineInput> {
    (1u32..20, money(), discount(), rate()).prop_map(|(quantity, unit_price, discount, commission_rate)| {
        LineInput {
            quantity,
            unit_price,
            discount,
            commission_rate,
        }
    })
}

#[test]
fn test_zero_quantity_rejected() {
    let line = LineInput {
        quantity: 0,
        unit_price: Decimal::ONE,
        discount: Discount::None,
        commission_rate: Decimal::ZERO,
    };
    assert!(line_totals(&line).is_err());
}

#[test]
fn test_rounding_half_away_from_zero() {
    assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2));
    assert_eq!(round_money(Decimal::new(1004, 3)), Decimal::new(100, 2));
}

proptest! {
    #[test]
    fn prop_line_never_negative(line in line()) {
        let t = line_totals(&line).unwrap();
        prop_assert!(t.net >= Decimal::ZERO);
        prop_assert!(t.discount <= t.gross);
        prop_assert!(t.commission <= t.net);
        prop_assert_eq!(t.net, t.gross - t.discount);
    }

    #[test]
    fn prop_totals_add_up(lines in prop::collection::vec(line(), 0..8), discount in discount()) {
        let totals = proposal_totals(&lines, discount).unwrap();
        let nets: Decimal = lines.iter().map(|l| line_totals(l).unwrap().net).sum();

        prop_assert_eq!(totals.subtotal, nets);
        prop_assert_eq!(totals.total, totals.subtotal - totals.discount);
        prop_assert_eq!(totals.supplier_cost, totals.total - totals.commission);
        prop_assert!(totals.total >= Decimal::ZERO);
        prop_assert!(totals.commission <= totals.total);
        prop_assert!(totals.total.scale() <= 2);
    }
}

#[test]
fn test_quote_from_json() {
    let request: QuoteRequest = serde_json::from_str(
        r#"{
            "items": [
                {"quantity": 2, "unit_price": "1500.00", "commission_rate": "10"},
                {"quantity": 1, "unit_price": "200.00", "discount": {"kind": "amount", "value": "50"}}
            ],
            "discount": {"kind": "percent", "value": "5"}
        }"#,
    )
    .unwrap();
    let quote = quote(&request).unwrap();
    assert_eq!(quote.lines.len(), 2);
    assert_eq!(quote.lines[1].net, Decimal::new(15000, 2));
    assert_eq!(quote.totals.subtotal, Decimal::new(315000, 2));
    assert_eq!(quote.totals.total, Decimal::new(299250, 2));
}

proptest! {
    #[test]
    fn prop_quote_lines_sum_to_subtotal(lines in prop::collection::vec(line(), 0..6), discount in discount()) {
        let request = QuoteRequest { items: lines, discount };
        let quote = quote(&request).unwrap();
        let net: Decimal = quote.lines.iter().map(|l| l.net).sum();
        prop_assert_eq!(net, quote.totals.subtotal);
        prop_assert!(quote.totals.total <= quote.totals.subtotal);
    }
}
