//! Proposal pricing: discounts, commissions and totals.
//!
//! Every monetary output is rounded to cents, half away from zero. Line
//! values are rounded first and the proposal totals are built from the
//! rounded lines, so the sum of the lines always matches the subtotal.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::CalculationError;

const MONEY_SCALE: u32 = 2;

/// Round to the currency's minor unit
#[inline]
#[must_use]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Reduction applied to a line or to the whole proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Discount {
    #[default]
    None,
    /// Percentage of the base, `0..=100`
    Percent(Decimal),
    /// Fixed amount, capped at the base
    Amount(Decimal),
}

impl Discount {
    pub fn validate(&self) -> Result<(), CalculationError> {
        match *self {
            Discount::None => Ok(()),
            Discount::Percent(p) if p < Decimal::ZERO || p > Decimal::ONE_HUNDRED => {
                Err(CalculationError::RateOutOfRange {
                    field: "discount",
                    value: p,
                })
            }
            Discount::Percent(_) => Ok(()),
            Discount::Amount(a) if a < Decimal::ZERO => Err(CalculationError::NegativeDiscount(a)),
            Discount::Amount(_) => Ok(()),
        }
    }

    /// Rounded reduction for `base`; never more than `base`
    pub fn amount_for(&self, base: Decimal) -> Result<Decimal, CalculationError> {
        let raw = match *self {
            Discount::None => Decimal::ZERO,
            Discount::Percent(p) => percent_of(base, p)?,
            Discount::Amount(a) => a.min(base),
        };
        Ok(round_money(raw).min(base).max(Decimal::ZERO))
    }
}

/// Pricing inputs for one proposal line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub commission_rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineTotals {
    pub gross: Decimal,
    pub discount: Decimal,
    pub net: Decimal,
    pub commission: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProposalTotals {
    /// Sum of line gross values
    pub gross: Decimal,
    /// Sum of line discounts
    pub item_discounts: Decimal,
    /// Sum of line net values
    pub subtotal: Decimal,
    /// Proposal-level discount on the subtotal
    pub discount: Decimal,
    /// What the client pays
    pub total: Decimal,
    /// Agency commission after the proposal-level discount
    pub commission: Decimal,
    /// What goes to operators
    pub supplier_cost: Decimal,
}

/// Price one line
pub fn line_totals(line: &LineInput) -> Result<LineTotals, CalculationError> {
    if line.quantity == 0 {
        return Err(CalculationError::InvalidQuantity);
    }
    if line.unit_price < Decimal::ZERO {
        return Err(CalculationError::NegativePrice(line.unit_price));
    }
    check_rate("commission_rate", line.commission_rate)?;
    line.discount.validate()?;

    let gross = round_money(
        Decimal::from(line.quantity)
            .checked_mul(line.unit_price)
            .ok_or(CalculationError::Overflow)?,
    );
    let discount = line.discount.amount_for(gross)?;
    let net = gross - discount;
    let commission = round_money(percent_of(net, line.commission_rate)?);

    Ok(LineTotals {
        gross,
        discount,
        net,
        commission,
    })
}

/// Price a whole proposal
pub fn proposal_totals(
    lines: &[LineInput],
    discount: Discount,
) -> Result<ProposalTotals, CalculationError> {
    discount.validate()?;
    let priced = lines
        .iter()
        .map(line_totals)
        .collect::<Result<Vec<_>, _>>()?;
    combine(&priced, discount)
}

/// Stateless quote: priced lines plus proposal totals
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<LineInput>,
    #[serde(default)]
    pub discount: Discount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<LineTotals>,
    pub totals: ProposalTotals,
}

pub fn quote(request: &QuoteRequest) -> Result<Quote, CalculationError> {
    request.discount.validate()?;
    let lines = request
        .items
        .iter()
        .map(line_totals)
        .collect::<Result<Vec<_>, _>>()?;
    let totals = combine(&lines, request.discount)?;
    Ok(Quote { lines, totals })
}

/// Combine already-priced lines with the proposal-level discount
pub fn combine(lines: &[LineTotals], discount: Discount) -> Result<ProposalTotals, CalculationError> {
    let gross = sum(lines.iter().map(|l| l.gross))?;
    let item_discounts = sum(lines.iter().map(|l| l.discount))?;
    let subtotal = sum(lines.iter().map(|l| l.net))?;
    let line_commission = sum(lines.iter().map(|l| l.commission))?;

    let proposal_discount = discount.amount_for(subtotal)?;
    let total = subtotal - proposal_discount;

    // The proposal-level discount eats into commission proportionally.
    let commission = if subtotal.is_zero() {
        Decimal::ZERO
    } else {
        let scaled = line_commission
            .checked_mul(total)
            .and_then(|v| v.checked_div(subtotal))
            .ok_or(CalculationError::Overflow)?;
        round_money(scaled)
    };

    Ok(ProposalTotals {
        gross,
        item_discounts,
        subtotal,
        discount: proposal_discount,
        total,
        commission,
        supplier_cost: total - commission,
    })
}

fn sum(mut values: impl Iterator<Item = Decimal>) -> Result<Decimal, CalculationError> {
    values.try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(v).ok_or(CalculationError::Overflow)
    })
}

/// `base * rate / 100`
fn percent_of(base: Decimal, rate: Decimal) -> Result<Decimal, CalculationError> {
    base.checked_mul(rate)
        .map(|v| v / Decimal::ONE_HUNDRED)
        .ok_or(CalculationError::Overflow)
}

fn check_rate(field: &'static str, value: Decimal) -> Result<(), CalculationError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(CalculationError::RateOutOfRange { field, value });
    }
    Ok(())
}
