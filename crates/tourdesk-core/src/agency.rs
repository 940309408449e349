//! Agencies: the tenant boundary and its commercial defaults.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CrmError;
use crate::types::{AgencyId, Currency, Timestamp};
use crate::validation::{percentage, required_text};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub id: AgencyId,
    pub name: String,
    /// Used when a proposal or operator item does not name a currency
    pub default_currency: Currency,
    /// Used when an operator item does not name a commission rate
    pub default_commission_rate: Decimal,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAgency {
    pub name: String,
    #[serde(default)]
    pub default_currency: Option<Currency>,
    #[serde(default)]
    pub default_commission_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgencyPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_currency: Option<Currency>,
    #[serde(default)]
    pub default_commission_rate: Option<Decimal>,
}

impl Agency {
    pub fn create(input: NewAgency, now: Timestamp) -> Result<Self, CrmError> {
        let name = required_text("name", &input.name)?;
        let default_commission_rate = percentage(
            "default_commission_rate",
            input.default_commission_rate.unwrap_or_default(),
        )?;
        Ok(Self {
            id: AgencyId::new(),
            name,
            default_currency: input.default_currency.unwrap_or_else(Currency::brl),
            default_commission_rate,
            created_at: now,
        })
    }

    /// Validates the whole patch before touching `self`
    pub fn apply(&mut self, patch: AgencyPatch) -> Result<(), CrmError> {
        let name = patch
            .name
            .as_deref()
            .map(|n| required_text("name", n))
            .transpose()?;
        let rate = patch
            .default_commission_rate
            .map(|r| percentage("default_commission_rate", r))
            .transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(currency) = patch.default_currency {
            self.default_currency = currency;
        }
        if let Some(rate) = rate {
            self.default_commission_rate = rate;
        }
        Ok(())
    }
}
