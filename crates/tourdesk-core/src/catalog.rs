//! Product catalog.
//!
//! A [`BaseItem`] is a sellable template ("Hotel night", "Round-trip flight")
//! that declares the custom fields its instances carry. An [`OperatorItem`]
//! is one operator's concrete offer of that template with its own price,
//! commission and field values.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CrmError, ValidationError};
use crate::types::{AgencyId, BaseItemId, Currency, OperatorItemId, Timestamp};
use crate::validation::{is_slug, non_negative, optional_text, percentage, required_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Flight,
    Hotel,
    Package,
    Transfer,
    Insurance,
    Tour,
    Cruise,
    CarRental,
    Other,
}

impl ItemCategory {
    pub const ALL: [ItemCategory; 9] = [
        ItemCategory::Flight,
        ItemCategory::Hotel,
        ItemCategory::Package,
        ItemCategory::Transfer,
        ItemCategory::Insurance,
        ItemCategory::Tour,
        ItemCategory::Cruise,
        ItemCategory::CarRental,
        ItemCategory::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ItemCategory::Flight => "flight",
            ItemCategory::Hotel => "hotel",
            ItemCategory::Package => "package",
            ItemCategory::Transfer => "transfer",
            ItemCategory::Insurance => "insurance",
            ItemCategory::Tour => "tour",
            ItemCategory::Cruise => "cruise",
            ItemCategory::CarRental => "car_rental",
            ItemCategory::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::Invalid {
            field: "category",
            reason: format!("unknown category '{s}'"),
        })
    }
}

/// Type of a custom field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FieldKind {
    Text,
    Number,
    /// `YYYY-MM-DD`
    Date,
    Boolean,
    Select { options: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseItem {
    pub id: BaseItemId,
    pub agency_id: AgencyId,
    pub name: String,
    pub category: ItemCategory,
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
    pub active: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBaseItem {
    pub name: String,
    pub category: ItemCategory,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<ItemCategory>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<FieldDefinition>>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl BaseItem {
    pub fn create(agency_id: AgencyId, input: NewBaseItem, now: Timestamp) -> Result<Self, CrmError> {
        Ok(Self {
            id: BaseItemId::new(),
            agency_id,
            name: required_text("name", &input.name)?,
            category: input.category,
            description: optional_text(input.description.as_deref()),
            fields: check_definitions(input.fields)?,
            active: true,
            created_at: now,
        })
    }

    /// Field changes are checked against operator items only when those
    /// items are created or their values are replaced.
    pub fn apply(&mut self, patch: BaseItemPatch) -> Result<(), CrmError> {
        let name = patch
            .name
            .as_deref()
            .map(|n| required_text("name", n))
            .transpose()?;
        let fields = patch.fields.map(check_definitions).transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(description) = patch.description.as_deref() {
            self.description = optional_text(Some(description));
        }
        if let Some(fields) = fields {
            self.fields = fields;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        Ok(())
    }

    /// Check operator-supplied values against this template
    pub fn validate_values(&self, values: &BTreeMap<String, Value>) -> Result<(), ValidationError> {
        if let Some(unknown) = values.keys().find(|k| !self.fields.iter().any(|f| &f.key == *k)) {
            return Err(ValidationError::Invalid {
                field: "custom_fields",
                reason: format!("'{unknown}' is not defined on {}", self.name),
            });
        }

        for def in &self.fields {
            match values.get(&def.key) {
                None | Some(Value::Null) if def.required => {
                    return Err(ValidationError::Invalid {
                        field: "custom_fields",
                        reason: format!("'{}' is required", def.key),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) => check_value(def, value)?,
            }
        }
        Ok(())
    }
}

fn check_definitions(fields: Vec<FieldDefinition>) -> Result<Vec<FieldDefinition>, ValidationError> {
    let mut out: Vec<FieldDefinition> = Vec::with_capacity(fields.len());
    for mut def in fields {
        def.key = def.key.trim().to_string();
        if !is_slug(&def.key) {
            return Err(ValidationError::Invalid {
                field: "fields",
                reason: format!("key '{}' must use lower-case letters, digits and '_'", def.key),
            });
        }
        if out.iter().any(|d| d.key == def.key) {
            return Err(ValidationError::Duplicate {
                field: "field key",
                value: def.key,
            });
        }
        if let FieldKind::Select { options } = &def.kind {
            if options.iter().all(|o| o.trim().is_empty()) {
                return Err(ValidationError::Invalid {
                    field: "fields",
                    reason: format!("select field '{}' needs at least one option", def.key),
                });
            }
        }
        def.label = optional_text(Some(&def.label)).unwrap_or_else(|| def.key.clone());
        out.push(def);
    }
    Ok(out)
}

fn check_value(def: &FieldDefinition, value: &Value) -> Result<(), ValidationError> {
    let ok = match &def.kind {
        FieldKind::Text => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Date => value
            .as_str()
            .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        FieldKind::Select { options } => value
            .as_str()
            .is_some_and(|s| options.iter().any(|o| o == s)),
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::Invalid {
            field: "custom_fields",
            reason: format!("'{}' has the wrong type: {value}", def.key),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorItem {
    pub id: OperatorItemId,
    pub agency_id: AgencyId,
    pub base_item_id: BaseItemId,
    /// Supplier offering the product (airline, hotel chain, DMC)
    pub operator_name: String,
    pub name: String,
    pub price: Decimal,
    pub currency: Currency,
    pub commission_rate: Decimal,
    pub custom_fields: BTreeMap<String, Value>,
    pub active: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOperatorItem {
    pub base_item_id: BaseItemId,
    pub operator_name: String,
    /// Defaults to the base item name
    #[serde(default)]
    pub name: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorItemPatch {
    #[serde(default)]
    pub operator_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
    #[serde(default)]
    pub custom_fields: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Agency defaults applied to new operator items
#[derive(Debug, Clone)]
pub struct CatalogDefaults {
    pub currency: Currency,
    pub commission_rate: Decimal,
}

impl OperatorItem {
    pub fn create(
        base: &BaseItem,
        input: NewOperatorItem,
        defaults: &CatalogDefaults,
        now: Timestamp,
    ) -> Result<Self, CrmError> {
        if input.base_item_id != base.id {
            return Err(CrmError::not_found("base item", input.base_item_id));
        }
        if !base.active {
            return Err(CrmError::Conflict(format!(
                "base item '{}' is inactive",
                base.name
            )));
        }
        base.validate_values(&input.custom_fields)?;

        let name = match input.name.as_deref() {
            Some(name) => required_text("name", name)?,
            None => base.name.clone(),
        };
        Ok(Self {
            id: OperatorItemId::new(),
            agency_id: base.agency_id,
            base_item_id: base.id,
            operator_name: required_text("operator_name", &input.operator_name)?,
            name,
            price: non_negative("price", input.price)?,
            currency: input.currency.unwrap_or_else(|| defaults.currency.clone()),
            commission_rate: percentage(
                "commission_rate",
                input.commission_rate.unwrap_or(defaults.commission_rate),
            )?,
            custom_fields: input.custom_fields,
            active: true,
            created_at: now,
        })
    }

    pub fn apply(&mut self, base: &BaseItem, patch: OperatorItemPatch) -> Result<(), CrmError> {
        let operator_name = patch
            .operator_name
            .as_deref()
            .map(|n| required_text("operator_name", n))
            .transpose()?;
        let name = patch
            .name
            .as_deref()
            .map(|n| required_text("name", n))
            .transpose()?;
        let price = patch.price.map(|p| non_negative("price", p)).transpose()?;
        let rate = patch
            .commission_rate
            .map(|r| percentage("commission_rate", r))
            .transpose()?;
        if let Some(values) = &patch.custom_fields {
            base.validate_values(values)?;
        }

        if let Some(operator_name) = operator_name {
            self.operator_name = operator_name;
        }
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(price) = price {
            self.price = price;
        }
        if let Some(rate) = rate {
            self.commission_rate = rate;
        }
        if let Some(values) = patch.custom_fields {
            self.custom_fields = values;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        Ok(())
    }
}
