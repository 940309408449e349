//! Identifiers and small value types shared by every module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

mod status;

pub use status::ProposalStatus;

/// Wall-clock instant, always UTC
pub type Timestamp = DateTime<Utc>;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(
    /// Tenant identifier; every other record is scoped by it
    AgencyId
);
id_type!(
    /// Agent working inside an agency
    UserId
);
id_type!(ClientId);
id_type!(FunnelId);
id_type!(StageId);
id_type!(BaseItemId);
id_type!(OperatorItemId);
id_type!(ProposalId);
id_type!(ProposalItemId);
id_type!(
    /// Row in the proposal status history
    HistoryEntryId
);

/// ISO 4217 currency code, stored upper-case
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse a three-letter code; case-insensitive
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(ValidationError::Invalid {
                field: "currency",
                reason: format!("'{code}' is not a three-letter currency code"),
            })
        }
    }

    /// Brazilian real, the default for new agencies
    #[must_use]
    pub fn brl() -> Self {
        Self("BRL".to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// Who caused a change: an agency user or the system itself (expiry sweeps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum Actor {
    User(UserId),
    System,
}

impl Actor {
    /// Stable text form used in storage and hashing
    #[must_use]
    pub fn to_key(&self) -> String {
        match self {
            Actor::User(id) => id.to_string(),
            Actor::System => "system".to_string(),
        }
    }

    /// Inverse of [`Actor::to_key`]
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        if key == "system" {
            return Some(Actor::System);
        }
        UserId::from_str(key).ok().map(Actor::User)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}
