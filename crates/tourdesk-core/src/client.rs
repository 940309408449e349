//! Clients and leads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CrmError, ValidationError};
use crate::types::{AgencyId, ClientId, FunnelId, StageId, Timestamp};
use crate::validation::{normalize_tags, optional_email, optional_text, required_text};

/// How the lead reached the agency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    SocialMedia,
    WalkIn,
    Phone,
    #[default]
    Other,
}

impl LeadSource {
    pub const ALL: [LeadSource; 6] = [
        LeadSource::Website,
        LeadSource::Referral,
        LeadSource::SocialMedia,
        LeadSource::WalkIn,
        LeadSource::Phone,
        LeadSource::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LeadSource::Website => "website",
            LeadSource::Referral => "referral",
            LeadSource::SocialMedia => "social_media",
            LeadSource::WalkIn => "walk_in",
            LeadSource::Phone => "phone",
            LeadSource::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::Invalid {
            field: "source",
            reason: format!("unknown lead source '{s}'"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub agency_id: AgencyId,
    pub name: String,
    /// Lower-cased; unique per agency
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Passport or tax id
    pub document: Option<String>,
    pub source: LeadSource,
    pub funnel_id: Option<FunnelId>,
    pub stage_id: Option<StageId>,
    pub notes: String,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    /// Explicit placement; otherwise the default funnel's first stage
    #[serde(default)]
    pub stage_id: Option<StageId>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update; a blank string clears an optional field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Funnel and stage a client sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub funnel_id: FunnelId,
    pub stage_id: StageId,
}

impl Client {
    pub fn create(
        agency_id: AgencyId,
        input: NewClient,
        placement: Option<Placement>,
        now: Timestamp,
    ) -> Result<Self, CrmError> {
        Ok(Self {
            id: ClientId::new(),
            agency_id,
            name: required_text("name", &input.name)?,
            email: optional_email(input.email.as_deref())?,
            phone: optional_text(input.phone.as_deref()),
            document: optional_text(input.document.as_deref()),
            source: input.source.unwrap_or_default(),
            funnel_id: placement.map(|p| p.funnel_id),
            stage_id: placement.map(|p| p.stage_id),
            notes: input.notes.unwrap_or_default().trim().to_string(),
            tags: normalize_tags(&input.tags),
            created_at: now,
            updated_at: now,
        })
    }

    /// Validates the whole patch before touching `self`
    pub fn apply(&mut self, patch: ClientPatch, now: Timestamp) -> Result<(), CrmError> {
        let name = patch
            .name
            .as_deref()
            .map(|n| required_text("name", n))
            .transpose()?;
        let email = patch
            .email
            .as_deref()
            .map(|e| optional_email(Some(e)))
            .transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(email) = email {
            self.email = email;
        }
        if let Some(phone) = patch.phone.as_deref() {
            self.phone = optional_text(Some(phone));
        }
        if let Some(document) = patch.document.as_deref() {
            self.document = optional_text(Some(document));
        }
        if let Some(source) = patch.source {
            self.source = source;
        }
        if let Some(notes) = patch.notes {
            self.notes = notes.trim().to_string();
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(&tags);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn move_to(&mut self, placement: Placement, now: Timestamp) {
        self.funnel_id = Some(placement.funnel_id);
        self.stage_id = Some(placement.stage_id);
        self.updated_at = now;
    }
}

/// List filter; every set field must match
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientFilter {
    /// Case-insensitive match on name, email or phone
    #[serde(default, rename = "q")]
    pub search: Option<String>,
    #[serde(default)]
    pub funnel_id: Option<FunnelId>,
    #[serde(default, rename = "stage")]
    pub stage_id: Option<StageId>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl ClientFilter {
    #[must_use]
    pub fn matches(&self, client: &Client) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = client.name.to_lowercase().contains(&needle)
                || client.email.as_deref().is_some_and(|e| e.contains(&needle))
                || client.phone.as_deref().is_some_and(|p| p.contains(&needle));
            if !hit {
                return false;
            }
        }
        if self.funnel_id.is_some() && self.funnel_id != client.funnel_id {
            return false;
        }
        if self.stage_id.is_some() && self.stage_id != client.stage_id {
            return false;
        }
        if self.source.is_some_and(|s| s != client.source) {
            return false;
        }
        if let Some(tag) = self.tag.as_deref() {
            let tag = tag.trim().to_lowercase();
            if !client.tags.contains(&tag) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn client() -> Client {
        Client::create(
            AgencyId::new(),
            NewClient {
                name: "Maria Souza".into(),
                email: Some("Maria@Mail.com".into()),
                phone: Some("+55 11 99999-0000".into()),
                source: Some(LeadSource::Referral),
                tags: vec!["VIP".into(), "beach".into()],
                ..Default::default()
            },
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_normalizes_input() {
        let c = client();
        assert_eq!(c.email.as_deref(), Some("maria@mail.com"));
        assert_eq!(c.tags, ["vip", "beach"]);
        assert_eq!(c.source, LeadSource::Referral);
        assert!(c.stage_id.is_none());
    }

    #[test]
    fn rejects_blank_name_and_bad_email() {
        let blank = Client::create(AgencyId::new(), NewClient::default(), None, Utc::now());
        assert!(matches!(
            blank,
            Err(CrmError::Validation(ValidationError::Empty { field: "name" }))
        ));
        let bad = Client::create(
            AgencyId::new(),
            NewClient {
                name: "x".into(),
                email: Some("x@".into()),
                ..Default::default()
            },
            None,
            Utc::now(),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn blank_patch_field_clears() {
        let mut c = client();
        c.apply(
            ClientPatch {
                email: Some(String::new()),
                notes: Some(" prefers aisle ".into()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(c.email, None);
        assert_eq!(c.notes, "prefers aisle");
        assert_eq!(c.name, "Maria Souza");
    }

    #[test]
    fn filter_matches() {
        let c = client();
        let by_text = ClientFilter {
            search: Some("SOUZA".into()),
            ..Default::default()
        };
        assert!(by_text.matches(&c));
        let by_tag = ClientFilter {
            tag: Some("Vip".into()),
            ..Default::default()
        };
        assert!(by_tag.matches(&c));
        let wrong_source = ClientFilter {
            source: Some(LeadSource::Website),
            ..Default::default()
        };
        assert!(!wrong_source.matches(&c));
        let wrong_stage = ClientFilter {
            stage_id: Some(StageId::new()),
            ..Default::default()
        };
        assert!(!wrong_stage.matches(&c));
    }
}
