use crate::error::CrmError;
use crate::types::{Actor, AgencyId, HistoryEntryId, ProposalId, ProposalStatus, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 link in a proposal's status history
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    /// Previous hash of the first entry
    pub const GENESIS: ChainHash = ChainHash([0u8; 32]);

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(value, &mut out)?;
        Ok(Self(out))
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({})", self.to_hex())
    }
}

impl Serialize for ChainHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ChainHash::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// One audited status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: HistoryEntryId,
    pub proposal_id: ProposalId,
    pub agency_id: AgencyId,
    /// `None` for the entry that opens the proposal
    pub from_status: Option<ProposalStatus>,
    pub to_status: ProposalStatus,
    pub changed_by: Actor,
    pub reason: Option<String>,
    pub changed_at: Timestamp,
    pub prev_hash: ChainHash,
    pub hash: ChainHash,
}

impl StatusChange {
    /// Unsealed entry; [`StatusChange::seal`] links it into the chain
    #[must_use]
    pub fn new(
        proposal_id: ProposalId,
        agency_id: AgencyId,
        from_status: Option<ProposalStatus>,
        to_status: ProposalStatus,
        changed_by: Actor,
        reason: Option<String>,
        changed_at: Timestamp,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            proposal_id,
            agency_id,
            from_status,
            to_status,
            changed_by,
            reason,
            changed_at,
            prev_hash: ChainHash::GENESIS,
            hash: ChainHash::GENESIS,
        }
    }

    /// Link after `prev` and compute this entry's hash
    #[must_use]
    pub fn seal(mut self, prev: ChainHash) -> Self {
        self.prev_hash = prev;
        self.hash = compute_hash(&self);
        self
    }
}

/// Result of re-walking a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub entries_checked: usize,
    pub first_invalid_index: Option<usize>,
}

impl IntegrityReport {
    /// Turn a broken report into an error
    pub fn into_result(self) -> Result<(), CrmError> {
        match self.first_invalid_index {
            None => Ok(()),
            Some(index) => Err(CrmError::HistoryIntegrity { index }),
        }
    }
}

/// Re-walk the chain oldest first. Also checks that each entry starts where
/// the previous one ended, so a deleted row shows up as a break.
#[must_use]
pub fn verify_chain(entries: &[StatusChange]) -> IntegrityReport {
    let mut prev = ChainHash::GENESIS;
    let mut prev_status: Option<ProposalStatus> = None;
    for (index, entry) in entries.iter().enumerate() {
        let linked = entry.prev_hash == prev && entry.from_status == prev_status;
        if !linked || entry.hash != compute_hash(entry) {
            return IntegrityReport {
                valid: false,
                entries_checked: index + 1,
                first_invalid_index: Some(index),
            };
        }
        prev = entry.hash;
        prev_status = Some(entry.to_status);
    }
    IntegrityReport {
        valid: true,
        entries_checked: entries.len(),
        first_invalid_index: None,
    }
}

fn compute_hash(entry: &StatusChange) -> ChainHash {
    let mut hasher = Sha256::new();
    hasher.update(entry.id.0.as_bytes());
    hasher.update(entry.proposal_id.0.as_bytes());
    hasher.update(entry.agency_id.0.as_bytes());
    hasher.update(entry.from_status.map_or("", ProposalStatus::as_str).as_bytes());
    hasher.update([0]);
    hasher.update(entry.to_status.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.changed_by.to_key().as_bytes());
    hasher.update([0]);
    hasher.update(entry.reason.as_deref().unwrap_or("").as_bytes());
    hasher.update([0]);
    hasher.update(entry.changed_at.timestamp_micros().to_le_bytes());
    hasher.update(entry.prev_hash.0);
    ChainHash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;
    use chrono::{Duration, TimeZone, Utc};

    fn chain() -> Vec<StatusChange> {
        let proposal = ProposalId::new();
        let agency = AgencyId::new();
        let user = Actor::User(UserId::new());
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let steps = [
            (None, ProposalStatus::Draft),
            (Some(ProposalStatus::Draft), ProposalStatus::Sent),
            (Some(ProposalStatus::Sent), ProposalStatus::Approved),
        ];
        let mut prev = ChainHash::GENESIS;
        let mut out = Vec::new();
        for (i, (from, to)) in steps.into_iter().enumerate() {
            let at = t0 + Duration::hours(i64::try_from(i).unwrap());
            let entry = StatusChange::new(proposal, agency, from, to, user, None, at).seal(prev);
            prev = entry.hash;
            out.push(entry);
        }
        out
    }

    #[test]
    fn sealed_chain_verifies() {
        let entries = chain();
        let report = verify_chain(&entries);
        assert!(report.valid);
        assert_eq!(report.entries_checked, 3);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn tampered_reason_is_detected() {
        let mut entries = chain();
        entries[1].reason = Some("edited later".to_string());
        let report = verify_chain(&entries);
        assert_eq!(report.first_invalid_index, Some(1));
        assert_eq!(
            report.into_result(),
            Err(CrmError::HistoryIntegrity { index: 1 })
        );
    }

    #[test]
    fn removed_entry_is_detected() {
        let mut entries = chain();
        entries.remove(1);
        assert_eq!(verify_chain(&entries).first_invalid_index, Some(1));
    }

    #[test]
    fn hash_hex_round_trips() {
        let entries = chain();
        let hex = entries[2].hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(ChainHash::from_hex(&hex).unwrap(), entries[2].hash);
        let json = serde_json::to_string(&entries[2]).unwrap();
        let back: StatusChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entries[2]);
    }
}
