use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::evidence::StoredFile;
use crate::accounts::UserId;

/// Opaque identifier assigned to a claim at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub Uuid);

impl ClaimId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ClaimId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Where the data in a claim came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    #[default]
    SelfReport,
    Registry,
    UserEdit,
}

impl EntryType {
    pub const fn code(self) -> i8 {
        match self {
            EntryType::SelfReport => 1,
            EntryType::Registry => 2,
            EntryType::UserEdit => 3,
        }
    }

    pub const fn from_code(code: i8) -> Option<Self> {
        match code {
            1 => Some(EntryType::SelfReport),
            2 => Some(EntryType::Registry),
            3 => Some(EntryType::UserEdit),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EntryType::SelfReport => "Self-report",
            EntryType::Registry => "Data entered from registry",
            EntryType::UserEdit => "Data entered and edited by physician",
        }
    }

    /// Provenance once the physician has edited the record themselves.
    pub const fn after_user_edit(self) -> Self {
        match self {
            EntryType::Registry => EntryType::UserEdit,
            other => other,
        }
    }
}

impl FromStr for EntryType {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i8>() {
            return Self::from_code(code).ok_or_else(|| UnknownChoice(trimmed.to_string()));
        }
        match trimmed.to_ascii_lowercase().replace('-', "_").as_str() {
            "self_report" => Ok(EntryType::SelfReport),
            "registry" => Ok(EntryType::Registry),
            "user_edit" => Ok(EntryType::UserEdit),
            _ => Err(UnknownChoice(trimmed.to_string())),
        }
    }
}

/// Administrative review state of a claim. Any state may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityStatus {
    ToConfirm,
    #[default]
    NotReviewed,
    Ineligible,
    Eligible,
}

impl EligibilityStatus {
    pub const ALL: [Self; 4] = [
        Self::ToConfirm,
        Self::NotReviewed,
        Self::Ineligible,
        Self::Eligible,
    ];

    pub const fn code(self) -> i8 {
        match self {
            EligibilityStatus::ToConfirm => -2,
            EligibilityStatus::NotReviewed => -1,
            EligibilityStatus::Ineligible => 0,
            EligibilityStatus::Eligible => 1,
        }
    }

    pub const fn from_code(code: i8) -> Option<Self> {
        match code {
            -2 => Some(EligibilityStatus::ToConfirm),
            -1 => Some(EligibilityStatus::NotReviewed),
            0 => Some(EligibilityStatus::Ineligible),
            1 => Some(EligibilityStatus::Eligible),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EligibilityStatus::ToConfirm => "To confirm",
            EligibilityStatus::NotReviewed => "Not reviewed",
            EligibilityStatus::Ineligible => "Ineligible",
            EligibilityStatus::Eligible => "Eligible",
        }
    }
}

impl FromStr for EligibilityStatus {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i8>() {
            return Self::from_code(code).ok_or_else(|| UnknownChoice(trimmed.to_string()));
        }
        match trimmed.to_ascii_lowercase().replace('-', "_").as_str() {
            "to_confirm" => Ok(EligibilityStatus::ToConfirm),
            "not_reviewed" => Ok(EligibilityStatus::NotReviewed),
            "ineligible" => Ok(EligibilityStatus::Ineligible),
            "eligible" => Ok(EligibilityStatus::Eligible),
            _ => Err(UnknownChoice(trimmed.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not one of the available choices")]
pub struct UnknownChoice(pub String);

/// Evidence attached to a claim: stored uploads keyed by form field, and a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, StoredFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
}

/// A stored claim of kind `K` with the metadata every claim carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord<K> {
    pub id: ClaimId,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub entry_type: EntryType,
    pub eligibility: EligibilityStatus,
    pub comments: Option<String>,
    pub decision_comments: Option<String>,
    pub verification: Verification,
    pub details: K,
}

impl<K> ClaimRecord<K> {
    pub fn new(owner: UserId, details: K, now: DateTime<Utc>) -> Self {
        Self {
            id: ClaimId::generate(),
            owner,
            created_at: now,
            modified_at: now,
            entry_type: EntryType::default(),
            eligibility: EligibilityStatus::default(),
            comments: None,
            decision_comments: None,
            verification: Verification::default(),
            details,
        }
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner == *user
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.modified_at = now;
    }
}

/// Outcome recorded by an administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    pub eligibility: EligibilityStatus,
    pub decision_comments: Option<String>,
}

/// Narrows the administrative listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    pub eligibility: Option<EligibilityStatus>,
    pub owner: Option<UserId>,
}

impl ReviewFilter {
    pub fn owned_by(owner: UserId) -> Self {
        Self {
            eligibility: None,
            owner: Some(owner),
        }
    }

    pub fn matches<K>(&self, record: &ClaimRecord<K>) -> bool {
        self.eligibility
            .map_or(true, |status| record.eligibility == status)
            && self.owner.map_or(true, |owner| record.owner == owner)
    }
}
