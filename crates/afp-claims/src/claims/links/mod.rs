//! People attached to a grant or publication other than its owner.

pub mod router;
pub mod service;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::domain::{ClaimId, EligibilityStatus};
use super::forms::{blank_as_none, checkbox};
use super::kinds::{validated, weighted_choice, ClaimKind, Choice, Grant, Publication};
use super::lookups::{LookupRegistry, WeightedTable};
use super::validation::FieldErrors;
use crate::accounts::UserId;

pub use router::link_router;
pub use service::LinkService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub Uuid);

impl LinkId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for LinkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A user linked to a parent claim, reviewed independently of the claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord<L> {
    pub id: LinkId,
    pub parent: ClaimId,
    pub user: UserId,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub eligibility: EligibilityStatus,
    pub decision_comments: Option<String>,
    pub details: L,
}

impl<L> LinkRecord<L> {
    pub fn new(parent: ClaimId, user: UserId, details: L, now: DateTime<Utc>) -> Self {
        Self {
            id: LinkId::generate(),
            parent,
            user,
            created_at: now,
            modified_at: now,
            eligibility: EligibilityStatus::default(),
            decision_comments: None,
            details,
        }
    }
}

/// Narrows the administrative link listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkFilter {
    pub parent: Option<ClaimId>,
    pub eligibility: Option<EligibilityStatus>,
}

impl LinkFilter {
    pub fn matches<L>(&self, record: &LinkRecord<L>) -> bool {
        self.parent.map_or(true, |parent| record.parent == parent)
            && self
                .eligibility
                .map_or(true, |status| record.eligibility == status)
    }
}

pub trait LinkKind: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Parent: ClaimKind;
    /// Admin path segment, e.g. `grant-links`.
    const ADMIN_RESOURCE: &'static str;

    type Form: DeserializeOwned + Validate + Send;

    fn from_form(form: Self::Form, lookups: &LookupRegistry) -> Result<Self, FieldErrors>;
}

/// A co-investigator's role on a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantLink {
    pub role: Choice,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct GrantLinkForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub role: Option<String>,
}

impl LinkKind for GrantLink {
    type Parent = Grant;
    const ADMIN_RESOURCE: &'static str = "grant-links";
    type Form = GrantLinkForm;

    fn from_form(form: GrantLinkForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let role = weighted_choice(
            &mut errors,
            "role",
            form.role.as_deref(),
            true,
            lookups,
            WeightedTable::GrantRole,
        );
        match role {
            Some(role) if errors.is_empty() => Ok(Self { role }),
            _ => Err(errors),
        }
    }
}

/// A co-author's role on a publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationLink {
    pub role: Choice,
    pub is_corresponding: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PublicationLinkForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    pub is_corresponding: bool,
}

impl LinkKind for PublicationLink {
    type Parent = Publication;
    const ADMIN_RESOURCE: &'static str = "publication-links";
    type Form = PublicationLinkForm;

    fn from_form(form: PublicationLinkForm, lookups: &LookupRegistry) -> Result<Self, FieldErrors> {
        let mut errors = validated(&form);
        let role = weighted_choice(
            &mut errors,
            "role",
            form.role.as_deref(),
            true,
            lookups,
            WeightedTable::PublicationRole,
        );
        match role {
            Some(role) if errors.is_empty() => Ok(Self {
                role,
                is_corresponding: form.is_corresponding,
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::validation::REQUIRED;

    #[test]
    fn link_ids_display_and_parse_as_uuids() {
        let id = LinkId::generate();
        let rendered = id.to_string();
        assert_eq!(rendered, id.0.hyphenated().to_string());
        assert_eq!(format!("{id}"), rendered);
        assert_eq!(format!(" {rendered} ").parse::<LinkId>().expect("parse"), id);
    }

    #[test]
    fn grant_link_requires_a_known_role() {
        let lookups = LookupRegistry::new();
        let role = lookups
            .add_weighted(WeightedTable::GrantRole, "Co-Investigator", 2.0)
            .expect("role");

        let errors = GrantLink::from_form(GrantLinkForm::default(), &lookups).expect_err("missing");
        assert_eq!(errors.get("role"), Some(&[REQUIRED.to_string()][..]));

        let link = GrantLink::from_form(
            GrantLinkForm {
                role: Some(role.id.to_string()),
            },
            &lookups,
        )
        .expect("valid");
        assert_eq!(link.role.name, "Co-Investigator");
    }

    #[test]
    fn publication_link_keeps_corresponding_flag() {
        let lookups = LookupRegistry::new();
        let role = lookups
            .add_weighted(WeightedTable::PublicationRole, "Senior author", 3.0)
            .expect("role");
        let link = PublicationLink::from_form(
            PublicationLinkForm {
                role: Some(role.id.to_string()),
                is_corresponding: true,
            },
            &lookups,
        )
        .expect("valid");
        assert!(link.is_corresponding);
        assert_eq!(PublicationLink::ADMIN_RESOURCE, "publication-links");
    }
}
