use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{LinkFilter, LinkId, LinkKind, LinkRecord};
use crate::accounts::{AccountDirectory, UserId};
use crate::claims::domain::{ClaimId, ClaimRecord, ReviewDecision};
use crate::claims::forms::{blank_as_none, FormSubmission};
use crate::claims::lookups::LookupRegistry;
use crate::claims::repository::{ClaimRepository, LinkRepository};
use crate::claims::service::ClaimServiceError;
use crate::claims::validation::{FieldErrors, INVALID_CHOICE, REQUIRED};

pub const ALREADY_LINKED: &str = "This person is already linked to this record.";

#[derive(Debug, Default, Deserialize)]
struct LinkTarget {
    #[serde(default, deserialize_with = "blank_as_none")]
    user: Option<String>,
}

/// Manages the users linked to claims of `L::Parent`.
pub struct LinkService<L: LinkKind, R> {
    repository: Arc<R>,
    parents: Arc<dyn ClaimRepository<L::Parent>>,
    accounts: Arc<dyn AccountDirectory>,
    lookups: Arc<LookupRegistry>,
}

impl<L, R> LinkService<L, R>
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    pub fn new(
        repository: Arc<R>,
        parents: Arc<dyn ClaimRepository<L::Parent>>,
        accounts: Arc<dyn AccountDirectory>,
        lookups: Arc<LookupRegistry>,
    ) -> Self {
        Self {
            repository,
            parents,
            accounts,
            lookups,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    fn owned_parent(
        &self,
        owner: &UserId,
        parent: &ClaimId,
    ) -> Result<ClaimRecord<L::Parent>, ClaimServiceError> {
        self.parents
            .fetch(parent)?
            .filter(|record| record.is_owned_by(owner))
            .ok_or(ClaimServiceError::NotFound)
    }

    /// Links on a claim the requester owns.
    pub fn list(
        &self,
        owner: &UserId,
        parent: &ClaimId,
    ) -> Result<Vec<LinkRecord<L>>, ClaimServiceError> {
        self.owned_parent(owner, parent)?;
        Ok(self.repository.for_parent(parent)?)
    }

    /// Link another active user to the owner's claim.
    pub fn add(
        &self,
        owner: &UserId,
        parent: &ClaimId,
        submission: &FormSubmission,
    ) -> Result<LinkRecord<L>, ClaimServiceError> {
        self.owned_parent(owner, parent)?;

        let mut errors = FieldErrors::new();
        let user = match submission.decode::<LinkTarget>() {
            Ok(LinkTarget { user: Some(raw) }) => match raw.parse::<UserId>() {
                Ok(id) => match self.accounts.active(&id)? {
                    Some(account) => Some(account.id),
                    None => {
                        errors.add("user", INVALID_CHOICE);
                        None
                    }
                },
                Err(_) => {
                    errors.add("user", INVALID_CHOICE);
                    None
                }
            },
            Ok(LinkTarget { user: None }) => {
                errors.add("user", REQUIRED);
                None
            }
            Err(report) => {
                errors.merge(report);
                None
            }
        };

        let details = match submission.decode::<L::Form>() {
            Ok(form) => match L::from_form(form, &self.lookups) {
                Ok(details) => Some(details),
                Err(report) => {
                    errors.merge(report);
                    None
                }
            },
            Err(report) => {
                errors.merge(report);
                None
            }
        };

        if let Some(user) = user {
            let linked = self
                .repository
                .for_parent(parent)?
                .iter()
                .any(|link| link.user == user);
            if linked {
                errors.add("user", ALREADY_LINKED);
            }
        }

        let (Some(user), Some(details)) = (user, details) else {
            return Err(errors.into());
        };
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let stored = self
            .repository
            .insert(LinkRecord::new(*parent, user, details, Utc::now()))?;
        info!(
            resource = L::ADMIN_RESOURCE,
            link = %stored.id,
            parent = %parent,
            user = %user,
            "link added"
        );
        Ok(stored)
    }

    pub fn remove(
        &self,
        owner: &UserId,
        parent: &ClaimId,
        link: &LinkId,
    ) -> Result<(), ClaimServiceError> {
        self.owned_parent(owner, parent)?;
        let record = self
            .repository
            .fetch(link)?
            .filter(|record| record.parent == *parent)
            .ok_or(ClaimServiceError::NotFound)?;
        self.repository.remove(&record.id)?;
        info!(
            resource = L::ADMIN_RESOURCE,
            link = %record.id,
            parent = %parent,
            "link removed"
        );
        Ok(())
    }

    /// Every link, optionally narrowed to one parent claim or review status.
    pub fn list_all(&self, filter: &LinkFilter) -> Result<Vec<LinkRecord<L>>, ClaimServiceError> {
        Ok(self
            .repository
            .list()?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    pub fn fetch_any(&self, link: &LinkId) -> Result<LinkRecord<L>, ClaimServiceError> {
        self.repository
            .fetch(link)?
            .ok_or(ClaimServiceError::NotFound)
    }

    pub fn review(
        &self,
        link: &LinkId,
        decision: ReviewDecision,
    ) -> Result<LinkRecord<L>, ClaimServiceError> {
        let mut record = self.fetch_any(link)?;
        record.eligibility = decision.eligibility;
        record.decision_comments = decision.decision_comments;
        record.modified_at = Utc::now();
        self.repository.update(record.clone())?;
        info!(
            resource = L::ADMIN_RESOURCE,
            link = %record.id,
            status = record.eligibility.label(),
            "link reviewed"
        );
        Ok(record)
    }

    pub fn delete_any(&self, link: &LinkId) -> Result<(), ClaimServiceError> {
        self.repository
            .remove(link)?
            .map(|_| ())
            .ok_or(ClaimServiceError::NotFound)
    }

    pub fn count(&self) -> Result<usize, ClaimServiceError> {
        Ok(self.repository.list()?.len())
    }
}
