use std::marker::PhantomData;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;

use super::domain::{
    ClaimId, ClaimRecord, EligibilityStatus, EntryType, ReviewDecision, ReviewFilter, Verification,
};
use super::evidence::{
    upload_path, EvidenceField, EvidencePolicy, EvidenceStore, EvidenceStoreError, StoredFile,
    UploadedFile,
};
use super::forms::{clear_flag, is_checked, CommonFields, FormSubmission};
use super::kinds::ClaimKind;
use super::lookups::LookupRegistry;
use super::repository::{ClaimRepository, DependentRecords, RepositoryError};
use super::validation::FieldErrors;
use crate::accounts::{AccountError, UserId};

/// A fully validated submission, ready to be applied to a record.
#[derive(Debug)]
pub struct CleanedClaim<K> {
    pub details: K,
    pub common: CommonFields,
    pub uploads: Vec<(EvidenceField, UploadedFile)>,
    /// Evidence fields whose stored file should be removed.
    pub cleared: Vec<EvidenceField>,
}

/// Files written for one save, settled once the record is persisted.
#[derive(Debug, Default)]
struct StagedEvidence {
    saved: Vec<StoredFile>,
    released: Vec<StoredFile>,
}

/// A claim row produced by the bulk importer.
#[derive(Debug, Clone)]
pub struct ImportedClaim<K> {
    pub owner: UserId,
    pub details: K,
    pub entry_type: Option<EntryType>,
    pub eligibility: Option<EligibilityStatus>,
    pub comments: Option<String>,
    pub ver_url: Option<Url>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(ClaimId),
    Updated(ClaimId),
}

/// CRUD and review operations for one claim type.
pub struct ClaimService<K, R> {
    repository: Arc<R>,
    lookups: Arc<LookupRegistry>,
    evidence: Arc<dyn EvidenceStore>,
    policy: EvidencePolicy,
    dependents: Vec<Arc<dyn DependentRecords>>,
    kind: PhantomData<fn() -> K>,
}

impl<K, R> ClaimService<K, R>
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    pub fn new(
        repository: Arc<R>,
        lookups: Arc<LookupRegistry>,
        evidence: Arc<dyn EvidenceStore>,
        policy: EvidencePolicy,
    ) -> Self {
        Self {
            repository,
            lookups,
            evidence,
            policy,
            dependents: Vec::new(),
            kind: PhantomData,
        }
    }

    /// Register records that are deleted along with each claim.
    pub fn with_dependents(mut self, dependents: Arc<dyn DependentRecords>) -> Self {
        self.dependents.push(dependents);
        self
    }

    pub fn lookups(&self) -> &Arc<LookupRegistry> {
        &self.lookups
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// The owner's claims, oldest first.
    pub fn list(&self, owner: &UserId) -> Result<Vec<ClaimRecord<K>>, ClaimServiceError> {
        Ok(self.repository.list(&ReviewFilter::owned_by(*owner))?)
    }

    /// Fetch a claim on behalf of `owner`. Other users' claims are not found.
    pub fn get(&self, owner: &UserId, id: &ClaimId) -> Result<ClaimRecord<K>, ClaimServiceError> {
        self.repository
            .fetch(id)?
            .filter(|record| record.is_owned_by(owner))
            .ok_or(ClaimServiceError::NotFound)
    }

    /// Validate a submission without touching storage.
    pub fn clean(&self, submission: &FormSubmission) -> Result<CleanedClaim<K>, FieldErrors> {
        let mut errors = FieldErrors::new();

        let details = match submission.decode::<K::Form>() {
            Ok(form) => match K::from_form(form, &self.lookups) {
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

        let common = match CommonFields::clean(submission) {
            Ok(common) => Some(common),
            Err(report) => {
                errors.merge(report);
                None
            }
        };

        let mut uploads = Vec::new();
        let mut cleared = Vec::new();
        for field in K::EVIDENCE {
            match submission.file(field.name) {
                Some(file) => match self.policy.check(field, file) {
                    Ok(()) => uploads.push((*field, file.clone())),
                    Err(message) => errors.add(field.name, message),
                },
                None if submission
                    .field(&clear_flag(field.name))
                    .map_or(false, is_checked) =>
                {
                    cleared.push(*field)
                }
                None => {}
            }
        }

        match (details, common) {
            (Some(details), Some(common)) if errors.is_empty() => Ok(CleanedClaim {
                details,
                common,
                uploads,
                cleared,
            }),
            _ => Err(errors),
        }
    }

    pub fn create(
        &self,
        owner: UserId,
        submission: &FormSubmission,
    ) -> Result<ClaimRecord<K>, ClaimServiceError> {
        let cleaned = self.clean(submission)?;
        let mut record = ClaimRecord::new(owner, cleaned.details, Utc::now());
        record.comments = cleaned.common.comments.clone();
        record.verification.url = cleaned.common.verification_url();
        let staged = self.stage_uploads(&owner, &cleaned.uploads, &mut record.verification)?;

        let outcome = self.repository.insert(record);
        let stored = self.settle(staged, outcome)?;
        info!(
            resource = K::RESOURCE,
            claim = %stored.id,
            owner = %owner,
            "claim created"
        );
        Ok(stored)
    }

    /// Apply a user edit. Review state, identity and ownership are kept.
    pub fn update(
        &self,
        owner: &UserId,
        id: &ClaimId,
        submission: &FormSubmission,
    ) -> Result<ClaimRecord<K>, ClaimServiceError> {
        let mut record = self.get(owner, id)?;
        let cleaned = self.clean(submission)?;

        record.details = cleaned.details;
        record.comments = cleaned.common.comments.clone();
        record.verification.url = cleaned.common.verification_url();
        record.entry_type = record.entry_type.after_user_edit();
        let mut staged = self.stage_uploads(owner, &cleaned.uploads, &mut record.verification)?;
        for field in &cleaned.cleared {
            if let Some(previous) = record.verification.files.remove(field.name) {
                staged.released.push(previous);
            }
        }
        record.touch(Utc::now());

        let outcome = self.repository.update(record.clone());
        self.settle(staged, outcome)?;
        info!(
            resource = K::RESOURCE,
            claim = %record.id,
            owner = %owner,
            entry_type = ?record.entry_type,
            "claim updated"
        );
        Ok(record)
    }

    pub fn delete(&self, owner: &UserId, id: &ClaimId) -> Result<(), ClaimServiceError> {
        let record = self.get(owner, id)?;
        self.remove_record(record)
    }

    /// Every claim of this type matching `filter`, for administrators.
    pub fn list_all(&self, filter: &ReviewFilter) -> Result<Vec<ClaimRecord<K>>, ClaimServiceError> {
        Ok(self.repository.list(filter)?)
    }

    pub fn fetch_any(&self, id: &ClaimId) -> Result<ClaimRecord<K>, ClaimServiceError> {
        self.repository
            .fetch(id)?
            .ok_or(ClaimServiceError::NotFound)
    }

    /// Record an administrative eligibility decision. Any status may follow any other.
    pub fn review(
        &self,
        id: &ClaimId,
        decision: ReviewDecision,
    ) -> Result<ClaimRecord<K>, ClaimServiceError> {
        let mut record = self.fetch_any(id)?;
        let previous = record.eligibility;
        record.eligibility = decision.eligibility;
        record.decision_comments = decision.decision_comments;
        record.touch(Utc::now());

        self.repository.update(record.clone())?;
        info!(
            resource = K::RESOURCE,
            claim = %record.id,
            from = previous.label(),
            to = record.eligibility.label(),
            "claim reviewed"
        );
        Ok(record)
    }

    pub fn delete_any(&self, id: &ClaimId) -> Result<(), ClaimServiceError> {
        let record = self.fetch_any(id)?;
        self.remove_record(record)
    }

    pub fn count(&self) -> Result<usize, ClaimServiceError> {
        Ok(self.repository.count()?)
    }

    /// Update the first claim accepted by `matches`, or insert a new one.
    pub fn upsert_imported(
        &self,
        imported: ImportedClaim<K>,
        matches: impl Fn(&ClaimRecord<K>) -> bool,
    ) -> Result<UpsertOutcome, ClaimServiceError> {
        let existing = self
            .repository
            .list(&ReviewFilter::default())?
            .into_iter()
            .find(|record| matches(record));

        match existing {
            Some(mut record) => {
                record.details = imported.details;
                if let Some(entry_type) = imported.entry_type {
                    record.entry_type = entry_type;
                }
                if let Some(eligibility) = imported.eligibility {
                    record.eligibility = eligibility;
                }
                if imported.comments.is_some() {
                    record.comments = imported.comments;
                }
                if imported.ver_url.is_some() {
                    record.verification.url = imported.ver_url;
                }
                record.touch(Utc::now());
                let id = record.id;
                self.repository.update(record)?;
                Ok(UpsertOutcome::Updated(id))
            }
            None => {
                let mut record = ClaimRecord::new(imported.owner, imported.details, Utc::now());
                record.entry_type = imported.entry_type.unwrap_or(EntryType::Registry);
                record.eligibility = imported.eligibility.unwrap_or_default();
                record.comments = imported.comments;
                record.verification.url = imported.ver_url;
                let stored = self.repository.insert(record)?;
                Ok(UpsertOutcome::Created(stored.id))
            }
        }
    }

    fn remove_record(&self, record: ClaimRecord<K>) -> Result<(), ClaimServiceError> {
        self.repository
            .remove(&record.id)?
            .ok_or(ClaimServiceError::NotFound)?;

        let mut cascaded = 0;
        for dependents in &self.dependents {
            cascaded += dependents.remove_for_parent(&record.id)?;
        }
        for stored in record.verification.files.values() {
            self.discard(stored);
        }

        info!(
            resource = K::RESOURCE,
            claim = %record.id,
            owner = %record.owner,
            cascaded,
            "claim deleted"
        );
        Ok(())
    }

    /// Write `uploads` and point `verification` at them. Replaced files are
    /// only released, not removed, until the record is saved.
    fn stage_uploads(
        &self,
        owner: &UserId,
        uploads: &[(EvidenceField, UploadedFile)],
        verification: &mut Verification,
    ) -> Result<StagedEvidence, ClaimServiceError> {
        let mut staged = StagedEvidence::default();
        for (field, file) in uploads {
            let path = upload_path(owner, K::ENTITY_NAME, &file.file_name);
            let saved = match self.evidence.save(&path, &file.data) {
                Ok(saved) => saved,
                Err(err) => {
                    staged.saved.iter().for_each(|stored| self.discard(stored));
                    return Err(err.into());
                }
            };
            let stored = StoredFile {
                path: saved,
                file_name: file.file_name.clone(),
                content_type: file.effective_content_type().unwrap_or_default(),
                size: file.size(),
            };
            staged.saved.push(stored.clone());
            if let Some(previous) = verification.files.insert(field.name.to_string(), stored) {
                staged.released.push(previous);
            }
        }
        Ok(staged)
    }

    /// Drop released files once the record is stored, or the new ones if it was not.
    fn settle<T>(
        &self,
        staged: StagedEvidence,
        outcome: Result<T, RepositoryError>,
    ) -> Result<T, ClaimServiceError> {
        match outcome {
            Ok(value) => {
                staged.released.iter().for_each(|stored| self.discard(stored));
                Ok(value)
            }
            Err(err) => {
                staged.saved.iter().for_each(|stored| self.discard(stored));
                Err(err.into())
            }
        }
    }

    fn discard(&self, stored: &StoredFile) {
        if let Err(err) = self.evidence.remove(&stored.path) {
            warn!(path = %stored.path, error = %err, "failed to remove evidence file");
        }
    }
}

/// Error raised by the claim services.
#[derive(Debug, thiserror::Error)]
pub enum ClaimServiceError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("claim not found")]
    NotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Evidence(#[from] EvidenceStoreError),
    #[error(transparent)]
    Accounts(#[from] AccountError),
}

impl From<FieldErrors> for ClaimServiceError {
    fn from(value: FieldErrors) -> Self {
        Self::Validation(value)
    }
}

impl IntoResponse for ClaimServiceError {
    fn into_response(self) -> Response {
        match self {
            ClaimServiceError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response(),
            ClaimServiceError::NotFound
            | ClaimServiceError::Repository(RepositoryError::NotFound) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not found" })),
            )
                .into_response(),
            other => {
                error!(error = %other, "claim request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}
