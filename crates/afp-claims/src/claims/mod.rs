//! Self-reported academic activity claims and their evidence.

pub mod domain;
pub mod evidence;
pub mod extract;
pub mod forms;
pub mod kinds;
pub mod links;
pub mod lookups;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    ClaimId, ClaimRecord, EligibilityStatus, EntryType, ReviewDecision, ReviewFilter,
    UnknownChoice, Verification,
};
pub use evidence::{
    EvidencePolicy, EvidenceStore, EvidenceStoreError, InMemoryEvidenceStore,
    LocalEvidenceStore, StoredFile, UploadedFile,
};
pub use extract::{AuthContext, AuthRejection, CurrentUser, StaffUser};
pub use forms::FormSubmission;
pub use kinds::{
    Award, ClaimKind, CommitteeWork, Cpa, EditorialBoard, Exam, Grant, GrantReview, Lecture,
    Promotion, Publication, Supervision,
};
pub use links::{
    GrantLink, LinkFilter, LinkId, LinkKind, LinkRecord, LinkService, PublicationLink,
};
pub use lookups::{LookupError, LookupId, LookupRegistry, WeightedEntry, WeightedTable};
pub use memory::{InMemoryClaimRepository, InMemoryLinkRepository};
pub use repository::{ClaimRepository, DependentRecords, LinkRepository, RepositoryError};
pub use router::claim_router;
pub use service::{ClaimService, ClaimServiceError, ImportedClaim, UpsertOutcome};
pub use validation::FieldErrors;
