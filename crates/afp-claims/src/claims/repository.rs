use super::domain::{ClaimId, ClaimRecord, ReviewFilter};
use super::links::{LinkId, LinkRecord};

/// Storage abstraction so the claim services can be exercised in isolation.
pub trait ClaimRepository<K>: Send + Sync {
    fn insert(&self, record: ClaimRecord<K>) -> Result<ClaimRecord<K>, RepositoryError>;
    fn update(&self, record: ClaimRecord<K>) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ClaimId) -> Result<Option<ClaimRecord<K>>, RepositoryError>;
    /// Matching records, oldest first.
    fn list(&self, filter: &ReviewFilter) -> Result<Vec<ClaimRecord<K>>, RepositoryError>;
    fn remove(&self, id: &ClaimId) -> Result<Option<ClaimRecord<K>>, RepositoryError>;
    fn count(&self) -> Result<usize, RepositoryError>;
}

/// Records owned by a claim that must go when the claim goes.
pub trait DependentRecords: Send + Sync {
    fn remove_for_parent(&self, parent: &ClaimId) -> Result<usize, RepositoryError>;
}

pub trait LinkRepository<L>: DependentRecords {
    fn insert(&self, record: LinkRecord<L>) -> Result<LinkRecord<L>, RepositoryError>;
    fn update(&self, record: LinkRecord<L>) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &LinkId) -> Result<Option<LinkRecord<L>>, RepositoryError>;
    fn for_parent(&self, parent: &ClaimId) -> Result<Vec<LinkRecord<L>>, RepositoryError>;
    fn remove(&self, id: &LinkId) -> Result<Option<LinkRecord<L>>, RepositoryError>;
    fn list(&self) -> Result<Vec<LinkRecord<L>>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
