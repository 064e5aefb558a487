//! Mutex-guarded in-process stores. Each call holds the lock for a single
//! map operation, so concurrent writers resolve as last-write-wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{ClaimId, ClaimRecord, ReviewFilter};
use super::links::{LinkId, LinkRecord};
use super::repository::{ClaimRepository, DependentRecords, LinkRepository, RepositoryError};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
}

pub struct InMemoryClaimRepository<K> {
    records: Arc<Mutex<HashMap<ClaimId, ClaimRecord<K>>>>,
}

impl<K> Default for InMemoryClaimRepository<K> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> Clone for InMemoryClaimRepository<K> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<K> ClaimRepository<K> for InMemoryClaimRepository<K>
where
    K: Clone + Send + Sync,
{
    fn insert(&self, record: ClaimRecord<K>) -> Result<ClaimRecord<K>, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id, record.clone());
        Ok(record)
    }

    fn update(&self, record: ClaimRecord<K>) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        match guard.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ClaimId) -> Result<Option<ClaimRecord<K>>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn list(&self, filter: &ReviewFilter) -> Result<Vec<ClaimRecord<K>>, RepositoryError> {
        let mut records: Vec<_> = lock(&self.records)?
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(records)
    }

    fn remove(&self, id: &ClaimId) -> Result<Option<ClaimRecord<K>>, RepositoryError> {
        Ok(lock(&self.records)?.remove(id))
    }

    fn count(&self) -> Result<usize, RepositoryError> {
        Ok(lock(&self.records)?.len())
    }
}

pub struct InMemoryLinkRepository<L> {
    records: Arc<Mutex<HashMap<LinkId, LinkRecord<L>>>>,
}

impl<L> Default for InMemoryLinkRepository<L> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<L> Clone for InMemoryLinkRepository<L> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<L> DependentRecords for InMemoryLinkRepository<L>
where
    L: Send + Sync,
{
    fn remove_for_parent(&self, parent: &ClaimId) -> Result<usize, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let before = guard.len();
        guard.retain(|_, record| record.parent != *parent);
        Ok(before - guard.len())
    }
}

impl<L> LinkRepository<L> for InMemoryLinkRepository<L>
where
    L: Clone + Send + Sync,
{
    fn insert(&self, record: LinkRecord<L>) -> Result<LinkRecord<L>, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id, record.clone());
        Ok(record)
    }

    fn update(&self, record: LinkRecord<L>) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        match guard.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &LinkId) -> Result<Option<LinkRecord<L>>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn for_parent(&self, parent: &ClaimId) -> Result<Vec<LinkRecord<L>>, RepositoryError> {
        let mut records: Vec<_> = lock(&self.records)?
            .values()
            .filter(|record| record.parent == *parent)
            .cloned()
            .collect();
        records.sort_by_key(|record| (record.created_at, record.id));
        Ok(records)
    }

    fn remove(&self, id: &LinkId) -> Result<Option<LinkRecord<L>>, RepositoryError> {
        Ok(lock(&self.records)?.remove(id))
    }

    fn list(&self) -> Result<Vec<LinkRecord<L>>, RepositoryError> {
        let mut records: Vec<_> = lock(&self.records)?.values().cloned().collect();
        records.sort_by_key(|record| (record.created_at, record.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::UserId;
    use chrono::{Duration, Utc};

    #[test]
    fn list_orders_by_creation_and_applies_filter() {
        let repository = InMemoryClaimRepository::<&'static str>::default();
        let owner = UserId::generate();
        let other = UserId::generate();
        let now = Utc::now();

        let later = ClaimRecord::new(owner, "later", now + Duration::seconds(5));
        let earlier = ClaimRecord::new(owner, "earlier", now);
        let foreign = ClaimRecord::new(other, "foreign", now);
        for record in [later, earlier, foreign] {
            repository.insert(record).expect("inserted");
        }

        let mine = repository
            .list(&ReviewFilter::owned_by(owner))
            .expect("listed");
        let details: Vec<_> = mine.iter().map(|record| record.details).collect();
        assert_eq!(details, vec!["earlier", "later"]);
        assert_eq!(repository.count().expect("count"), 3);
    }

    #[test]
    fn duplicate_ids_conflict_and_missing_updates_fail() {
        let repository = InMemoryClaimRepository::<u8>::default();
        let record = ClaimRecord::new(UserId::generate(), 1, Utc::now());
        repository.insert(record.clone()).expect("inserted");
        assert!(matches!(
            repository.insert(record.clone()),
            Err(RepositoryError::Conflict)
        ));

        let stranger = ClaimRecord::new(UserId::generate(), 2, Utc::now());
        assert!(matches!(
            repository.update(stranger),
            Err(RepositoryError::NotFound)
        ));
        assert!(repository.remove(&record.id).expect("removed").is_some());
        assert!(repository.fetch(&record.id).expect("fetched").is_none());
    }
}
