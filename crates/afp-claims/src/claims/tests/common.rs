use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::response::Response;
use axum::{Extension, Router};
use serde_json::Value;

use crate::accounts::{AccountDirectory, InMemoryAccountDirectory, UserAccount};
use crate::claims::domain::{ClaimId, ClaimRecord, ReviewFilter};
use crate::claims::evidence::{EvidencePolicy, InMemoryEvidenceStore, UploadedFile};
use crate::claims::extract::AuthContext;
use crate::claims::forms::FormSubmission;
use crate::claims::kinds::{Award, Grant};
use crate::claims::links::{GrantLink, LinkService};
use crate::claims::lookups::{GrantAgency, LookupRegistry, WeightedEntry, WeightedTable};
use crate::claims::memory::{InMemoryClaimRepository, InMemoryLinkRepository};
use crate::claims::repository::{ClaimRepository, RepositoryError};
use crate::claims::service::ClaimService;

pub(super) const USER_HEADER: &str = "x-remote-user";

pub(super) type AwardService = ClaimService<Award, InMemoryClaimRepository<Award>>;
pub(super) type GrantService = ClaimService<Grant, InMemoryClaimRepository<Grant>>;
pub(super) type GrantLinks = LinkService<GrantLink, InMemoryLinkRepository<GrantLink>>;

pub(super) struct Fixture {
    pub lookups: Arc<LookupRegistry>,
    pub evidence: InMemoryEvidenceStore,
    pub accounts: InMemoryAccountDirectory,
    pub owner: UserAccount,
    pub colleague: UserAccount,
    pub national: WeightedEntry,
    pub agency: GrantAgency,
    pub co_investigator: WeightedEntry,
}

pub(super) fn fixture() -> Fixture {
    let lookups = Arc::new(LookupRegistry::new());
    let national = lookups
        .add_weighted(WeightedTable::AwardLevel, "National", 500.0)
        .expect("award level");
    let category = lookups
        .add_weighted(WeightedTable::GrantCategory, "Peer reviewed", 1.0)
        .expect("grant category");
    let federal = lookups.add_agency_type("Federal").expect("agency type");
    let agency = lookups
        .add_agency("CIHR", federal.id, category.id)
        .expect("agency");
    let co_investigator = lookups
        .add_weighted(WeightedTable::GrantRole, "Co-Investigator", 2.0)
        .expect("grant role");

    let accounts = InMemoryAccountDirectory::default();
    let owner = accounts
        .insert(UserAccount::new("owner@example.org", "Olive", "Owner").expect("account"))
        .expect("insert owner");
    let colleague = accounts
        .insert(UserAccount::new("colleague@example.org", "Cal", "Colleague").expect("account"))
        .expect("insert colleague");

    Fixture {
        lookups,
        evidence: InMemoryEvidenceStore::default(),
        accounts,
        owner,
        colleague,
        national,
        agency,
        co_investigator,
    }
}

impl Fixture {
    pub(super) fn award_service(&self) -> Arc<AwardService> {
        Arc::new(ClaimService::new(
            Arc::new(InMemoryClaimRepository::default()),
            Arc::clone(&self.lookups),
            Arc::new(self.evidence.clone()),
            EvidencePolicy::default(),
        ))
    }

    pub(super) fn grant_services(&self) -> (Arc<GrantService>, Arc<GrantLinks>) {
        let grants = Arc::new(InMemoryClaimRepository::<Grant>::default());
        let links = Arc::new(InMemoryLinkRepository::<GrantLink>::default());
        let service = ClaimService::new(
            Arc::clone(&grants),
            Arc::clone(&self.lookups),
            Arc::new(self.evidence.clone()),
            EvidencePolicy::default(),
        )
        .with_dependents(links.clone());
        let link_service = LinkService::new(
            links,
            grants,
            Arc::new(self.accounts.clone()),
            Arc::clone(&self.lookups),
        );
        (Arc::new(service), Arc::new(link_service))
    }

    pub(super) fn award_submission(&self) -> FormSubmission {
        FormSubmission::new()
            .with_field("name", "Teaching Excellence")
            .with_field("organization", "University of Toronto")
            .with_field("award_level", self.national.id.to_string())
            .with_field("comments", "Presented at convocation")
    }

    pub(super) fn grant_submission(&self) -> FormSubmission {
        FormSubmission::new()
            .with_field("name", "Sleep and mood in adolescents")
            .with_field("amount", "125000.50")
            .with_field("agency", self.agency.id.to_string())
            .with_field("pi_list", "A. Owner")
            .with_field("coi_list", "C. Colleague")
            .with_field("start_date", "2023-07-01")
            .with_field("end_date", "2026-06-30")
    }

    pub(super) fn auth_context(&self) -> Arc<AuthContext> {
        Arc::new(AuthContext::new(
            Arc::new(self.accounts.clone()),
            HeaderName::from_static(USER_HEADER),
            "/accounts/login/",
        ))
    }

    /// Wrap `router` with the authentication extension the extractors expect.
    pub(super) fn authenticated(&self, router: Router) -> Router {
        router.layer(Extension(self.auth_context()))
    }
}

pub(super) fn pdf(name: &str, size: usize) -> UploadedFile {
    UploadedFile::new(name, Some("application/pdf".to_string()), vec![b'%'; size])
}

pub(super) fn form_request(uri: &str, user: &UserAccount, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(USER_HEADER, user.id.to_string())
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub(super) fn get_request(uri: &str, user: &UserAccount) -> Request<Body> {
    Request::get(uri)
        .header(USER_HEADER, user.id.to_string())
        .body(Body::empty())
        .expect("request")
}

pub(super) fn location(response: &Response) -> &str {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .expect("location header")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Repository whose backing store is always down.
pub(super) struct UnavailableRepository;

impl ClaimRepository<Award> for UnavailableRepository {
    fn insert(&self, _record: ClaimRecord<Award>) -> Result<ClaimRecord<Award>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: ClaimRecord<Award>) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ClaimId) -> Result<Option<ClaimRecord<Award>>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _filter: &ReviewFilter) -> Result<Vec<ClaimRecord<Award>>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn remove(&self, _id: &ClaimId) -> Result<Option<ClaimRecord<Award>>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn count(&self) -> Result<usize, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Awards that disappear between the edit form being read and saved.
#[derive(Default)]
pub(super) struct VanishingAwards(pub InMemoryClaimRepository<Award>);

impl ClaimRepository<Award> for VanishingAwards {
    fn insert(&self, record: ClaimRecord<Award>) -> Result<ClaimRecord<Award>, RepositoryError> {
        self.0.insert(record)
    }

    fn update(&self, _record: ClaimRecord<Award>) -> Result<(), RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    fn fetch(&self, id: &ClaimId) -> Result<Option<ClaimRecord<Award>>, RepositoryError> {
        self.0.fetch(id)
    }

    fn list(&self, filter: &ReviewFilter) -> Result<Vec<ClaimRecord<Award>>, RepositoryError> {
        self.0.list(filter)
    }

    fn remove(&self, id: &ClaimId) -> Result<Option<ClaimRecord<Award>>, RepositoryError> {
        self.0.remove(id)
    }

    fn count(&self) -> Result<usize, RepositoryError> {
        self.0.count()
    }
}
