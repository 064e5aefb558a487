use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use afp_claims::accounts::{ensure_admin, AccountDirectory, InMemoryAccountDirectory, UserId};
use afp_claims::admin::ResourceSummary;
use afp_claims::claims::{
    Award, ClaimKind, ClaimService, CommitteeWork, Cpa, EditorialBoard, EvidencePolicy,
    EvidenceStore, Exam, Grant, GrantLink, GrantReview, InMemoryClaimRepository,
    InMemoryLinkRepository, Lecture, LinkService, LocalEvidenceStore, LookupError, LookupRegistry,
    Promotion, Publication, PublicationLink, Supervision, WeightedTable,
};
use afp_claims::config::AppConfig;
use afp_claims::error::AppError;
use afp_claims::import::{AccountImporter, ClaimImporter, ImportSink, JournalImporter};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Service<K> = Arc<ClaimService<K, InMemoryClaimRepository<K>>>;
pub(crate) type Links<L> = Arc<LinkService<L, InMemoryLinkRepository<L>>>;

/// Every service the HTTP surface is built from, sharing one set of stores.
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) accounts: Arc<dyn AccountDirectory>,
    pub(crate) lookups: Arc<LookupRegistry>,
    pub(crate) awards: Service<Award>,
    pub(crate) promotions: Service<Promotion>,
    pub(crate) editorial_boards: Service<EditorialBoard>,
    pub(crate) committee_work: Service<CommitteeWork>,
    pub(crate) grants: Service<Grant>,
    pub(crate) grant_reviews: Service<GrantReview>,
    pub(crate) publications: Service<Publication>,
    pub(crate) lectures: Service<Lecture>,
    pub(crate) exams: Service<Exam>,
    pub(crate) supervision: Service<Supervision>,
    pub(crate) cpas: Service<Cpa>,
    pub(crate) grant_links: Links<GrantLink>,
    pub(crate) publication_links: Links<PublicationLink>,
}

impl Services {
    pub(crate) fn in_memory(
        accounts: Arc<dyn AccountDirectory>,
        lookups: Arc<LookupRegistry>,
        evidence: Arc<dyn EvidenceStore>,
        policy: EvidencePolicy,
    ) -> Self {
        let grant_repository = Arc::new(InMemoryClaimRepository::<Grant>::default());
        let grant_link_repository = Arc::new(InMemoryLinkRepository::<GrantLink>::default());
        let grants = ClaimService::new(
            Arc::clone(&grant_repository),
            Arc::clone(&lookups),
            Arc::clone(&evidence),
            policy,
        )
        .with_dependents(grant_link_repository.clone());
        let grant_links = LinkService::new(
            grant_link_repository,
            grant_repository,
            Arc::clone(&accounts),
            Arc::clone(&lookups),
        );

        let publication_repository = Arc::new(InMemoryClaimRepository::<Publication>::default());
        let publication_link_repository =
            Arc::new(InMemoryLinkRepository::<PublicationLink>::default());
        let publications = ClaimService::new(
            Arc::clone(&publication_repository),
            Arc::clone(&lookups),
            Arc::clone(&evidence),
            policy,
        )
        .with_dependents(publication_link_repository.clone());
        let publication_links = LinkService::new(
            publication_link_repository,
            publication_repository,
            Arc::clone(&accounts),
            Arc::clone(&lookups),
        );

        Self {
            awards: claim_service(&lookups, &evidence, policy),
            promotions: claim_service(&lookups, &evidence, policy),
            editorial_boards: claim_service(&lookups, &evidence, policy),
            committee_work: claim_service(&lookups, &evidence, policy),
            grants: Arc::new(grants),
            grant_reviews: claim_service(&lookups, &evidence, policy),
            publications: Arc::new(publications),
            lectures: claim_service(&lookups, &evidence, policy),
            exams: claim_service(&lookups, &evidence, policy),
            supervision: claim_service(&lookups, &evidence, policy),
            cpas: claim_service(&lookups, &evidence, policy),
            grant_links: Arc::new(grant_links),
            publication_links: Arc::new(publication_links),
            accounts,
            lookups,
        }
    }

    /// Counts shown on the admin index, in menu order.
    pub(crate) fn summaries(&self) -> Vec<Arc<dyn ResourceSummary>> {
        vec![
            self.awards.clone(),
            self.promotions.clone(),
            self.editorial_boards.clone(),
            self.committee_work.clone(),
            self.grants.clone(),
            self.grant_links.clone(),
            self.grant_reviews.clone(),
            self.publications.clone(),
            self.publication_links.clone(),
            self.lectures.clone(),
            self.exams.clone(),
            self.supervision.clone(),
            self.cpas.clone(),
        ]
    }

    pub(crate) fn import_sinks(&self) -> Vec<Arc<dyn ImportSink>> {
        vec![
            Arc::new(AccountImporter::new(
                Arc::clone(&self.accounts),
                Arc::clone(&self.lookups),
            )),
            Arc::new(JournalImporter::new(Arc::clone(&self.lookups))),
            Arc::new(ClaimImporter::new(
                self.publications.clone(),
                Arc::clone(&self.accounts),
            )),
            Arc::new(ClaimImporter::new(self.grants.clone(), Arc::clone(&self.accounts))),
            Arc::new(ClaimImporter::new(self.lectures.clone(), Arc::clone(&self.accounts))),
            Arc::new(ClaimImporter::new(self.exams.clone(), Arc::clone(&self.accounts))),
            Arc::new(ClaimImporter::new(
                self.supervision.clone(),
                Arc::clone(&self.accounts),
            )),
        ]
    }
}

fn claim_service<K: ClaimKind>(
    lookups: &Arc<LookupRegistry>,
    evidence: &Arc<dyn EvidenceStore>,
    policy: EvidencePolicy,
) -> Service<K> {
    Arc::new(ClaimService::new(
        Arc::new(InMemoryClaimRepository::default()),
        Arc::clone(lookups),
        Arc::clone(evidence),
        policy,
    ))
}

/// Build the in-memory stores and services described by `config`.
pub(crate) fn bootstrap(config: &AppConfig) -> Result<Services, AppError> {
    let lookups = Arc::new(LookupRegistry::new());
    seed_lookups(&lookups)?;

    let directory = InMemoryAccountDirectory::default();
    if let Some(admin) = &config.bootstrap_admin {
        let account = ensure_admin(&directory, &admin.email, admin.id.map(UserId))?;
        info!(admin = %account.id, email = %account.email, "bootstrap admin ready");
    }

    let evidence = LocalEvidenceStore::new(config.uploads.media_root.clone());
    info!(media_root = %evidence.root().display(), "evidence stored on local disk");

    Ok(Services::in_memory(
        Arc::new(directory),
        lookups,
        Arc::new(evidence),
        EvidencePolicy::new(config.uploads.max_upload_bytes),
    ))
}

const WEIGHTED_SEED: &[(WeightedTable, &[(&str, f64)])] = &[
    (
        WeightedTable::AwardLevel,
        &[
            ("Local", 100.0),
            ("Provincial", 250.0),
            ("National", 500.0),
            ("International", 1000.0),
            ("Other", 50.0),
        ],
    ),
    (
        WeightedTable::GrantRole,
        &[
            ("Principal Investigator", 5.0),
            ("Co-Principal Investigator", 4.0),
            ("Co-Investigator", 3.0),
            ("Collaborator", 1.0),
        ],
    ),
    (
        WeightedTable::GrantReviewType,
        &[("Panel member", 200.0), ("External reviewer", 100.0), ("Other", 50.0)],
    ),
    (
        WeightedTable::PublicationType,
        &[
            ("Journal article", 40.0),
            ("Book", 100.0),
            ("Book chapter", 30.0),
            ("Conference abstract", 5.0),
            ("Other", 2.0),
        ],
    ),
    (
        WeightedTable::ArticleType,
        &[
            ("Original research", 1.0),
            ("Review", 0.7),
            ("Case report", 0.5),
            ("Letter", 0.2),
        ],
    ),
    (
        WeightedTable::PublicationRole,
        &[("First author", 3.0), ("Senior author", 2.5), ("Co-author", 1.0)],
    ),
    (
        WeightedTable::LectureType,
        &[
            ("Undergraduate lecture", 2.0),
            ("Postgraduate lecture", 3.0),
            ("Grand rounds", 4.0),
            ("Other", 1.0),
        ],
    ),
    (
        WeightedTable::ExamType,
        &[("OSCE", 2.0), ("Oral examination", 3.0), ("Thesis defence", 5.0), ("Other", 1.0)],
    ),
    (
        WeightedTable::SupervisionType,
        &[
            ("Resident", 100.0),
            ("Fellow", 150.0),
            ("Graduate student", 200.0),
            ("Medical student", 50.0),
        ],
    ),
    (
        WeightedTable::WorkFrequencyType,
        &[("Weekly", 4.0), ("Bi-weekly", 2.0), ("Monthly", 1.0)],
    ),
];

/// Load the reference tables every claim form resolves against.
pub(crate) fn seed_lookups(lookups: &LookupRegistry) -> Result<(), LookupError> {
    for (table, entries) in WEIGHTED_SEED {
        for (name, weight) in *entries {
            lookups.add_weighted(*table, name, *weight)?;
        }
    }

    let peer_reviewed = lookups.add_weighted(WeightedTable::GrantCategory, "Peer reviewed", 3.0)?;
    lookups.add_weighted(WeightedTable::GrantCategory, "Non-peer reviewed", 2.0)?;
    let industry = lookups.add_weighted(WeightedTable::GrantCategory, "Industry", 1.0)?;
    let federal = lookups.add_agency_type("Federal")?;
    let foundation = lookups.add_agency_type("Foundation")?;
    let commercial = lookups.add_agency_type("Industry")?;
    lookups.add_agency("CIHR", federal.id, peer_reviewed.id)?;
    lookups.add_agency("NIH", federal.id, peer_reviewed.id)?;
    lookups.add_agency("Brain Canada", foundation.id, peer_reviewed.id)?;
    lookups.add_agency("Other", commercial.id, industry.id)?;

    for (name, full_name) in [
        ("JAMA Psychiatry", "JAMA Psychiatry"),
        ("Am J Psychiatry", "American Journal of Psychiatry"),
        ("Can J Psychiatry", "Canadian Journal of Psychiatry"),
        ("Other", "Other"),
    ] {
        lookups.add_journal(name, full_name)?;
    }

    for rank in [
        "Lecturer",
        "Assistant Professor",
        "Associate Professor",
        "Professor",
    ] {
        lookups.add_rank(rank)?;
    }
    for division in [
        "Adult Psychiatry",
        "Child and Youth Psychiatry",
        "Forensic Psychiatry",
        "Geriatric Psychiatry",
        "Addictions",
    ] {
        lookups.add_division(division)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_tables_respect_their_bounds() {
        let lookups = LookupRegistry::new();
        seed_lookups(&lookups).expect("seed");

        for table in WeightedTable::ALL {
            let entries = lookups.weighted_entries(table);
            assert!(!entries.is_empty(), "{} has no entries", table.label());
            let (min, max) = table.bounds();
            assert!(entries
                .iter()
                .all(|entry| entry.weight >= min && entry.weight <= max));
            assert!(
                entries.iter().all(|entry| table.fits_precision(entry.weight)),
                "{} has a weight finer than {} decimal places",
                table.label(),
                table.decimal_places()
            );
        }
        assert!(lookups.agencies().iter().any(|agency| agency.name == "Other"));
        assert_eq!(lookups.journals().len(), 4);
    }
}
