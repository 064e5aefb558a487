use std::sync::Arc;

use tracing::info;

use super::{CsvTable, ImportError, ImportSink, ImportSummary, ImportTarget, RowError};
use crate::accounts::{AccountDirectory, UserId};
use crate::claims::domain::{ClaimRecord, EligibilityStatus, EntryType};
use crate::claims::forms::FormSubmission;
use crate::claims::kinds::{ClaimKind, Exam, Grant, Lecture, Publication, Supervision};
use crate::claims::repository::ClaimRepository;
use crate::claims::service::{ClaimService, ImportedClaim, UpsertOutcome};
use crate::claims::validation::{FieldErrors, INVALID_CHOICE, REQUIRED};

const USER_ID: &str = "user_id";
const ENTRY_TYPE: &str = "entry_type";
const ELIGIBLE: &str = "eligible";

/// Columns every claim file may carry besides the type's own.
const META_COLUMNS: &[&str] = &[USER_ID, ENTRY_TYPE, ELIGIBLE, "comments", "ver_url"];

/// A claim type that can be loaded from a CSV file.
pub trait CsvImportable: ClaimKind {
    const TARGET: ImportTarget;
    /// Form fields accepted as columns.
    const COLUMNS: &'static [&'static str];
    const REQUIRED_COLUMNS: &'static [&'static str];

    /// Whether `existing` is the record an incoming row for `owner` replaces.
    fn same_claim(existing: &ClaimRecord<Self>, owner: &UserId, incoming: &Self) -> bool;
}

impl CsvImportable for Publication {
    const TARGET: ImportTarget = ImportTarget::Publications;
    const COLUMNS: &'static [&'static str] = &[
        "kind",
        "pub_type",
        "title",
        "authors",
        "chapter_title",
        "chapter_authors",
        "publisher",
        "city",
        "isbn",
        "conf_name",
        "conf_date",
        "article_type",
        "journal",
        "other_journal_name",
        "volume",
        "issue",
        "start_page",
        "end_page",
        "pub_month",
        "pub_year",
        "pmid",
        "is_epub",
    ];
    const REQUIRED_COLUMNS: &'static [&'static str] = &["kind", "pub_type", "title", "authors"];

    // Rows without a PMID always create a new record.
    fn same_claim(existing: &ClaimRecord<Self>, _owner: &UserId, incoming: &Self) -> bool {
        match (existing.details.pmid(), incoming.pmid()) {
            (Some(current), Some(pmid)) => current == pmid,
            _ => false,
        }
    }
}

impl CsvImportable for Grant {
    const TARGET: ImportTarget = ImportTarget::Grants;
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "amount",
        "amount_currency",
        "agency",
        "other_grant_agency",
        "pi_list",
        "coi_list",
        "start_date",
        "end_date",
        "at_camh",
    ];
    const REQUIRED_COLUMNS: &'static [&'static str] = &[
        "name",
        "amount",
        "agency",
        "pi_list",
        "coi_list",
        "start_date",
        "end_date",
    ];

    fn same_claim(existing: &ClaimRecord<Self>, owner: &UserId, incoming: &Self) -> bool {
        existing.is_owned_by(owner)
            && existing.details.name == incoming.name
            && existing.details.start_date == incoming.start_date
    }
}

impl CsvImportable for Lecture {
    const TARGET: ImportTarget = ImportTarget::Lectures;
    const COLUMNS: &'static [&'static str] = &[
        "lecture_type",
        "other_lecture_type",
        "name",
        "course_code",
        "start_date",
        "hours",
        "is_cash",
        "is_series",
        "end_date",
        "num_sessions",
    ];
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["lecture_type", "name", "start_date", "hours"];

    fn same_claim(existing: &ClaimRecord<Self>, owner: &UserId, incoming: &Self) -> bool {
        existing.is_owned_by(owner)
            && existing.details.name == incoming.name
            && existing.details.start_date == incoming.start_date
    }
}

impl CsvImportable for Exam {
    const TARGET: ImportTarget = ImportTarget::Exams;
    const COLUMNS: &'static [&'static str] =
        &["exam_type", "other_exam_name", "student_name", "hours", "date"];
    const REQUIRED_COLUMNS: &'static [&'static str] = &["exam_type", "student_name", "date"];

    fn same_claim(existing: &ClaimRecord<Self>, owner: &UserId, incoming: &Self) -> bool {
        existing.is_owned_by(owner)
            && existing.details.exam_type.id == incoming.exam_type.id
            && existing.details.student_name == incoming.student_name
            && existing.details.date == incoming.date
    }
}

impl CsvImportable for Supervision {
    const TARGET: ImportTarget = ImportTarget::Supervision;
    const COLUMNS: &'static [&'static str] = &[
        "supervision_type",
        "student_name",
        "resident_year",
        "duration",
        "frequency",
        "hours",
    ];
    const REQUIRED_COLUMNS: &'static [&'static str] = &["supervision_type", "student_name"];

    fn same_claim(existing: &ClaimRecord<Self>, owner: &UserId, incoming: &Self) -> bool {
        existing.is_owned_by(owner)
            && existing.details.supervision_type.id == incoming.supervision_type.id
            && existing.details.student_name == incoming.student_name
    }
}

/// Loads one claim type from CSV through its [`ClaimService`].
pub struct ClaimImporter<K, R> {
    service: Arc<ClaimService<K, R>>,
    accounts: Arc<dyn AccountDirectory>,
}

impl<K, R> ClaimImporter<K, R>
where
    K: CsvImportable,
    R: ClaimRepository<K> + 'static,
{
    pub fn new(service: Arc<ClaimService<K, R>>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { service, accounts }
    }

    fn allowed_columns() -> Vec<&'static str> {
        META_COLUMNS.iter().chain(K::COLUMNS).copied().collect()
    }

    fn required_columns() -> Vec<&'static str> {
        std::iter::once(USER_ID)
            .chain(K::REQUIRED_COLUMNS.iter().copied())
            .collect()
    }

    /// Validate one row exactly as the claim form would.
    fn parse_row<'a>(
        &self,
        cells: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> Result<ImportedClaim<K>, ImportError> {
        let mut errors = FieldErrors::new();
        let mut submission = FormSubmission::new();
        let mut owner_raw = None;
        let mut entry_raw = None;
        let mut eligible_raw = None;

        for (column, value) in cells {
            match column {
                USER_ID => owner_raw = Some(value),
                ENTRY_TYPE => entry_raw = Some(value).filter(|raw| !raw.is_empty()),
                ELIGIBLE => eligible_raw = Some(value).filter(|raw| !raw.is_empty()),
                _ => submission.push_field(column, value),
            }
        }

        let owner = match owner_raw.filter(|raw| !raw.is_empty()) {
            None => {
                errors.add(USER_ID, REQUIRED);
                None
            }
            Some(raw) => match raw.parse::<UserId>() {
                Ok(id) if self.accounts.fetch(&id)?.is_some() => Some(id),
                _ => {
                    errors.add(USER_ID, INVALID_CHOICE);
                    None
                }
            },
        };
        let entry_type = entry_raw.and_then(|raw| {
            raw.parse::<EntryType>()
                .map_err(|_| errors.add(ENTRY_TYPE, INVALID_CHOICE))
                .ok()
        });
        let eligibility = eligible_raw.and_then(|raw| {
            raw.parse::<EligibilityStatus>()
                .map_err(|_| errors.add(ELIGIBLE, INVALID_CHOICE))
                .ok()
        });

        let cleaned = match self.service.clean(&submission) {
            Ok(cleaned) => Some(cleaned),
            Err(report) => {
                errors.merge(report);
                None
            }
        };

        match (owner, cleaned) {
            (Some(owner), Some(cleaned)) if errors.is_empty() => Ok(ImportedClaim {
                owner,
                ver_url: cleaned.common.verification_url(),
                comments: cleaned.common.comments,
                details: cleaned.details,
                entry_type,
                eligibility,
            }),
            _ => Err(ImportError::Rows(vec![RowError { line: 0, errors }])),
        }
    }
}

impl<K, R> ImportSink for ClaimImporter<K, R>
where
    K: CsvImportable,
    R: ClaimRepository<K> + 'static,
{
    fn target(&self) -> ImportTarget {
        K::TARGET
    }

    fn import(&self, data: &[u8]) -> Result<ImportSummary, ImportError> {
        let table = CsvTable::read(data, &Self::allowed_columns(), &Self::required_columns())?;

        let mut parsed = Vec::with_capacity(table.rows.len());
        let mut failures = Vec::new();
        for (line, row) in &table.rows {
            match self.parse_row(table.cells(row)) {
                Ok(imported) => parsed.push(imported),
                Err(ImportError::Rows(rows)) => failures.extend(
                    rows.into_iter()
                        .map(|failure| RowError { line: *line, ..failure }),
                ),
                Err(other) => return Err(other),
            }
        }
        if !failures.is_empty() {
            return Err(ImportError::Rows(failures));
        }

        let mut summary = ImportSummary::default();
        for imported in parsed {
            let owner = imported.owner;
            let incoming = imported.details.clone();
            let outcome = self
                .service
                .upsert_imported(imported, |existing| K::same_claim(existing, &owner, &incoming))?;
            match outcome {
                UpsertOutcome::Created(_) => summary.created += 1,
                UpsertOutcome::Updated(_) => summary.updated += 1,
            }
        }

        info!(
            target_resource = K::RESOURCE,
            created = summary.created,
            updated = summary.updated,
            "import applied"
        );
        Ok(summary)
    }
}
