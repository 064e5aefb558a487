//! The eleven claim types and the forms that produce them.
//!
//! Each type implements [`ClaimKind`]: it names its resource, declares the
//! evidence uploads it accepts, and converts its decoded form into details,
//! collecting every field error rather than stopping at the first.

mod cpa;
mod grants;
mod publication;
mod recognition;
mod teaching;

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::evidence::{EvidenceField, VERIFICATION_FILE};
use super::lookups::{
    GrantAgency, Journal, LookupId, LookupRegistry, NamedEntry, WeightedEntry, WeightedTable,
};
use super::validation::{FieldErrors, INVALID_CHOICE, REQUIRED, REQUIRED_FOR_OTHER};

pub use cpa::{Cpa, CpaForm};
pub use grants::{Grant, GrantForm, GrantReview, GrantReviewForm, Money};
pub use publication::{
    BookDetails, ConferenceDetails, JournalArticle, Publication, PublicationDetails,
    PublicationForm,
};
pub use recognition::{
    Award, AwardForm, CommitteeWork, CommitteeWorkForm, EditorialBoard, EditorialBoardForm,
    Promotion, PromotionForm,
};
pub use teaching::{
    Exam, ExamForm, Lecture, LectureForm, ResidentYear, Supervision, SupervisionForm,
};

/// Behaviour shared by every claim type.
pub trait ClaimKind:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Path segment of the claim's routes, e.g. `awards`.
    const RESOURCE: &'static str;
    /// Human name, also used as the evidence upload directory.
    const ENTITY_NAME: &'static str;
    /// Upload fields accepted by the form.
    const EVIDENCE: &'static [EvidenceField] = &[VERIFICATION_FILE];

    type Form: DeserializeOwned + Validate + Send;

    /// Validate a decoded form into claim details.
    fn from_form(form: Self::Form, lookups: &LookupRegistry) -> Result<Self, FieldErrors>;

    fn title(&self) -> String;
}

/// Snapshot of a lookup entry referenced by a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: LookupId,
    pub name: String,
}

impl Choice {
    pub fn is_other(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case("other")
    }
}

impl From<WeightedEntry> for Choice {
    fn from(entry: WeightedEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
        }
    }
}

impl From<NamedEntry> for Choice {
    fn from(entry: NamedEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
        }
    }
}

impl From<GrantAgency> for Choice {
    fn from(agency: GrantAgency) -> Self {
        Self {
            id: agency.id,
            name: agency.name,
        }
    }
}

impl From<Journal> for Choice {
    fn from(journal: Journal) -> Self {
        Self {
            id: journal.id,
            name: journal.name,
        }
    }
}

/// Run the derived validators, returning whatever they reported.
pub(crate) fn validated<F: Validate>(form: &F) -> FieldErrors {
    match form.validate() {
        Ok(()) => FieldErrors::new(),
        Err(report) => FieldErrors::from(report),
    }
}

/// Resolve a submitted lookup id through `resolve`.
pub(crate) fn choice<T>(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
    required: bool,
    resolve: impl FnOnce(LookupId) -> Option<T>,
) -> Option<Choice>
where
    T: Into<Choice>,
{
    let Some(raw) = raw else {
        if required {
            errors.add(field, REQUIRED);
        }
        return None;
    };

    match raw.parse::<LookupId>().ok().and_then(resolve) {
        Some(entry) => Some(entry.into()),
        None => {
            errors.add(field, INVALID_CHOICE);
            None
        }
    }
}

pub(crate) fn weighted_choice(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
    required: bool,
    lookups: &LookupRegistry,
    table: WeightedTable,
) -> Option<Choice> {
    choice(errors, field, raw, required, |id| lookups.weighted(table, id))
}

/// Record a length error when `value` exceeds `max` characters.
pub(crate) fn max_chars(errors: &mut FieldErrors, field: &str, value: Option<&String>, max: usize) {
    if value.map_or(false, |value| value.chars().count() > max) {
        errors.add(
            field,
            format!("Ensure this value has at most {max} characters."),
        );
    }
}

/// Keep the companion of an `Other` selection, requiring it when `Other` is chosen.
pub(crate) fn other_companion(
    errors: &mut FieldErrors,
    field: &str,
    selected: Option<&Choice>,
    value: Option<String>,
) -> Option<String> {
    match selected {
        Some(choice) if choice.is_other() => {
            if value.is_none() {
                errors.add(field, REQUIRED_FOR_OTHER);
            }
            value
        }
        _ => None,
    }
}
