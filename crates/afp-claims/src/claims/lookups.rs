//! Reference tables shared by the claim forms.
//!
//! Weighted tables carry a scoring coefficient that must stay within fixed
//! bounds per table. The remaining tables are plain reference data.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::validation::FieldErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupId(pub u32);

impl fmt::Display for LookupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for LookupId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Lookup tables whose entries carry a bounded weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightedTable {
    AwardLevel,
    GrantCategory,
    GrantRole,
    GrantReviewType,
    PublicationType,
    ArticleType,
    PublicationRole,
    LectureType,
    ExamType,
    SupervisionType,
    WorkFrequencyType,
}

impl WeightedTable {
    pub const ALL: [Self; 11] = [
        Self::AwardLevel,
        Self::GrantCategory,
        Self::GrantRole,
        Self::GrantReviewType,
        Self::PublicationType,
        Self::ArticleType,
        Self::PublicationRole,
        Self::LectureType,
        Self::ExamType,
        Self::SupervisionType,
        Self::WorkFrequencyType,
    ];

    /// Inclusive weight bounds.
    pub const fn bounds(self) -> (f64, f64) {
        match self {
            Self::AwardLevel => (0.0, 3000.0),
            Self::GrantCategory => (0.0, 3.0),
            Self::GrantRole => (0.0, 7.0),
            Self::GrantReviewType => (0.0, 2000.0),
            Self::PublicationType => (0.0, 800.0),
            Self::ArticleType => (0.0, 1.0),
            Self::PublicationRole => (0.0, 4.0),
            Self::LectureType => (0.0, 150.0),
            Self::ExamType => (0.0, 150.0),
            Self::SupervisionType => (0.0, 1000.0),
            Self::WorkFrequencyType => (0.0, 5.0),
        }
    }

    /// Fractional digits a weight may carry; zero means whole numbers only.
    pub const fn decimal_places(self) -> u32 {
        match self {
            Self::ArticleType | Self::WorkFrequencyType => 1,
            Self::PublicationType | Self::PublicationRole | Self::LectureType => 2,
            Self::AwardLevel
            | Self::GrantCategory
            | Self::GrantRole
            | Self::GrantReviewType
            | Self::ExamType
            | Self::SupervisionType => 0,
        }
    }

    /// Whether `weight` fits the table's precision.
    pub fn fits_precision(self, weight: f64) -> bool {
        let scaled = weight * 10f64.powi(self.decimal_places() as i32);
        (scaled - scaled.round()).abs() < 1e-6
    }

    /// Work frequencies are keyed by their days-equivalent, so weights must differ.
    pub const fn unique_weights(self) -> bool {
        matches!(self, Self::WorkFrequencyType)
    }

    pub const fn slug(self) -> &'static str {
        match self {
            Self::AwardLevel => "award-levels",
            Self::GrantCategory => "grant-categories",
            Self::GrantRole => "grant-roles",
            Self::GrantReviewType => "grant-review-types",
            Self::PublicationType => "publication-types",
            Self::ArticleType => "article-types",
            Self::PublicationRole => "publication-roles",
            Self::LectureType => "lecture-types",
            Self::ExamType => "exam-types",
            Self::SupervisionType => "supervision-types",
            Self::WorkFrequencyType => "work-frequencies",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.slug() == slug)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::AwardLevel => "Award level",
            Self::GrantCategory => "Grant category",
            Self::GrantRole => "Grant role",
            Self::GrantReviewType => "Grant review type",
            Self::PublicationType => "Publication type",
            Self::ArticleType => "Article type",
            Self::PublicationRole => "Publication role",
            Self::LectureType => "Lecture type",
            Self::ExamType => "Exam type",
            Self::SupervisionType => "Supervision type",
            Self::WorkFrequencyType => "Work frequency type",
        }
    }
}

impl fmt::Display for WeightedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn is_other_name(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case("other")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedEntry {
    pub id: LookupId,
    pub name: String,
    pub weight: f64,
}

impl WeightedEntry {
    pub fn is_other(&self) -> bool {
        is_other_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntry {
    pub id: LookupId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantAgency {
    pub id: LookupId,
    pub name: String,
    pub agency_type: LookupId,
    pub category: LookupId,
}

impl GrantAgency {
    pub fn is_other(&self) -> bool {
        is_other_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub id: LookupId,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub isi_listed: bool,
    #[serde(default)]
    pub issn: Option<String>,
    #[serde(default)]
    pub eissn: Option<String>,
    #[serde(default)]
    pub impact_factor: Option<f64>,
}

impl Journal {
    pub fn is_other(&self) -> bool {
        is_other_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("Ensure this value is between {min} and {max}.")]
    WeightOutOfRange {
        table: WeightedTable,
        weight: f64,
        min: f64,
        max: f64,
    },
    #[error("Enter a whole number.")]
    NotWhole { table: WeightedTable, weight: f64 },
    #[error("Ensure that there are no more than {places} decimal places.")]
    TooPrecise {
        table: WeightedTable,
        weight: f64,
        places: u32,
    },
    #[error("{table} with this name already exists.")]
    DuplicateName { table: &'static str, name: String },
    #[error("{table} with this weight already exists.")]
    DuplicateWeight { table: WeightedTable, weight: f64 },
    #[error("This field is required.")]
    EmptyName,
    #[error("{table} {id} does not exist.")]
    NotFound { table: &'static str, id: LookupId },
    #[error("Ensure this value is greater than or equal to 0.")]
    NegativeImpactFactor,
}

impl LookupError {
    /// Form field the error belongs to.
    pub fn field(&self) -> &'static str {
        match self {
            LookupError::WeightOutOfRange { .. }
            | LookupError::NotWhole { .. }
            | LookupError::TooPrecise { .. }
            | LookupError::DuplicateWeight { .. } => "weight",
            LookupError::DuplicateName { .. } | LookupError::EmptyName => "name",
            LookupError::NotFound { .. } => "id",
            LookupError::NegativeImpactFactor => "impact_factor",
        }
    }
}

impl From<LookupError> for FieldErrors {
    fn from(value: LookupError) -> Self {
        FieldErrors::single(value.field(), value.to_string())
    }
}

#[derive(Debug, Default)]
struct LookupTables {
    weighted: BTreeMap<WeightedTable, BTreeMap<LookupId, WeightedEntry>>,
    agency_types: BTreeMap<LookupId, NamedEntry>,
    agencies: BTreeMap<LookupId, GrantAgency>,
    journals: BTreeMap<LookupId, Journal>,
    ranks: BTreeMap<LookupId, NamedEntry>,
    divisions: BTreeMap<LookupId, NamedEntry>,
    last_id: u32,
}

impl LookupTables {
    fn allocate(&mut self) -> LookupId {
        self.last_id += 1;
        LookupId(self.last_id)
    }

    fn reserve(&mut self, id: LookupId) {
        self.last_id = self.last_id.max(id.0);
    }
}

fn clean_name(name: &str) -> Result<String, LookupError> {
    let name = name.trim();
    if name.is_empty() {
        Err(LookupError::EmptyName)
    } else {
        Ok(name.to_string())
    }
}

fn ensure_unique_name<'a>(
    table: &'static str,
    name: &str,
    mut existing: impl Iterator<Item = (&'a LookupId, &'a str)>,
    skip: Option<LookupId>,
) -> Result<(), LookupError> {
    let taken = existing.any(|(id, current)| {
        Some(*id) != skip && current.eq_ignore_ascii_case(name)
    });
    if taken {
        Err(LookupError::DuplicateName {
            table,
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

fn add_named(
    table: &'static str,
    entries: &mut BTreeMap<LookupId, NamedEntry>,
    id: LookupId,
    name: String,
) -> Result<NamedEntry, LookupError> {
    ensure_unique_name(
        table,
        &name,
        entries.iter().map(|(id, entry)| (id, entry.name.as_str())),
        None,
    )?;
    let entry = NamedEntry { id, name };
    entries.insert(id, entry.clone());
    Ok(entry)
}

/// Process-wide lookup store. Reads vastly outnumber writes.
#[derive(Debug, Default)]
pub struct LookupRegistry {
    tables: RwLock<LookupTables>,
}

impl LookupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LookupTables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LookupTables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_weight(
        tables: &LookupTables,
        table: WeightedTable,
        weight: f64,
        skip: Option<LookupId>,
    ) -> Result<(), LookupError> {
        let (min, max) = table.bounds();
        if !weight.is_finite() || weight < min || weight > max {
            return Err(LookupError::WeightOutOfRange {
                table,
                weight,
                min,
                max,
            });
        }
        if !table.fits_precision(weight) {
            return Err(match table.decimal_places() {
                0 => LookupError::NotWhole { table, weight },
                places => LookupError::TooPrecise {
                    table,
                    weight,
                    places,
                },
            });
        }

        if table.unique_weights() {
            let clash = tables
                .weighted
                .get(&table)
                .map_or(false, |entries| {
                    entries
                        .values()
                        .any(|entry| Some(entry.id) != skip && entry.weight == weight)
                });
            if clash {
                return Err(LookupError::DuplicateWeight { table, weight });
            }
        }

        Ok(())
    }

    pub fn add_weighted(
        &self,
        table: WeightedTable,
        name: &str,
        weight: f64,
    ) -> Result<WeightedEntry, LookupError> {
        let name = clean_name(name)?;
        let mut tables = self.write();
        Self::check_weight(&tables, table, weight, None)?;
        if let Some(entries) = tables.weighted.get(&table) {
            ensure_unique_name(
                table.label(),
                &name,
                entries.iter().map(|(id, entry)| (id, entry.name.as_str())),
                None,
            )?;
        }

        let id = tables.allocate();
        let entry = WeightedEntry { id, name, weight };
        tables
            .weighted
            .entry(table)
            .or_default()
            .insert(id, entry.clone());
        Ok(entry)
    }

    pub fn update_weighted(
        &self,
        table: WeightedTable,
        id: LookupId,
        name: &str,
        weight: f64,
    ) -> Result<WeightedEntry, LookupError> {
        let name = clean_name(name)?;
        let mut tables = self.write();
        let not_found = LookupError::NotFound {
            table: table.label(),
            id,
        };
        let exists = tables
            .weighted
            .get(&table)
            .map_or(false, |entries| entries.contains_key(&id));
        if !exists {
            return Err(not_found);
        }

        Self::check_weight(&tables, table, weight, Some(id))?;
        let entries = tables.weighted.entry(table).or_default();
        ensure_unique_name(
            table.label(),
            &name,
            entries.iter().map(|(id, entry)| (id, entry.name.as_str())),
            Some(id),
        )?;

        let entry = entries.get_mut(&id).ok_or(not_found)?;
        entry.name = name;
        entry.weight = weight;
        Ok(entry.clone())
    }

    pub fn weighted(&self, table: WeightedTable, id: LookupId) -> Option<WeightedEntry> {
        self.read()
            .weighted
            .get(&table)
            .and_then(|entries| entries.get(&id))
            .cloned()
    }

    pub fn weighted_entries(&self, table: WeightedTable) -> Vec<WeightedEntry> {
        self.read()
            .weighted
            .get(&table)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Case-insensitive lookup by name.
    pub fn find_weighted(&self, table: WeightedTable, name: &str) -> Option<WeightedEntry> {
        let name = name.trim();
        self.read().weighted.get(&table).and_then(|entries| {
            entries
                .values()
                .find(|entry| entry.name.eq_ignore_ascii_case(name))
                .cloned()
        })
    }

    pub fn add_agency_type(&self, name: &str) -> Result<NamedEntry, LookupError> {
        let name = clean_name(name)?;
        let mut tables = self.write();
        let id = tables.allocate();
        add_named("Grant agency type", &mut tables.agency_types, id, name)
    }

    pub fn agency_types(&self) -> Vec<NamedEntry> {
        self.read().agency_types.values().cloned().collect()
    }

    pub fn add_agency(
        &self,
        name: &str,
        agency_type: LookupId,
        category: LookupId,
    ) -> Result<GrantAgency, LookupError> {
        let name = clean_name(name)?;
        let mut tables = self.write();
        if !tables.agency_types.contains_key(&agency_type) {
            return Err(LookupError::NotFound {
                table: "Grant agency type",
                id: agency_type,
            });
        }
        let category_exists = tables
            .weighted
            .get(&WeightedTable::GrantCategory)
            .map_or(false, |entries| entries.contains_key(&category));
        if !category_exists {
            return Err(LookupError::NotFound {
                table: WeightedTable::GrantCategory.label(),
                id: category,
            });
        }
        ensure_unique_name(
            "Grant agency",
            &name,
            tables
                .agencies
                .iter()
                .map(|(id, agency)| (id, agency.name.as_str())),
            None,
        )?;

        let id = tables.allocate();
        let agency = GrantAgency {
            id,
            name,
            agency_type,
            category,
        };
        tables.agencies.insert(id, agency.clone());
        Ok(agency)
    }

    pub fn agency(&self, id: LookupId) -> Option<GrantAgency> {
        self.read().agencies.get(&id).cloned()
    }

    pub fn agencies(&self) -> Vec<GrantAgency> {
        self.read().agencies.values().cloned().collect()
    }

    pub fn add_journal(&self, name: &str, full_name: &str) -> Result<Journal, LookupError> {
        let id = self.write().allocate();
        let journal = Journal {
            id,
            name: name.to_string(),
            full_name: full_name.to_string(),
            isi_listed: false,
            issn: None,
            eissn: None,
            impact_factor: None,
        };
        self.upsert_journal(journal)?;
        self.journal(id).ok_or(LookupError::NotFound {
            table: "Journal",
            id,
        })
    }

    /// Insert or replace a journal by id. Returns `true` when it was created.
    pub fn upsert_journal(&self, mut journal: Journal) -> Result<bool, LookupError> {
        journal.name = clean_name(&journal.name)?;
        journal.full_name = journal.full_name.trim().to_string();
        if journal.impact_factor.map_or(false, |factor| factor < 0.0) {
            return Err(LookupError::NegativeImpactFactor);
        }

        let mut tables = self.write();
        tables.reserve(journal.id);
        let created = tables.journals.insert(journal.id, journal).is_none();
        Ok(created)
    }

    pub fn journal(&self, id: LookupId) -> Option<Journal> {
        self.read().journals.get(&id).cloned()
    }

    pub fn journals(&self) -> Vec<Journal> {
        self.read().journals.values().cloned().collect()
    }

    pub fn add_rank(&self, name: &str) -> Result<NamedEntry, LookupError> {
        let name = clean_name(name)?;
        let mut tables = self.write();
        let id = tables.allocate();
        add_named("Rank", &mut tables.ranks, id, name)
    }

    pub fn rank(&self, id: LookupId) -> Option<NamedEntry> {
        self.read().ranks.get(&id).cloned()
    }

    pub fn ranks(&self) -> Vec<NamedEntry> {
        self.read().ranks.values().cloned().collect()
    }

    pub fn add_division(&self, name: &str) -> Result<NamedEntry, LookupError> {
        let name = clean_name(name)?;
        let mut tables = self.write();
        let id = tables.allocate();
        add_named("Division", &mut tables.divisions, id, name)
    }

    pub fn division(&self, id: LookupId) -> Option<NamedEntry> {
        self.read().divisions.get(&id).cloned()
    }

    pub fn divisions(&self) -> Vec<NamedEntry> {
        self.read().divisions.values().cloned().collect()
    }
}
