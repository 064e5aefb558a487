use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::{CsvTable, ImportError, ImportSink, ImportSummary, ImportTarget, RowError};
use crate::claims::forms::{
    blank_as_none, checkbox, integer_field, FormSubmission, INVALID_NUMBER,
};
use crate::claims::lookups::{Journal, LookupId, LookupRegistry};
use crate::claims::validation::FieldErrors;

const COLUMNS: &[&str] = &[
    "id",
    "name",
    "full_name",
    "isi_listed",
    "issn",
    "eissn",
    "impact_factor",
];
const REQUIRED_COLUMNS: &[&str] = &["id", "name"];

#[derive(Debug, Default, Deserialize)]
struct JournalRow {
    #[serde(default, deserialize_with = "blank_as_none")]
    id: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    full_name: Option<String>,
    #[serde(default, deserialize_with = "checkbox")]
    isi_listed: bool,
    #[serde(default, deserialize_with = "blank_as_none")]
    issn: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    eissn: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    impact_factor: Option<String>,
}

impl JournalRow {
    fn into_journal(self) -> Result<Journal, FieldErrors> {
        let mut errors = FieldErrors::new();
        let id = integer_field(&mut errors, "id", self.id.as_deref(), true, 1u32, u32::MAX);
        let name = errors.require("name", self.name);
        let impact_factor = match self.impact_factor.as_deref() {
            None => None,
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => Some(value),
                _ => {
                    errors.add("impact_factor", INVALID_NUMBER);
                    None
                }
            },
        };

        match (id, name) {
            (Some(id), Some(name)) if errors.is_empty() => Ok(Journal {
                id: LookupId(id),
                full_name: self.full_name.unwrap_or_else(|| name.clone()),
                name,
                isi_listed: self.isi_listed,
                issn: self.issn,
                eissn: self.eissn,
                impact_factor,
            }),
            _ => Err(errors),
        }
    }
}

/// Creates or replaces journals keyed by their `id` column.
pub struct JournalImporter {
    lookups: Arc<LookupRegistry>,
}

impl JournalImporter {
    pub fn new(lookups: Arc<LookupRegistry>) -> Self {
        Self { lookups }
    }
}

impl ImportSink for JournalImporter {
    fn target(&self) -> ImportTarget {
        ImportTarget::Journals
    }

    fn import(&self, data: &[u8]) -> Result<ImportSummary, ImportError> {
        let table = CsvTable::read(data, COLUMNS, REQUIRED_COLUMNS)?;

        let mut journals = Vec::with_capacity(table.rows.len());
        let mut failures = Vec::new();
        for (line, row) in &table.rows {
            let submission = FormSubmission::from_pairs(table.cells(row));
            match submission.decode::<JournalRow>().and_then(JournalRow::into_journal) {
                Ok(journal) => journals.push(journal),
                Err(errors) => failures.push(RowError {
                    line: *line,
                    errors,
                }),
            }
        }
        if !failures.is_empty() {
            return Err(ImportError::Rows(failures));
        }

        let mut summary = ImportSummary::default();
        for journal in journals {
            if self.lookups.upsert_journal(journal)? {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            "journals imported"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::forms::INVALID_WHOLE_NUMBER;
    use crate::claims::validation::REQUIRED;

    #[test]
    fn journals_are_created_then_replaced_by_id() {
        let lookups = Arc::new(LookupRegistry::new());
        let importer = JournalImporter::new(Arc::clone(&lookups));

        let csv = "id,name,full_name,isi_listed,issn,impact_factor\n\
                   12,Lancet,The Lancet,1,0140-6736,59.1\n\
                   40,CMAJ,,no,,\n";
        let summary = importer.import(csv.as_bytes()).expect("import");
        assert_eq!(summary, ImportSummary { created: 2, updated: 0 });

        let lancet = lookups.journal(LookupId(12)).expect("lancet");
        assert!(lancet.isi_listed);
        assert_eq!(lancet.issn.as_deref(), Some("0140-6736"));
        assert_eq!(lancet.impact_factor, Some(59.1));
        let cmaj = lookups.journal(LookupId(40)).expect("cmaj");
        assert_eq!(cmaj.full_name, "CMAJ");
        assert!(!cmaj.isi_listed);

        let update = "id,name,impact_factor\n12,Lancet,88.5\n";
        let summary = importer.import(update.as_bytes()).expect("import");
        assert_eq!(summary, ImportSummary { created: 0, updated: 1 });
        assert_eq!(
            lookups.journal(LookupId(12)).and_then(|j| j.impact_factor),
            Some(88.5)
        );
    }

    #[test]
    fn invalid_rows_leave_the_registry_untouched() {
        let lookups = Arc::new(LookupRegistry::new());
        let importer = JournalImporter::new(Arc::clone(&lookups));

        let csv = "id,name,impact_factor\n7,BMJ,2.5\nabc,,-1\n";
        let Err(ImportError::Rows(rows)) = importer.import(csv.as_bytes()) else {
            panic!("expected row errors");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 3);
        assert_eq!(
            rows[0].errors.get("id"),
            Some(&[INVALID_WHOLE_NUMBER.to_string()][..])
        );
        assert_eq!(rows[0].errors.get("name"), Some(&[REQUIRED.to_string()][..]));
        assert!(rows[0].errors.contains("impact_factor"));
        assert!(lookups.journals().is_empty());
    }
}
