//! All-or-nothing CSV imports of registry data.
//!
//! Every file is read with named header columns and each row is validated
//! with the same rules as the matching user-facing form. Nothing is written
//! unless every row is valid; valid files are then upserted row by row.

mod claims;
mod journals;
mod users;

use std::collections::BTreeSet;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::accounts::AccountError;
use crate::claims::lookups::LookupError;
use crate::claims::service::ClaimServiceError;
use crate::claims::validation::FieldErrors;

pub use claims::{ClaimImporter, CsvImportable};
pub use journals::JournalImporter;
pub use users::{AccountImporter, EMAIL_TAKEN, REPEATED_IN_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImportTarget {
    Journals,
    Publications,
    Grants,
    Lectures,
    Exams,
    Supervision,
    Users,
}

impl ImportTarget {
    pub const ALL: [Self; 7] = [
        Self::Journals,
        Self::Publications,
        Self::Grants,
        Self::Lectures,
        Self::Exams,
        Self::Supervision,
        Self::Users,
    ];

    pub const fn slug(self) -> &'static str {
        match self {
            Self::Journals => "journals",
            Self::Publications => "publications",
            Self::Grants => "grants",
            Self::Lectures => "lectures",
            Self::Exams => "exams",
            Self::Supervision => "supervision",
            Self::Users => "users",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|target| target.slug() == slug)
    }
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} created, {} updated", self.created, self.updated)
    }
}

/// Validation failures of one data row. `line` is the 1-based file line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line: u64,
    pub errors: FieldErrors,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("could not read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("unknown columns: {}", .0.join(", "))]
    UnknownColumns(Vec<String>),
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("{} rows failed validation", .0.len())]
    Rows(Vec<RowError>),
    #[error(transparent)]
    Service(#[from] ClaimServiceError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Accounts(#[from] AccountError),
}

impl IntoResponse for ImportError {
    fn into_response(self) -> Response {
        match self {
            ImportError::Rows(rows) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "import rejected", "rows": rows })),
            )
                .into_response(),
            err @ (ImportError::Csv(_)
            | ImportError::UnknownColumns(_)
            | ImportError::MissingColumns(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            ImportError::Service(err) => err.into_response(),
            other => {
                error!(error = %other, "import failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// Something a CSV upload can be applied to.
pub trait ImportSink: Send + Sync {
    fn target(&self) -> ImportTarget;
    fn import(&self, data: &[u8]) -> Result<ImportSummary, ImportError>;
}

/// A parsed file: header names and, per row, its line and cell values.
struct CsvTable {
    headers: Vec<String>,
    rows: Vec<(u64, Vec<String>)>,
}

impl CsvTable {
    fn read(data: &[u8], allowed: &[&str], required: &[&str]) -> Result<Self, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data);
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|header| header.trim_start_matches('\u{feff}').to_ascii_lowercase())
            .collect();

        let unknown: Vec<String> = headers
            .iter()
            .filter(|header| !allowed.contains(&header.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ImportError::UnknownColumns(unknown));
        }

        let present: BTreeSet<&str> = headers.iter().map(String::as_str).collect();
        let missing: Vec<String> = required
            .iter()
            .filter(|column| !present.contains(**column))
            .map(|column| column.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::MissingColumns(missing));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |position| position.line());
            rows.push((line, record.iter().map(str::to_string).collect()));
        }
        Ok(Self { headers, rows })
    }

    fn cells<'a>(&'a self, row: &'a [String]) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(row.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_commas_stay_in_one_cell() {
        let data = b"name,full_name\nBMJ,\"British Medical Journal, The\"\n";
        let table = CsvTable::read(data, &["name", "full_name"], &["name"]).expect("table");
        let (line, row) = &table.rows[0];
        assert_eq!(*line, 2);
        let cells: Vec<_> = table.cells(row).collect();
        assert_eq!(
            cells,
            vec![("name", "BMJ"), ("full_name", "British Medical Journal, The")]
        );
    }

    #[test]
    fn unknown_and_missing_columns_are_rejected() {
        match CsvTable::read(b"name,colour\nx,y\n", &["name", "id"], &["name"]) {
            Err(ImportError::UnknownColumns(columns)) => assert_eq!(columns, vec!["colour"]),
            other => panic!("expected unknown columns, got {:?}", other.err()),
        }
        match CsvTable::read(b"name\nx\n", &["name", "id"], &["id"]) {
            Err(ImportError::MissingColumns(columns)) => assert_eq!(columns, vec!["id"]),
            other => panic!("expected missing columns, got {:?}", other.err()),
        }
    }

    #[test]
    fn targets_round_trip_through_slugs() {
        for target in ImportTarget::ALL {
            assert_eq!(ImportTarget::from_slug(target.slug()), Some(target));
        }
        assert_eq!(ImportTarget::from_slug("awards"), None);
    }
}
