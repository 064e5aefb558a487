//! Maintenance of the weighted lookup tables.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::flash::{redirect_with, Flash};
use crate::claims::extract::StaffUser;
use crate::claims::forms::{blank_as_none, FormSubmission, INVALID_NUMBER, INVALID_WHOLE_NUMBER};
use crate::claims::lookups::{LookupId, LookupRegistry, WeightedTable};
use crate::claims::service::ClaimServiceError;
use crate::claims::validation::{FieldErrors, REQUIRED};

#[derive(Debug, Default, Deserialize)]
struct WeightedEntryForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    weight: Option<String>,
}

impl WeightedEntryForm {
    fn clean(self, table: WeightedTable) -> Result<(String, f64), FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = errors.require("name", self.name);
        let weight = match self.weight.as_deref().map(str::trim) {
            None => {
                errors.add("weight", REQUIRED);
                None
            }
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if !value.is_finite() => {
                    errors.add("weight", INVALID_NUMBER);
                    None
                }
                Ok(value) if !table.fits_precision(value) => {
                    errors.add("weight", precision_message(table));
                    None
                }
                Ok(value) => Some(value),
                Err(_) if table.decimal_places() == 0 => {
                    errors.add("weight", INVALID_WHOLE_NUMBER);
                    None
                }
                Err(_) => {
                    errors.add("weight", INVALID_NUMBER);
                    None
                }
            },
        };
        match (name, weight) {
            (Some(name), Some(weight)) if errors.is_empty() => Ok((name, weight)),
            _ => Err(errors),
        }
    }
}

fn precision_message(table: WeightedTable) -> String {
    match table.decimal_places() {
        0 => INVALID_WHOLE_NUMBER.to_string(),
        places => format!("Ensure that there are no more than {places} decimal places."),
    }
}

pub fn lookup_admin_router(lookups: Arc<LookupRegistry>) -> Router {
    Router::new()
        .route("/admin/lookups", get(list_tables))
        .route("/admin/lookups/:table", get(list_entries))
        .route("/admin/lookups/:table/add", post(add_entry))
        .route("/admin/lookups/:table/:entry_id/edit", post(edit_entry))
        .with_state(lookups)
}

fn unknown_table(slug: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("unknown lookup table '{slug}'") })),
    )
        .into_response()
}

fn table_location(table: WeightedTable) -> String {
    format!("/admin/lookups/{}", table.slug())
}

async fn list_tables(State(lookups): State<Arc<LookupRegistry>>, _staff: StaffUser) -> Response {
    let tables: Vec<_> = WeightedTable::ALL
        .into_iter()
        .map(|table| {
            let (min, max) = table.bounds();
            json!({
                "slug": table.slug(),
                "label": table.label(),
                "min_weight": min,
                "max_weight": max,
                "decimal_places": table.decimal_places(),
                "entries": lookups.weighted_entries(table).len(),
            })
        })
        .collect();
    Json(json!({ "tables": tables })).into_response()
}

async fn list_entries(
    State(lookups): State<Arc<LookupRegistry>>,
    _staff: StaffUser,
    Path(slug): Path<String>,
) -> Response {
    let Some(table) = WeightedTable::from_slug(&slug) else {
        return unknown_table(&slug);
    };
    Json(json!({
        "table": table.slug(),
        "label": table.label(),
        "entries": lookups.weighted_entries(table),
    }))
    .into_response()
}

async fn add_entry(
    State(lookups): State<Arc<LookupRegistry>>,
    _staff: StaffUser,
    Path(slug): Path<String>,
    submission: FormSubmission,
) -> Response {
    let Some(table) = WeightedTable::from_slug(&slug) else {
        return unknown_table(&slug);
    };
    let result = submission
        .decode::<WeightedEntryForm>()
        .and_then(|form| form.clean(table))
        .and_then(|(name, weight)| {
            lookups
                .add_weighted(table, &name, weight)
                .map_err(FieldErrors::from)
        });
    match result {
        Ok(entry) => {
            info!(table = table.slug(), entry = %entry.id, weight = entry.weight, "lookup added");
            redirect_with(
                &table_location(table),
                &Flash::success(format!("{} \"{}\" added.", table.label(), entry.name)),
            )
        }
        Err(errors) => ClaimServiceError::Validation(errors).into_response(),
    }
}

async fn edit_entry(
    State(lookups): State<Arc<LookupRegistry>>,
    _staff: StaffUser,
    Path((slug, entry_id)): Path<(String, String)>,
    submission: FormSubmission,
) -> Response {
    let Some(table) = WeightedTable::from_slug(&slug) else {
        return unknown_table(&slug);
    };
    let Some(id) = entry_id
        .parse::<LookupId>()
        .ok()
        .filter(|id| lookups.weighted(table, *id).is_some())
    else {
        return ClaimServiceError::NotFound.into_response();
    };

    let result = submission
        .decode::<WeightedEntryForm>()
        .and_then(|form| form.clean(table))
        .and_then(|(name, weight)| {
            lookups
                .update_weighted(table, id, &name, weight)
                .map_err(FieldErrors::from)
        });
    match result {
        Ok(entry) => {
            info!(table = table.slug(), entry = %entry.id, weight = entry.weight, "lookup updated");
            redirect_with(
                &table_location(table),
                &Flash::success(format!("{} \"{}\" updated.", table.label(), entry.name)),
            )
        }
        Err(errors) => ClaimServiceError::Validation(errors).into_response(),
    }
}
