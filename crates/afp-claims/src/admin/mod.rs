//! Staff-only surface: eligibility review, lookup maintenance and bulk import.

pub mod flash;
pub mod lookups;
pub mod router;
pub mod upload;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::claims::domain::{EligibilityStatus, ReviewDecision, ReviewFilter};
use crate::claims::extract::StaffUser;
use crate::claims::forms::blank_as_none;
use crate::claims::kinds::ClaimKind;
use crate::claims::links::{LinkFilter, LinkKind, LinkService};
use crate::claims::repository::{ClaimRepository, LinkRepository};
use crate::claims::service::{ClaimService, ClaimServiceError};
use crate::claims::validation::{FieldErrors, INVALID_CHOICE, REQUIRED};

pub use flash::{Flash, FlashLevel};
pub use lookups::lookup_admin_router;
pub use router::{admin_claim_router, admin_link_router};
pub use upload::upload_router;

pub const ADMIN_INDEX: &str = "/admin/";

/// Counts shown for one resource on the admin index.
pub trait ResourceSummary: Send + Sync {
    fn resource(&self) -> &'static str;
    fn total(&self) -> Result<usize, ClaimServiceError>;
    fn awaiting_review(&self) -> Result<usize, ClaimServiceError>;
}

impl<K, R> ResourceSummary for ClaimService<K, R>
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    fn resource(&self) -> &'static str {
        K::RESOURCE
    }

    fn total(&self) -> Result<usize, ClaimServiceError> {
        self.count()
    }

    fn awaiting_review(&self) -> Result<usize, ClaimServiceError> {
        let filter = ReviewFilter {
            eligibility: Some(EligibilityStatus::NotReviewed),
            owner: None,
        };
        Ok(self.list_all(&filter)?.len())
    }
}

impl<L, R> ResourceSummary for LinkService<L, R>
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    fn resource(&self) -> &'static str {
        L::ADMIN_RESOURCE
    }

    fn total(&self) -> Result<usize, ClaimServiceError> {
        self.count()
    }

    fn awaiting_review(&self) -> Result<usize, ClaimServiceError> {
        let filter = LinkFilter {
            parent: None,
            eligibility: Some(EligibilityStatus::NotReviewed),
        };
        Ok(self.list_all(&filter)?.len())
    }
}

/// Submitted by the review form on a claim or link.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewForm {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub eligible: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub decision_comments: Option<String>,
}

impl ReviewForm {
    pub fn into_decision(self) -> Result<ReviewDecision, FieldErrors> {
        let Some(raw) = self.eligible else {
            return Err(FieldErrors::single("eligible", REQUIRED));
        };
        let eligibility = raw
            .parse::<EligibilityStatus>()
            .map_err(|_| FieldErrors::single("eligible", INVALID_CHOICE))?;
        Ok(ReviewDecision {
            eligibility,
            decision_comments: self.decision_comments,
        })
    }
}

#[derive(Clone)]
struct IndexState {
    summaries: Arc<Vec<Arc<dyn ResourceSummary>>>,
}

/// `GET /admin/`: per-resource counts plus any pending flash message.
pub fn admin_index_router(summaries: Vec<Arc<dyn ResourceSummary>>) -> Router {
    Router::new()
        .route(ADMIN_INDEX, get(index_handler))
        .with_state(IndexState {
            summaries: Arc::new(summaries),
        })
}

async fn index_handler(
    State(state): State<IndexState>,
    StaffUser(staff): StaffUser,
    headers: HeaderMap,
) -> Response {
    let mut resources = Vec::with_capacity(state.summaries.len());
    for summary in state.summaries.iter() {
        let (total, awaiting_review) = match (summary.total(), summary.awaiting_review()) {
            (Ok(total), Ok(awaiting)) => (total, awaiting),
            (Err(err), _) | (_, Err(err)) => return err.into_response(),
        };
        resources.push(json!({
            "resource": summary.resource(),
            "total": total,
            "not_reviewed": awaiting_review,
        }));
    }

    let flash = Flash::from_headers(&headers);
    let mut response = Json(json!({
        "user": staff.email,
        "resources": resources,
        "flash": flash,
    }))
    .into_response();
    if flash.is_some() {
        response
            .headers_mut()
            .insert(SET_COOKIE, flash::clear_cookie());
    }
    response
}
