use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::flash::{redirect_with, Flash};
use super::ReviewForm;
use crate::accounts::UserId;
use crate::claims::domain::{ClaimId, EligibilityStatus, ReviewFilter};
use crate::claims::extract::StaffUser;
use crate::claims::forms::{blank_as_none, FormSubmission};
use crate::claims::kinds::ClaimKind;
use crate::claims::links::{LinkFilter, LinkId, LinkKind, LinkService};
use crate::claims::repository::{ClaimRepository, LinkRepository};
use crate::claims::service::{ClaimService, ClaimServiceError};
use crate::claims::validation::{FieldErrors, INVALID_CHOICE};

/// Query string accepted by the admin listings.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub eligible: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub parent: Option<String>,
}

impl ListQuery {
    fn eligibility(&self, errors: &mut FieldErrors) -> Option<EligibilityStatus> {
        let raw = self.eligible.as_deref()?;
        raw.parse()
            .map_err(|_| errors.add("eligible", INVALID_CHOICE))
            .ok()
    }

    pub fn review_filter(&self) -> Result<ReviewFilter, FieldErrors> {
        let mut errors = FieldErrors::new();
        let eligibility = self.eligibility(&mut errors);
        let owner = match self.owner.as_deref() {
            Some(raw) => raw
                .parse::<UserId>()
                .map_err(|_| errors.add("owner", INVALID_CHOICE))
                .ok(),
            None => None,
        };
        errors.into_result()?;
        Ok(ReviewFilter { eligibility, owner })
    }

    pub fn link_filter(&self) -> Result<LinkFilter, FieldErrors> {
        let mut errors = FieldErrors::new();
        let eligibility = self.eligibility(&mut errors);
        let parent = match self.parent.as_deref() {
            Some(raw) => raw
                .parse::<ClaimId>()
                .map_err(|_| errors.add("parent", INVALID_CHOICE))
                .ok(),
            None => None,
        };
        errors.into_result()?;
        Ok(LinkFilter {
            parent,
            eligibility,
        })
    }
}

/// Review routes for one claim type under `/admin/{resource}`.
pub fn admin_claim_router<K, R>(service: Arc<ClaimService<K, R>>) -> Router
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    let base = format!("/admin/{}", K::RESOURCE);
    Router::new()
        .route(&base, get(list_claims::<K, R>))
        .route(&format!("{base}/:claim_id"), get(show_claim::<K, R>))
        .route(
            &format!("{base}/:claim_id/review"),
            post(review_claim::<K, R>),
        )
        .route(
            &format!("{base}/:claim_id/delete"),
            post(delete_claim::<K, R>),
        )
        .with_state(service)
}

fn parse_claim_id(raw: &str) -> Result<ClaimId, ClaimServiceError> {
    raw.parse().map_err(|_| ClaimServiceError::NotFound)
}

pub(crate) async fn list_claims<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    _staff: StaffUser,
    Query(query): Query<ListQuery>,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    let result = query
        .review_filter()
        .map_err(ClaimServiceError::from)
        .and_then(|filter| service.list_all(&filter));
    match result {
        Ok(claims) => {
            let entries: Vec<_> = claims
                .into_iter()
                .map(|record| json!({ "title": record.details.title(), "claim": record }))
                .collect();
            Json(json!({ "resource": K::RESOURCE, "claims": entries })).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn show_claim<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    _staff: StaffUser,
    Path(claim_id): Path<String>,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    match parse_claim_id(&claim_id).and_then(|id| service.fetch_any(&id)) {
        Ok(record) => Json(record).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn review_claim<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    StaffUser(staff): StaffUser,
    Path(claim_id): Path<String>,
    submission: FormSubmission,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    let result = parse_claim_id(&claim_id).and_then(|id| -> Result<_, ClaimServiceError> {
        let decision = submission.decode::<ReviewForm>()?.into_decision()?;
        service.review(&id, decision)
    });
    match result {
        Ok(record) => {
            debug!(reviewer = %staff.id, claim = %record.id, "review recorded");
            redirect_with(
                &format!("/admin/{}", K::RESOURCE),
                &Flash::success(format!(
                    "{} \"{}\" marked {}.",
                    K::ENTITY_NAME,
                    record.details.title(),
                    record.eligibility.label()
                )),
            )
        }
        Err(err) => err.into_response(),
    }
}

async fn delete_claim<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    _staff: StaffUser,
    Path(claim_id): Path<String>,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    match parse_claim_id(&claim_id).and_then(|id| service.delete_any(&id)) {
        Ok(()) => redirect_with(
            &format!("/admin/{}", K::RESOURCE),
            &Flash::success(format!("{} deleted.", K::ENTITY_NAME)),
        ),
        Err(err) => err.into_response(),
    }
}

/// Review routes for links under `/admin/{grant-links|publication-links}`.
pub fn admin_link_router<L, R>(service: Arc<LinkService<L, R>>) -> Router
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    let base = format!("/admin/{}", L::ADMIN_RESOURCE);
    Router::new()
        .route(&base, get(list_links::<L, R>))
        .route(&format!("{base}/:link_id/review"), post(review_link::<L, R>))
        .route(&format!("{base}/:link_id/delete"), post(delete_link::<L, R>))
        .with_state(service)
}

fn parse_link_id(raw: &str) -> Result<LinkId, ClaimServiceError> {
    raw.parse().map_err(|_| ClaimServiceError::NotFound)
}

async fn list_links<L, R>(
    State(service): State<Arc<LinkService<L, R>>>,
    _staff: StaffUser,
    Query(query): Query<ListQuery>,
) -> Response
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    let result = query
        .link_filter()
        .map_err(ClaimServiceError::from)
        .and_then(|filter| service.list_all(&filter));
    match result {
        Ok(links) => {
            Json(json!({ "resource": L::ADMIN_RESOURCE, "links": links })).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn review_link<L, R>(
    State(service): State<Arc<LinkService<L, R>>>,
    _staff: StaffUser,
    Path(link_id): Path<String>,
    submission: FormSubmission,
) -> Response
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    let result = parse_link_id(&link_id).and_then(|id| -> Result<_, ClaimServiceError> {
        let decision = submission.decode::<ReviewForm>()?.into_decision()?;
        service.review(&id, decision)
    });
    match result {
        Ok(record) => redirect_with(
            &format!("/admin/{}?parent={}", L::ADMIN_RESOURCE, record.parent),
            &Flash::success(format!("Link marked {}.", record.eligibility.label())),
        ),
        Err(err) => err.into_response(),
    }
}

async fn delete_link<L, R>(
    State(service): State<Arc<LinkService<L, R>>>,
    _staff: StaffUser,
    Path(link_id): Path<String>,
) -> Response
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    match parse_link_id(&link_id).and_then(|id| service.delete_any(&id)) {
        Ok(()) => redirect_with(
            &format!("/admin/{}", L::ADMIN_RESOURCE),
            &Flash::success("Link deleted."),
        ),
        Err(err) => err.into_response(),
    }
}
