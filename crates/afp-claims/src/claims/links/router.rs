use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::{LinkId, LinkKind, LinkService};
use crate::claims::domain::ClaimId;
use crate::claims::extract::CurrentUser;
use crate::claims::forms::FormSubmission;
use crate::claims::kinds::ClaimKind;
use crate::claims::repository::LinkRepository;
use crate::claims::service::ClaimServiceError;

/// Routes through which a claim owner manages the people linked to a claim.
pub fn link_router<L, R>(service: Arc<LinkService<L, R>>) -> Router
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    let base = format!("/{}/:claim_id/links", L::Parent::RESOURCE);
    Router::new()
        .route(&base, get(list_links::<L, R>))
        .route(&format!("{base}/add"), post(add_link::<L, R>))
        .route(&format!("{base}/:link_id/delete"), post(remove_link::<L, R>))
        .with_state(service)
}

fn links_location<L: LinkKind>(claim_id: &ClaimId) -> String {
    format!("/{}/{claim_id}/links", L::Parent::RESOURCE)
}

async fn list_links<L, R>(
    State(service): State<Arc<LinkService<L, R>>>,
    user: CurrentUser,
    Path(claim_id): Path<String>,
) -> Response
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    let Ok(claim_id) = claim_id.parse::<ClaimId>() else {
        return ClaimServiceError::NotFound.into_response();
    };
    match service.list(&user.id(), &claim_id) {
        Ok(links) => Json(json!({ "claim": claim_id, "links": links })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn add_link<L, R>(
    State(service): State<Arc<LinkService<L, R>>>,
    user: CurrentUser,
    Path(claim_id): Path<String>,
    submission: FormSubmission,
) -> Response
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    let Ok(claim_id) = claim_id.parse::<ClaimId>() else {
        return ClaimServiceError::NotFound.into_response();
    };
    match service.add(&user.id(), &claim_id, &submission) {
        Ok(_) => Redirect::to(&links_location::<L>(&claim_id)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn remove_link<L, R>(
    State(service): State<Arc<LinkService<L, R>>>,
    user: CurrentUser,
    Path((claim_id, link_id)): Path<(String, String)>,
) -> Response
where
    L: LinkKind,
    R: LinkRepository<L> + 'static,
{
    let (Ok(claim_id), Ok(link_id)) = (claim_id.parse::<ClaimId>(), link_id.parse::<LinkId>())
    else {
        return ClaimServiceError::NotFound.into_response();
    };
    match service.remove(&user.id(), &claim_id, &link_id) {
        Ok(()) => Redirect::to(&links_location::<L>(&claim_id)).into_response(),
        Err(err) => err.into_response(),
    }
}
