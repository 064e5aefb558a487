use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::domain::ClaimId;
use super::extract::CurrentUser;
use super::forms::FormSubmission;
use super::kinds::ClaimKind;
use super::repository::ClaimRepository;
use super::service::{ClaimService, ClaimServiceError};

/// Router exposing one claim type to its owners.
pub fn claim_router<K, R>(service: Arc<ClaimService<K, R>>) -> Router
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    let base = format!("/{}", K::RESOURCE);
    Router::new()
        .route(&base, get(list_handler::<K, R>))
        .route(&format!("{base}/add"), post(create_handler::<K, R>))
        .route(
            &format!("{base}/:claim_id/edit"),
            get(show_handler::<K, R>).post(update_handler::<K, R>),
        )
        .route(
            &format!("{base}/:claim_id/delete"),
            post(delete_handler::<K, R>),
        )
        .with_state(service)
}

fn listing_redirect<K: ClaimKind>() -> Response {
    Redirect::to(&format!("/{}", K::RESOURCE)).into_response()
}

fn parse_id(raw: &str) -> Result<ClaimId, ClaimServiceError> {
    raw.parse().map_err(|_| ClaimServiceError::NotFound)
}

pub(crate) async fn list_handler<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    user: CurrentUser,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    match service.list(&user.id()) {
        Ok(claims) => {
            let entries: Vec<_> = claims
                .into_iter()
                .map(|record| json!({ "title": record.details.title(), "claim": record }))
                .collect();
            Json(json!({
                "resource": K::RESOURCE,
                "entity": K::ENTITY_NAME,
                "claims": entries,
            }))
            .into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_handler<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    user: CurrentUser,
    submission: FormSubmission,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    match service.create(user.id(), &submission) {
        Ok(_) => listing_redirect::<K>(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn show_handler<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    user: CurrentUser,
    Path(claim_id): Path<String>,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    let result = parse_id(&claim_id).and_then(|id| service.get(&user.id(), &id));
    match result {
        Ok(record) => Json(record).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_handler<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    user: CurrentUser,
    Path(claim_id): Path<String>,
    submission: FormSubmission,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    let result =
        parse_id(&claim_id).and_then(|id| service.update(&user.id(), &id, &submission));
    match result {
        Ok(_) => listing_redirect::<K>(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn delete_handler<K, R>(
    State(service): State<Arc<ClaimService<K, R>>>,
    user: CurrentUser,
    Path(claim_id): Path<String>,
) -> Response
where
    K: ClaimKind,
    R: ClaimRepository<K> + 'static,
{
    let result = parse_id(&claim_id).and_then(|id| service.delete(&user.id(), &id));
    match result {
        Ok(()) => listing_redirect::<K>(),
        Err(err) => err.into_response(),
    }
}
