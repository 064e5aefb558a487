use std::sync::atomic::Ordering;
use std::sync::Arc;

use afp_claims::accounts::router::profile_router;
use afp_claims::admin::{
    admin_claim_router, admin_index_router, admin_link_router, lookup_admin_router, upload_router,
};
use afp_claims::claims::links::link_router;
use afp_claims::claims::{claim_router, AuthContext};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;

use crate::infra::{AppState, Services};

/// The whole HTTP surface: physician routes, the admin site and operations endpoints.
pub(crate) fn app_router(
    services: &Services,
    auth: Arc<AuthContext>,
    max_request_bytes: usize,
) -> Router {
    Router::new()
        .merge(claim_routes(services))
        .merge(admin_routes(services))
        .merge(profile_router(
            Arc::clone(&services.accounts),
            Arc::clone(&services.lookups),
        ))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(Extension(auth))
}

fn claim_routes(services: &Services) -> Router {
    Router::new()
        .merge(claim_router(services.awards.clone()))
        .merge(claim_router(services.promotions.clone()))
        .merge(claim_router(services.editorial_boards.clone()))
        .merge(claim_router(services.committee_work.clone()))
        .merge(claim_router(services.grants.clone()))
        .merge(claim_router(services.grant_reviews.clone()))
        .merge(claim_router(services.publications.clone()))
        .merge(claim_router(services.lectures.clone()))
        .merge(claim_router(services.exams.clone()))
        .merge(claim_router(services.supervision.clone()))
        .merge(claim_router(services.cpas.clone()))
        .merge(link_router(services.grant_links.clone()))
        .merge(link_router(services.publication_links.clone()))
}

fn admin_routes(services: &Services) -> Router {
    Router::new()
        .merge(admin_index_router(services.summaries()))
        .merge(admin_claim_router(services.awards.clone()))
        .merge(admin_claim_router(services.promotions.clone()))
        .merge(admin_claim_router(services.editorial_boards.clone()))
        .merge(admin_claim_router(services.committee_work.clone()))
        .merge(admin_claim_router(services.grants.clone()))
        .merge(admin_claim_router(services.grant_reviews.clone()))
        .merge(admin_claim_router(services.publications.clone()))
        .merge(admin_claim_router(services.lectures.clone()))
        .merge(admin_claim_router(services.exams.clone()))
        .merge(admin_claim_router(services.supervision.clone()))
        .merge(admin_claim_router(services.cpas.clone()))
        .merge(admin_link_router(services.grant_links.clone()))
        .merge(admin_link_router(services.publication_links.clone()))
        .merge(lookup_admin_router(Arc::clone(&services.lookups)))
        .merge(upload_router(services.import_sinks()))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
