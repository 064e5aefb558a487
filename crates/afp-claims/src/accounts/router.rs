use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

use super::{AccountDirectory, AccountError, ProfileForm};
use crate::claims::extract::CurrentUser;
use crate::claims::forms::FormSubmission;
use crate::claims::lookups::LookupRegistry;
use crate::claims::validation::FieldErrors;

pub const PROFILE_PATH: &str = "/accounts/profile";

#[derive(Clone)]
pub struct ProfileState {
    pub directory: Arc<dyn AccountDirectory>,
    pub lookups: Arc<LookupRegistry>,
}

pub fn profile_router(directory: Arc<dyn AccountDirectory>, lookups: Arc<LookupRegistry>) -> Router {
    Router::new()
        .route(PROFILE_PATH, get(show_profile).post(update_profile))
        .with_state(ProfileState { directory, lookups })
}

pub(crate) async fn show_profile(CurrentUser(account): CurrentUser) -> Response {
    (StatusCode::OK, Json(account)).into_response()
}

pub(crate) async fn update_profile(
    State(state): State<ProfileState>,
    CurrentUser(account): CurrentUser,
    submission: FormSubmission,
) -> Response {
    let user = account.id;
    let updated = match submission
        .decode::<ProfileForm>()
        .and_then(|form| form.apply(account, &state.lookups))
    {
        Ok(updated) => updated,
        Err(errors) => return invalid(errors),
    };

    match state.directory.update(updated) {
        Ok(()) => {
            info!(%user, "profile updated");
            Redirect::to(PROFILE_PATH).into_response()
        }
        Err(AccountError::DuplicateEmail(email)) => invalid(FieldErrors::single(
            "email",
            format!("An account with email {email} already exists."),
        )),
        Err(AccountError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(other) => {
            error!(%user, error = %other, "profile update failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": other.to_string() })),
            )
                .into_response()
        }
    }
}

fn invalid(errors: FieldErrors) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "errors": errors })),
    )
        .into_response()
}
