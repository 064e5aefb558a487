use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Multipart, Request},
    http::{header::CONTENT_TYPE, request::Parts, HeaderName, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use super::evidence::UploadedFile;
use super::forms::FormSubmission;
use crate::accounts::{AccountDirectory, UserAccount, UserId};

/// Identifies the signed-in user from the header set by the authenticating proxy.
pub struct AuthContext {
    directory: Arc<dyn AccountDirectory>,
    user_header: HeaderName,
    login_url: String,
}

impl AuthContext {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        user_header: HeaderName,
        login_url: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            user_header,
            login_url: login_url.into(),
        }
    }

    pub fn user_header(&self) -> &HeaderName {
        &self.user_header
    }

    pub fn directory(&self) -> &Arc<dyn AccountDirectory> {
        &self.directory
    }

    fn login_redirect(&self, parts: &Parts) -> AuthRejection {
        let next = parts
            .uri
            .path_and_query()
            .map(|value| value.as_str())
            .unwrap_or("/");
        AuthRejection::Login(format!(
            "{}?next={}",
            self.login_url,
            urlencoding::encode(next)
        ))
    }
}

#[derive(Debug)]
pub enum AuthRejection {
    Login(String),
    Forbidden,
    Misconfigured,
    Unavailable(String),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Login(location) => Redirect::to(&location).into_response(),
            AuthRejection::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "staff access required" })),
            )
                .into_response(),
            AuthRejection::Misconfigured => {
                error!("authentication context missing from router");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "authentication is not configured" })),
                )
                    .into_response()
            }
            AuthRejection::Unavailable(message) => {
                error!(%message, "account directory unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}

/// The signed-in, active account making the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserAccount);

impl CurrentUser {
    pub fn id(&self) -> UserId {
        self.0.id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<Arc<AuthContext>>()
            .cloned()
            .ok_or(AuthRejection::Misconfigured)?;

        let Some(user_id) = parts
            .headers
            .get(&context.user_header)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok())
        else {
            return Err(context.login_redirect(parts));
        };

        match context.directory.active(&user_id) {
            Ok(Some(account)) => Ok(Self(account)),
            Ok(None) => {
                warn!(user = %user_id, "request from unknown or inactive account");
                Err(context.login_redirect(parts))
            }
            Err(err) => Err(AuthRejection::Unavailable(err.to_string())),
        }
    }
}

/// A signed-in account with access to the admin surface.
#[derive(Debug, Clone)]
pub struct StaffUser(pub UserAccount);

#[async_trait]
impl<S> FromRequestParts<S> for StaffUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(account) = CurrentUser::from_request_parts(parts, state).await?;
        if account.is_staff {
            Ok(Self(account))
        } else {
            warn!(user = %account.id, path = %parts.uri.path(), "non-staff admin access");
            Err(AuthRejection::Forbidden)
        }
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormSubmission
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            let mut submission = FormSubmission::new();
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(IntoResponse::into_response)?
            {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                match field.file_name().map(str::to_string) {
                    Some(file_name) => {
                        let content_type = field.content_type().map(str::to_string);
                        let data = field.bytes().await.map_err(IntoResponse::into_response)?;
                        submission.push_file(name, UploadedFile::new(file_name, content_type, data));
                    }
                    None => {
                        let value = field.text().await.map_err(IntoResponse::into_response)?;
                        submission.push_field(name, value);
                    }
                }
            }
            Ok(submission)
        } else {
            let body = Bytes::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_bytes(&body).map_err(|err| {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": format!("malformed form body: {err}") })),
                    )
                        .into_response()
                })?;
            Ok(FormSubmission::from_pairs(pairs))
        }
    }
}
