use std::path::Path;
use std::sync::Arc;

use afp_claims::accounts::{AccountDirectory, InMemoryAccountDirectory, UserAccount};
use afp_claims::claims::{
    claim_router, AuthContext, Award, ClaimService, EntryType, EvidencePolicy,
    InMemoryClaimRepository, LocalEvidenceStore, LookupRegistry, WeightedTable,
};
use axum::body::Body;
use axum::http::{HeaderName, Request, StatusCode};
use axum::response::Response;
use axum::{Extension, Router};
use serde_json::Value;
use tower::ServiceExt;

const USER_HEADER: &str = "x-afp-user";
const BOUNDARY: &str = "afp-test-boundary";

struct App {
    router: Router,
    accounts: InMemoryAccountDirectory,
    owner: UserAccount,
    level: String,
    _media: tempfile::TempDir,
    media_root: std::path::PathBuf,
}

fn app() -> App {
    let media = tempfile::tempdir().expect("media root");
    let media_root = media.path().to_path_buf();

    let lookups = Arc::new(LookupRegistry::new());
    let level = lookups
        .add_weighted(WeightedTable::AwardLevel, "Provincial", 250.0)
        .expect("award level");
    let accounts = InMemoryAccountDirectory::default();
    let owner = accounts
        .insert(UserAccount::new("mrao@example.org", "Meera", "Rao").expect("account"))
        .expect("insert");

    let service = Arc::new(ClaimService::new(
        Arc::new(InMemoryClaimRepository::<Award>::default()),
        lookups,
        Arc::new(LocalEvidenceStore::new(&media_root)),
        EvidencePolicy::default(),
    ));
    let auth = Arc::new(AuthContext::new(
        Arc::new(accounts.clone()),
        HeaderName::from_static(USER_HEADER),
        "/accounts/login",
    ));

    App {
        router: claim_router(service).layer(Extension(auth)),
        accounts,
        owner,
        level: level.id.to_string(),
        _media: media,
        media_root,
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a str, &'a [u8]),
}

fn multipart_request(uri: &str, user: &UserAccount, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, file_name, content_type, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(USER_HEADER, user.id.to_string())
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

fn get(uri: &str, user: &UserAccount) -> Request<Body> {
    Request::get(uri)
        .header(USER_HEADER, user.id.to_string())
        .body(Body::empty())
        .expect("request")
}

async fn json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 256 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

async fn only_claim(app: &App) -> Value {
    let response = app
        .router
        .clone()
        .oneshot(get("/awards", &app.owner))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = json(response).await;
    let claims = payload["claims"].as_array().expect("claims array");
    assert_eq!(claims.len(), 1, "exactly one award expected");
    claims[0]["claim"].clone()
}

#[tokio::test]
async fn award_with_evidence_is_created_edited_and_deleted() {
    let app = app();
    let created = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/awards/add",
            &app.owner,
            &[
                Part::Text("name", "Mentor of the Year"),
                Part::Text("organization", "Department of Psychiatry"),
                Part::Text("award_level", &app.level),
                Part::File("ver_file", "letter.pdf", "application/pdf", b"%PDF-1.4 award"),
            ],
        ))
        .await
        .expect("create");
    assert_eq!(created.status(), StatusCode::SEE_OTHER);

    let claim = only_claim(&app).await;
    assert_eq!(claim["details"]["name"], "Mentor of the Year");
    assert_eq!(claim["eligibility"], "not_reviewed");
    let stored = claim["verification"]["files"]["ver_file"]["path"]
        .as_str()
        .expect("stored path")
        .to_string();
    assert_eq!(
        stored,
        format!("uploads/{}/Award/letter.pdf", app.owner.id)
    );
    assert!(app.media_root.join(&stored).exists());

    let claim_id = claim["id"].as_str().expect("claim id").to_string();
    let edited = app
        .router
        .clone()
        .oneshot(multipart_request(
            &format!("/awards/{claim_id}/edit"),
            &app.owner,
            &[
                Part::Text("name", "Mentor of the Year (2024)"),
                Part::Text("organization", "Department of Psychiatry"),
                Part::Text("award_level", &app.level),
                Part::Text("ver_file-clear", "on"),
            ],
        ))
        .await
        .expect("edit");
    assert_eq!(edited.status(), StatusCode::SEE_OTHER);

    let claim = only_claim(&app).await;
    assert_eq!(claim["details"]["name"], "Mentor of the Year (2024)");
    assert!(claim["verification"]["files"]["ver_file"].is_null());
    assert!(!app.media_root.join(&stored).exists());
    let entry_type: EntryType =
        serde_json::from_value(claim["entry_type"].clone()).expect("entry type");
    assert_eq!(entry_type, EntryType::SelfReport);

    let deleted = app
        .router
        .clone()
        .oneshot(
            Request::post(format!("/awards/{claim_id}/delete"))
                .header(USER_HEADER, app.owner.id.to_string())
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("delete");
    assert_eq!(deleted.status(), StatusCode::SEE_OTHER);

    let listing = app
        .router
        .clone()
        .oneshot(get("/awards", &app.owner))
        .await
        .expect("list");
    let payload = json(listing).await;
    assert_eq!(payload["claims"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn unsupported_evidence_is_rejected_without_touching_disk() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/awards/add",
            &app.owner,
            &[
                Part::Text("name", "Mentor of the Year"),
                Part::Text("organization", "Department of Psychiatry"),
                Part::Text("award_level", &app.level),
                Part::File("ver_file", "notes.exe", "application/octet-stream", b"MZ"),
            ],
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let payload = json(response).await;
    assert!(payload["errors"]["ver_file"].is_array());
    assert!(!Path::new(&app.media_root).join("uploads").exists());
}

#[tokio::test]
async fn archived_accounts_are_sent_to_login() {
    let app = app();
    let mut archived = app.owner.clone();
    archived.is_active = false;
    app.accounts.update(archived.clone()).expect("archive");

    let response = app
        .router
        .clone()
        .oneshot(get("/awards", &archived))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok()),
        Some("/accounts/login?next=%2Fawards")
    );
}
