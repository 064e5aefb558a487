use std::sync::Arc;

use afp_claims::accounts::{AccountDirectory, InMemoryAccountDirectory, UserAccount};
use afp_claims::admin::{
    admin_claim_router, admin_index_router, lookup_admin_router, ResourceSummary,
};
use afp_claims::claims::{
    AuthContext, Award, ClaimService, EligibilityStatus, EvidencePolicy, FormSubmission,
    InMemoryClaimRepository, InMemoryEvidenceStore, LookupRegistry, WeightedTable,
};
use axum::body::Body;
use axum::http::{HeaderName, Request, StatusCode};
use axum::response::Response;
use axum::{Extension, Router};
use serde_json::Value;
use tower::ServiceExt;

const USER_HEADER: &str = "x-afp-user";

type AwardService = ClaimService<Award, InMemoryClaimRepository<Award>>;

struct Admin {
    router: Router,
    awards: Arc<AwardService>,
    lookups: Arc<LookupRegistry>,
    staff: UserAccount,
    physician: UserAccount,
    level: String,
}

fn admin() -> Admin {
    let lookups = Arc::new(LookupRegistry::new());
    let level = lookups
        .add_weighted(WeightedTable::AwardLevel, "International", 1000.0)
        .expect("award level");

    let accounts = InMemoryAccountDirectory::default();
    let staff = accounts
        .insert(
            UserAccount::new("afp-office@example.org", "Sam", "Office")
                .expect("account")
                .staff(),
        )
        .expect("insert staff");
    let physician = accounts
        .insert(UserAccount::new("tnguyen@example.org", "Tran", "Nguyen").expect("account"))
        .expect("insert physician");

    let awards: Arc<AwardService> = Arc::new(ClaimService::new(
        Arc::new(InMemoryClaimRepository::default()),
        Arc::clone(&lookups),
        Arc::new(InMemoryEvidenceStore::default()),
        EvidencePolicy::default(),
    ));
    let summaries: Vec<Arc<dyn ResourceSummary>> = vec![awards.clone() as Arc<dyn ResourceSummary>];
    let directory: Arc<dyn AccountDirectory> = Arc::new(accounts);
    let auth = Arc::new(AuthContext::new(
        directory,
        HeaderName::from_static(USER_HEADER),
        "/accounts/login",
    ));

    let router = Router::new()
        .merge(admin_index_router(summaries))
        .merge(admin_claim_router(Arc::clone(&awards)))
        .merge(lookup_admin_router(Arc::clone(&lookups)))
        .layer(Extension(auth));

    Admin {
        router,
        awards,
        lookups,
        staff,
        physician,
        level: level.id.to_string(),
    }
}

impl Admin {
    fn submit_award(&self, name: &str) -> String {
        let submission = FormSubmission::new()
            .with_field("name", name)
            .with_field("organization", "World Psychiatric Association")
            .with_field("award_level", self.level.as_str());
        self.awards
            .create(self.physician.id, &submission)
            .expect("award created")
            .id
            .to_string()
    }
}

fn post_form(uri: &str, user: &UserAccount, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(USER_HEADER, user.id.to_string())
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str, user: &UserAccount, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::get(uri).header(USER_HEADER, user.id.to_string());
    if let Some(cookie) = cookie {
        request = request.header("cookie", cookie);
    }
    request.body(Body::empty()).expect("request")
}

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[tokio::test]
async fn review_decision_is_flashed_on_the_index() {
    let admin = admin();
    let claim_id = admin.submit_award("Distinguished Fellow");
    admin.submit_award("Early Career Award");

    let reviewed = admin
        .router
        .clone()
        .oneshot(post_form(
            &format!("/admin/awards/{claim_id}/review"),
            &admin.staff,
            "eligible=eligible&decision_comments=Letter+on+file",
        ))
        .await
        .expect("review");
    assert_eq!(reviewed.status(), StatusCode::SEE_OTHER);
    assert_eq!(header(&reviewed, "location"), "/admin/awards");
    let cookie = header(&reviewed, "set-cookie")
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string();

    let record = admin
        .awards
        .fetch_any(&claim_id.parse().expect("claim id"))
        .expect("record");
    assert_eq!(record.eligibility, EligibilityStatus::Eligible);
    assert_eq!(record.decision_comments.as_deref(), Some("Letter on file"));

    let index = admin
        .router
        .clone()
        .oneshot(get("/admin/", &admin.staff, Some(&cookie)))
        .await
        .expect("index");
    assert_eq!(index.status(), StatusCode::OK);
    assert!(header(&index, "set-cookie").contains("Max-Age=0"));
    let payload = json(index).await;
    assert_eq!(payload["flash"]["level"], "success");
    assert_eq!(
        payload["flash"]["message"],
        "Award \"Distinguished Fellow\" marked Eligible."
    );
    assert_eq!(payload["resources"][0]["resource"], "awards");
    assert_eq!(payload["resources"][0]["total"], 2);
    assert_eq!(payload["resources"][0]["not_reviewed"], 1);

    let pending = admin
        .router
        .clone()
        .oneshot(get("/admin/awards?eligible=-1", &admin.staff, None))
        .await
        .expect("pending");
    let payload = json(pending).await;
    let claims = payload["claims"].as_array().expect("claims");
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0]["title"], "Early Career Award");
}

#[tokio::test]
async fn physicians_cannot_reach_the_admin_site() {
    let admin = admin();
    let claim_id = admin.submit_award("Distinguished Fellow");

    let index = admin
        .router
        .clone()
        .oneshot(get("/admin/", &admin.physician, None))
        .await
        .expect("index");
    assert_eq!(index.status(), StatusCode::FORBIDDEN);

    let review = admin
        .router
        .clone()
        .oneshot(post_form(
            &format!("/admin/awards/{claim_id}/review"),
            &admin.physician,
            "eligible=1",
        ))
        .await
        .expect("review");
    assert_eq!(review.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        admin
            .awards
            .fetch_any(&claim_id.parse().expect("claim id"))
            .expect("record")
            .eligibility,
        EligibilityStatus::NotReviewed
    );
}

#[tokio::test]
async fn invalid_review_and_filters_are_unprocessable() {
    let admin = admin();
    let claim_id = admin.submit_award("Distinguished Fellow");

    let review = admin
        .router
        .clone()
        .oneshot(post_form(
            &format!("/admin/awards/{claim_id}/review"),
            &admin.staff,
            "eligible=5",
        ))
        .await
        .expect("review");
    assert_eq!(review.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let listing = admin
        .router
        .clone()
        .oneshot(get("/admin/awards?owner=someone", &admin.staff, None))
        .await
        .expect("listing");
    assert_eq!(listing.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = json(listing).await;
    assert!(payload["errors"]["owner"].is_array());
}

#[tokio::test]
async fn lookup_weights_are_bounded_per_table() {
    let admin = admin();

    let too_heavy = admin
        .router
        .clone()
        .oneshot(post_form(
            "/admin/lookups/award-levels/add",
            &admin.staff,
            "name=Galactic&weight=5000",
        ))
        .await
        .expect("add");
    assert_eq!(too_heavy.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let fractional = admin
        .router
        .clone()
        .oneshot(post_form(
            "/admin/lookups/award-levels/add",
            &admin.staff,
            "name=Regional&weight=100.5",
        ))
        .await
        .expect("add");
    assert_eq!(fractional.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = json(fractional).await;
    assert_eq!(payload["errors"]["weight"][0], "Enter a whole number.");

    let added = admin
        .router
        .clone()
        .oneshot(post_form(
            "/admin/lookups/award-levels/add",
            &admin.staff,
            "name=Regional&weight=100",
        ))
        .await
        .expect("add");
    assert_eq!(added.status(), StatusCode::SEE_OTHER);
    assert_eq!(header(&added, "location"), "/admin/lookups/award-levels");
    assert!(admin
        .lookups
        .weighted_entries(WeightedTable::AwardLevel)
        .iter()
        .any(|entry| entry.name == "Regional" && entry.weight == 100.0));

    let unknown = admin
        .router
        .clone()
        .oneshot(get("/admin/lookups/colours", &admin.staff, None))
        .await
        .expect("unknown table");
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
