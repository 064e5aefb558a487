use std::sync::Arc;

use afp_claims::accounts::{AccountDirectory, InMemoryAccountDirectory, UserAccount};
use afp_claims::admin::flash::FLASH_COOKIE;
use afp_claims::admin::upload_router;
use afp_claims::claims::{
    AuthContext, ClaimService, EligibilityStatus, EntryType, EvidencePolicy, Grant,
    InMemoryClaimRepository, InMemoryEvidenceStore, LookupId, LookupRegistry, ReviewFilter,
    WeightedTable,
};
use afp_claims::import::{AccountImporter, ClaimImporter, ImportSink, JournalImporter};
use axum::body::Body;
use axum::http::{HeaderName, Request, StatusCode};
use axum::response::Response;
use axum::{Extension, Router};
use serde_json::Value;
use tower::ServiceExt;

const USER_HEADER: &str = "x-afp-user";
const BOUNDARY: &str = "csv-boundary";

type GrantService = ClaimService<Grant, InMemoryClaimRepository<Grant>>;

struct Site {
    router: Router,
    grants: Arc<GrantService>,
    lookups: Arc<LookupRegistry>,
    accounts: Arc<dyn AccountDirectory>,
    staff: UserAccount,
    physician: UserAccount,
    agency: LookupId,
}

fn site() -> Site {
    let lookups = Arc::new(LookupRegistry::new());
    let category = lookups
        .add_weighted(WeightedTable::GrantCategory, "Peer reviewed", 1.0)
        .expect("category");
    let federal = lookups.add_agency_type("Federal").expect("agency type");
    let agency = lookups
        .add_agency("CIHR", federal.id, category.id)
        .expect("agency");

    let accounts = InMemoryAccountDirectory::default();
    let staff = accounts
        .insert(
            UserAccount::new("registry@example.org", "Rory", "Registrar")
                .expect("account")
                .staff(),
        )
        .expect("insert staff");
    let physician = accounts
        .insert(UserAccount::new("dkhan@example.org", "Dana", "Khan").expect("account"))
        .expect("insert physician");

    let grants: Arc<GrantService> = Arc::new(ClaimService::new(
        Arc::new(InMemoryClaimRepository::default()),
        Arc::clone(&lookups),
        Arc::new(InMemoryEvidenceStore::default()),
        EvidencePolicy::default(),
    ));
    let directory: Arc<dyn AccountDirectory> = Arc::new(accounts);
    let sinks: Vec<Arc<dyn ImportSink>> = vec![
        Arc::new(ClaimImporter::new(Arc::clone(&grants), Arc::clone(&directory))),
        Arc::new(JournalImporter::new(Arc::clone(&lookups))),
        Arc::new(AccountImporter::new(Arc::clone(&directory), Arc::clone(&lookups))),
    ];
    let auth = Arc::new(AuthContext::new(
        Arc::clone(&directory),
        HeaderName::from_static(USER_HEADER),
        "/accounts/login",
    ));

    Site {
        router: upload_router(sinks).layer(Extension(auth)),
        grants,
        lookups,
        accounts: directory,
        staff,
        physician,
        agency: agency.id,
    }
}

fn upload(uri: &str, user: &UserAccount, file_name: &str, csv: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"csv_upload\"; filename=\"{file_name}\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {csv}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::post(uri)
        .header(USER_HEADER, user.id.to_string())
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

fn flash_cookie(response: &Response) -> String {
    response
        .headers()
        .get("set-cookie")
        .and_then(|value| value.to_str().ok())
        .expect("flash cookie")
        .to_string()
}

async fn json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

fn grants_csv(site: &Site, rows: &[&str]) -> String {
    let mut csv = String::from("user_id,name,amount,agency,pi_list,coi_list,start_date,end_date,eligible\n");
    for row in rows {
        csv.push_str(
            &row.replace("{user}", &site.physician.id.to_string())
                .replace("{agency}", &site.agency.to_string()),
        );
        csv.push('\n');
    }
    csv
}

#[tokio::test]
async fn staff_upload_creates_then_updates_grants() {
    let site = site();
    let csv = grants_csv(
        &site,
        &[
            "{user},Sleep in adolescence,125000.50,{agency},D. Khan,\"A. Lee, B. Ng\",2023-07-01,2026-06-30,",
            "{user},Early psychosis cohort,40000,{agency},D. Khan,C. Ortiz,2024-01-01,2025-12-31,eligible",
        ],
    );
    let response = site
        .router
        .clone()
        .oneshot(upload("/admin/grants/upload-csv", &site.staff, "grants.csv", &csv))
        .await
        .expect("upload");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(flash_cookie(&response).starts_with(&format!("{FLASH_COOKIE}=success:")));

    let claims = site.grants.list_all(&ReviewFilter::default()).expect("list");
    assert_eq!(claims.len(), 2);
    assert!(claims
        .iter()
        .all(|record| record.owner == site.physician.id && record.entry_type == EntryType::Registry));
    let sleep = claims
        .iter()
        .find(|record| record.details.name == "Sleep in adolescence")
        .expect("sleep grant");
    assert_eq!(sleep.details.amount.cents, 12_500_050);
    assert_eq!(sleep.details.coi_list, "A. Lee, B. Ng");
    assert_eq!(sleep.eligibility, EligibilityStatus::NotReviewed);

    let again = grants_csv(
        &site,
        &["{user},Sleep in adolescence,150000,{agency},D. Khan,A. Lee,2023-07-01,2026-06-30,ineligible"],
    );
    let response = site
        .router
        .clone()
        .oneshot(upload("/admin/grants/upload-csv", &site.staff, "GRANTS.CSV", &again))
        .await
        .expect("upload");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let claims = site.grants.list_all(&ReviewFilter::default()).expect("list");
    assert_eq!(claims.len(), 2);
    let sleep = claims
        .iter()
        .find(|record| record.details.name == "Sleep in adolescence")
        .expect("sleep grant");
    assert_eq!(sleep.details.amount.cents, 15_000_000);
    assert_eq!(sleep.eligibility, EligibilityStatus::Ineligible);
}

#[tokio::test]
async fn invalid_rows_are_reported_and_nothing_is_saved() {
    let site = site();
    let csv = grants_csv(
        &site,
        &[
            "{user},Sleep in adolescence,125000,{agency},D. Khan,A. Lee,2023-07-01,2026-06-30,",
            "{user},,lots,{agency},D. Khan,A. Lee,2023-07-01,2026-06-30,maybe",
        ],
    );
    let response = site
        .router
        .clone()
        .oneshot(upload("/admin/grants/upload-csv", &site.staff, "grants.csv", &csv))
        .await
        .expect("upload");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let payload = json(response).await;
    let rows = payload["rows"].as_array().expect("row errors");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["line"], 3);
    for field in ["name", "amount", "eligible"] {
        assert!(rows[0]["errors"][field].is_array(), "{field} should be flagged");
    }
    assert_eq!(site.grants.count().expect("count"), 0);
}

#[tokio::test]
async fn non_csv_files_are_bounced_with_a_warning() {
    let site = site();
    let response = site
        .router
        .clone()
        .oneshot(upload("/admin/journals/upload-csv", &site.staff, "journals.xlsx", "id,name\n1,BMJ"))
        .await
        .expect("upload");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok()),
        Some("/admin/")
    );
    assert!(flash_cookie(&response).starts_with(&format!("{FLASH_COOKIE}=warning:")));
    assert!(site.lookups.journals().is_empty());
}

#[tokio::test]
async fn journals_upload_and_access_rules() {
    let site = site();
    let csv = "id,name,full_name,isi_listed,impact_factor\n5,JAMA,Journal of the American Medical Association,yes,63.1";

    let forbidden = site
        .router
        .clone()
        .oneshot(upload("/admin/journals/upload-csv", &site.physician, "journals.csv", csv))
        .await
        .expect("upload");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    assert!(site.lookups.journals().is_empty());

    let unknown = site
        .router
        .clone()
        .oneshot(upload("/admin/awards/upload-csv", &site.staff, "awards.csv", csv))
        .await
        .expect("upload");
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let accepted = site
        .router
        .clone()
        .oneshot(upload("/admin/journals/upload-csv", &site.staff, "journals.csv", csv))
        .await
        .expect("upload");
    assert_eq!(accepted.status(), StatusCode::SEE_OTHER);
    let jama = site.lookups.journal(LookupId(5)).expect("journal");
    assert!(jama.isi_listed);
    assert_eq!(jama.impact_factor, Some(63.1));
}

#[tokio::test]
async fn imported_physicians_can_own_imported_claims() {
    let site = site();
    let division = site.lookups.add_division("Psychiatry").expect("division");
    let users = format!(
        "email,first_name,last_name,division,is_physician\n\
         mwu@example.org,Mei,Wu,{},1\n\
         dkhan@example.org,Dana,Khan-Ortiz,,",
        division.id
    );
    let response = site
        .router
        .clone()
        .oneshot(upload("/admin/users/upload-csv", &site.staff, "users.csv", &users))
        .await
        .expect("upload");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(flash_cookie(&response).contains("users%3A%201%20created%2C%201%20updated"));

    let mei = site
        .accounts
        .find_by_email("mwu@example.org")
        .expect("lookup")
        .expect("imported physician");
    assert!(mei.is_physician && mei.can_sign_in());
    assert_eq!(mei.division, Some(division.id));
    let dana = site
        .accounts
        .fetch(&site.physician.id)
        .expect("fetch")
        .expect("existing physician");
    assert_eq!(dana.last_name, "Khan-Ortiz");

    let grants = format!(
        "user_id,name,amount,agency,pi_list,coi_list,start_date,end_date,eligible\n\
         {},Mood clinic outcomes,20000,{},M. Wu,D. Khan,2024-01-01,2024-12-31,",
        mei.id, site.agency
    );
    let response = site
        .router
        .clone()
        .oneshot(upload("/admin/grants/upload-csv", &site.staff, "grants.csv", &grants))
        .await
        .expect("upload");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let claims = site.grants.list_all(&ReviewFilter::default()).expect("list");
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].owner, mei.id);
}

#[tokio::test]
async fn user_rows_with_a_taken_email_reject_the_file() {
    let site = site();
    let users = format!(
        "id,email,first_name,last_name\n\
         ,new@example.org,Nia,New\n\
         {},registry@example.org,Someone,Else",
        site.physician.id
    );
    let response = site
        .router
        .clone()
        .oneshot(upload("/admin/users/upload-csv", &site.staff, "users.csv", &users))
        .await
        .expect("upload");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let payload = json(response).await;
    let rows = payload["rows"].as_array().expect("row errors");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["line"], 3);
    assert_eq!(
        rows[0]["errors"]["email"][0],
        "User with this Email address already exists."
    );
    assert!(site
        .accounts
        .find_by_email("new@example.org")
        .expect("lookup")
        .is_none());
}
