//! `POST /admin/{target}/upload-csv`: bulk CSV import from the admin site.

use std::sync::Arc;

use axum::{
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tracing::{info, warn};

use super::flash::{redirect_with, Flash};
use super::ADMIN_INDEX;
use crate::claims::extract::StaffUser;
use crate::claims::forms::FormSubmission;
use crate::claims::service::ClaimServiceError;
use crate::claims::validation::{FieldErrors, REQUIRED};
use crate::import::ImportSink;

pub const CSV_UPLOAD: &str = "csv_upload";
pub const WRONG_FILE_TYPE: &str = "The wrong file type was uploaded";

/// One `upload-csv` route per sink, e.g. `/admin/grants/upload-csv`.
pub fn upload_router(sinks: Vec<Arc<dyn ImportSink>>) -> Router {
    sinks.into_iter().fold(Router::new(), |router, sink| {
        let path = format!("/admin/{}/upload-csv", sink.target().slug());
        router.route(
            &path,
            post(move |staff: StaffUser, submission: FormSubmission| {
                upload_csv(Arc::clone(&sink), staff, submission)
            }),
        )
    })
}

async fn upload_csv(
    sink: Arc<dyn ImportSink>,
    StaffUser(staff): StaffUser,
    submission: FormSubmission,
) -> Response {
    let Some(file) = submission.file(CSV_UPLOAD) else {
        return ClaimServiceError::Validation(FieldErrors::single(CSV_UPLOAD, REQUIRED))
            .into_response();
    };

    if !file.file_name.to_ascii_lowercase().ends_with(".csv") {
        warn!(file = %file.file_name, target = %sink.target(), "rejected non-CSV upload");
        return redirect_with(ADMIN_INDEX, &Flash::warning(WRONG_FILE_TYPE));
    }

    match sink.import(&file.data) {
        Ok(summary) => {
            info!(
                uploader = %staff.id,
                target = %sink.target(),
                created = summary.created,
                updated = summary.updated,
                "csv upload imported"
            );
            redirect_with(
                ADMIN_INDEX,
                &Flash::success(format!("Imported {}: {summary}.", sink.target())),
            )
        }
        Err(err) => {
            warn!(uploader = %staff.id, target = %sink.target(), error = %err, "csv upload rejected");
            err.into_response()
        }
    }
}
