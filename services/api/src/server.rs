use crate::cli::ServeArgs;
use crate::infra::{bootstrap, AppState};
use crate::routes::app_router;
use afp_claims::claims::AuthContext;
use afp_claims::config::AppConfig;
use afp_claims::error::AppError;
use afp_claims::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let services = bootstrap(&config)?;
    let auth = Arc::new(AuthContext::new(
        Arc::clone(&services.accounts),
        config.auth.user_header.clone(),
        config.auth.login_url.clone(),
    ));

    let app = app_router(&services, auth, config.uploads.max_request_bytes)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, user_header = %config.auth.user_header, "afp claims service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
