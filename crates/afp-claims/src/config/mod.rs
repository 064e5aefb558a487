use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use axum::http::HeaderName;
use uuid::Uuid;

use crate::claims::evidence::MAX_UPLOAD_SIZE;

const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the claims service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub uploads: UploadConfig,
    pub auth: AuthConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let media_root =
            PathBuf::from(env::var("AFP_MEDIA_ROOT").unwrap_or_else(|_| "./media".to_string()));
        let max_upload_bytes = parse_number("AFP_MAX_UPLOAD_BYTES", MAX_UPLOAD_SIZE)?;
        let max_request_bytes = parse_number("AFP_MAX_REQUEST_BYTES", DEFAULT_MAX_REQUEST_BYTES)?;

        let user_header = env::var("AFP_AUTH_HEADER").unwrap_or_else(|_| "x-afp-user".to_string());
        let user_header = HeaderName::from_bytes(user_header.trim().as_bytes())
            .map_err(|_| ConfigError::InvalidAuthHeader(user_header.clone()))?;
        let login_url = env::var("AFP_LOGIN_URL").unwrap_or_else(|_| "/accounts/login".to_string());

        let bootstrap_admin = match env::var("AFP_ADMIN_EMAIL") {
            Ok(email) if !email.trim().is_empty() => {
                let id = match env::var("AFP_ADMIN_ID") {
                    Ok(raw) => Some(
                        Uuid::parse_str(raw.trim()).map_err(|_| ConfigError::InvalidAdminId)?,
                    ),
                    Err(_) => None,
                };
                Some(BootstrapAdmin {
                    email: email.trim().to_string(),
                    id,
                })
            }
            _ => None,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            uploads: UploadConfig {
                media_root,
                max_upload_bytes,
                max_request_bytes,
            },
            auth: AuthConfig {
                user_header,
                login_url,
            },
            bootstrap_admin,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where verification evidence lands and how large uploads may be.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub media_root: PathBuf,
    pub max_upload_bytes: u64,
    pub max_request_bytes: usize,
}

/// Boundary with the authenticating proxy in front of the service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub user_header: HeaderName,
    pub login_url: String,
}

/// Staff account created at startup when none exists for the email.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost {
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("{key} must be a non-negative integer")]
    InvalidNumber { key: &'static str },
    #[error("AFP_AUTH_HEADER '{0}' is not a valid header name")]
    InvalidAuthHeader(String),
    #[error("AFP_ADMIN_ID must be a UUID")]
    InvalidAdminId,
}
