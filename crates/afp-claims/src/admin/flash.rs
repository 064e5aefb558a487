//! One-shot messages carried across the post/redirect/get cycle in a cookie.

use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const FLASH_COOKIE: &str = "afp_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Warning,
}

impl FlashLevel {
    fn as_str(self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Warning => "warning",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(FlashLevel::Success),
            "warning" => Some(FlashLevel::Warning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Warning,
            message: message.into(),
        }
    }

    fn cookie_value(&self) -> String {
        format!(
            "{FLASH_COOKIE}={}:{}; Path=/; HttpOnly; SameSite=Lax",
            self.level.as_str(),
            urlencoding::encode(&self.message)
        )
    }

    /// The flash carried by the request's cookies, if any.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == FLASH_COOKIE)
            .and_then(|(_, value)| {
                let (level, message) = value.split_once(':')?;
                let message = urlencoding::decode(message).ok()?;
                Some(Self {
                    level: FlashLevel::parse(level)?,
                    message: message.into_owned(),
                })
            })
    }
}

/// Expire the flash cookie once it has been shown.
pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("afp_flash=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

/// `303 See Other` to `location`, setting `flash` for the next page.
pub fn redirect_with(location: &str, flash: &Flash) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(location) {
        headers.insert(LOCATION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&flash.cookie_value()) {
        headers.insert(SET_COOKIE, value);
    }
    (StatusCode::SEE_OTHER, headers).into_response()
}
