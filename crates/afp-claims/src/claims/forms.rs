//! Submitted form data and the field parsers shared by every claim form.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use url::Url;
use validator::Validate;

use super::evidence::UploadedFile;
use super::validation::{FieldErrors, NON_FIELD_ERRORS, REQUIRED};

pub const INVALID_DATE: &str = "Enter a valid date.";
pub const INVALID_NUMBER: &str = "Enter a number.";
pub const INVALID_WHOLE_NUMBER: &str = "Enter a whole number.";

/// Text fields and file parts of one form post, in submission order.
#[derive(Debug, Clone, Default)]
pub struct FormSubmission {
    fields: Vec<(String, String)>,
    files: BTreeMap<String, UploadedFile>,
}

impl FormSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_field(name, value);
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, file: UploadedFile) -> Self {
        self.push_file(name, file);
        self
    }

    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Attach a file part. Parts without a file name are browsers' empty inputs.
    pub fn push_file(&mut self, name: impl Into<String>, file: UploadedFile) {
        if !file.file_name.is_empty() {
            self.files.insert(name.into(), file);
        }
    }

    /// Last submitted value for `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &UploadedFile)> {
        self.files.iter().map(|(name, file)| (name.as_str(), file))
    }

    /// Decode the text fields into a form struct. Unknown fields are ignored
    /// and a repeated field keeps its last value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FieldErrors> {
        let mut latest: BTreeMap<&str, &str> = BTreeMap::new();
        for (key, value) in &self.fields {
            latest.insert(key.as_str(), value.as_str());
        }

        let encoded = serde_urlencoded::to_string(&latest).map_err(invalid_form)?;
        serde_urlencoded::from_str(&encoded).map_err(invalid_form)
    }
}

fn invalid_form(err: impl Display) -> FieldErrors {
    FieldErrors::single(NON_FIELD_ERRORS, format!("Invalid form data: {err}"))
}

/// Fields every claim form accepts alongside its own.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CommonFields {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub comments: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(url)]
    pub ver_url: Option<String>,
}

impl CommonFields {
    pub fn clean(submission: &FormSubmission) -> Result<Self, FieldErrors> {
        let fields: CommonFields = submission.decode()?;
        fields.validate()?;
        Ok(fields)
    }

    pub fn verification_url(&self) -> Option<Url> {
        self.ver_url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
    }
}

/// Trimmed text, with blank values treated as absent.
pub fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// HTML checkbox semantics: absent or `false`/`off`/`0` is false.
pub fn checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map_or(false, is_checked))
}

pub fn is_checked(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "false" | "off" | "0" | "no"
    )
}

/// Name of the checkbox that clears a stored evidence file, e.g. `ver_file-clear`.
pub fn clear_flag(field: &str) -> String {
    format!("{field}-clear")
}

pub fn parse_date_value(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
}

/// Parse an optional `YYYY-MM-DD` field, recording errors against `field`.
pub fn date_field(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
    required: bool,
) -> Option<NaiveDate> {
    match raw {
        None => {
            if required {
                errors.add(field, REQUIRED);
            }
            None
        }
        Some(raw) => match parse_date_value(raw) {
            Ok(date) => Some(date),
            Err(_) => {
                errors.add(field, INVALID_DATE);
                None
            }
        },
    }
}

/// Parse a decimal field with at most two fractional digits within `min..=max`.
pub fn decimal_field(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
    required: bool,
    min: f64,
    max: f64,
) -> Option<f64> {
    let raw = match raw {
        Some(raw) => raw.trim(),
        None => {
            if required {
                errors.add(field, REQUIRED);
            }
            return None;
        }
    };

    let value = match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            errors.add(field, INVALID_NUMBER);
            return None;
        }
    };

    if let Some((_, fraction)) = raw.split_once('.') {
        if fraction.len() > 2 {
            errors.add(
                field,
                "Ensure that there are no more than 2 decimal places.",
            );
            return None;
        }
    }

    bounded(errors, field, value, min, max)
}

/// Parse an integer field within `min..=max`.
pub fn integer_field<T>(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
    required: bool,
    min: T,
    max: T,
) -> Option<T>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let raw = match raw {
        Some(raw) => raw.trim(),
        None => {
            if required {
                errors.add(field, REQUIRED);
            }
            return None;
        }
    };

    match raw.parse::<T>() {
        Ok(value) => bounded(errors, field, value, min, max),
        Err(_) => {
            errors.add(field, INVALID_WHOLE_NUMBER);
            None
        }
    }
}

fn bounded<T>(errors: &mut FieldErrors, field: &str, value: T, min: T, max: T) -> Option<T>
where
    T: PartialOrd + Display + Copy,
{
    if value < min {
        errors.add(
            field,
            format!("Ensure this value is greater than or equal to {min}."),
        );
        None
    } else if value > max {
        errors.add(
            field,
            format!("Ensure this value is less than or equal to {max}."),
        );
        None
    } else {
        Some(value)
    }
}
