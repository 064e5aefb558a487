use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use validator::{ValidationError, ValidationErrors};

/// Key for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "__all__";
pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const REQUIRED_FOR_OTHER: &str = "This field is required when 'Other' is selected.";

/// Per-field validation messages, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// Record a required-field error when `value` is missing.
    pub fn require<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.add(field, REQUIRED);
        }
        value
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn from_validation(report: &ValidationErrors) -> Self {
        let mut errors = Self::new();
        for (field, failures) in report.field_errors() {
            let field = field.to_string();
            let field = if field == "__all__" {
                NON_FIELD_ERRORS.to_string()
            } else {
                field
            };
            for failure in failures.iter() {
                errors.add(field.clone(), describe(failure));
            }
        }
        errors
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl From<ValidationErrors> for FieldErrors {
    fn from(report: ValidationErrors) -> Self {
        Self::from_validation(&report)
    }
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    let param = |name: &str| error.params.get(name).map(|value| value.to_string());
    match error.code.as_ref() {
        "length" => match (param("min"), param("max")) {
            (_, Some(max)) if error_value_longer_than(error, &max) => {
                format!("Ensure this value has at most {max} characters.")
            }
            (Some(min), _) => format!("Ensure this value has at least {min} characters."),
            (None, Some(max)) => format!("Ensure this value has at most {max} characters."),
            (None, None) => "Ensure this value has a valid length.".to_string(),
        },
        "range" => match (param("min"), param("max")) {
            (Some(min), Some(max)) => format!("Ensure this value is between {min} and {max}."),
            (Some(min), None) => format!("Ensure this value is greater than or equal to {min}."),
            (None, Some(max)) => format!("Ensure this value is less than or equal to {max}."),
            (None, None) => "Ensure this value is within range.".to_string(),
        },
        "url" => "Enter a valid URL.".to_string(),
        "email" => "Enter a valid email address.".to_string(),
        code => format!("Invalid value ({code})."),
    }
}

fn error_value_longer_than(error: &ValidationError, max: &str) -> bool {
    let Ok(max) = max.parse::<usize>() else {
        return false;
    };
    error
        .params
        .get("value")
        .and_then(|value| value.as_str())
        .map_or(false, |value| value.chars().count() > max)
}
