//! Credential and form validation.
//!
//! Every rule is a total function over string input: it never panics and
//! always reports a reason code on failure. Reason codes are opaque strings
//! that the presentation layer maps to localized text.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email validation pattern to compile")
});

/// The input a failed presence check refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum Field {
    Email,
    Password,
    HouseholdName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyInput(Field),
    #[error("email address is not valid")]
    MalformedEmail,
    #[error("password must be at least {min_length} characters")]
    TooShort { min_length: usize },
    #[error("all fields are required")]
    MissingField,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Email => "email",
            Field::Password => "password",
            Field::HouseholdName => "household name",
        })
    }
}

impl ValidationError {
    /// Localization key for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptyInput(Field::Email) => "auth.validation.emailRequired",
            ValidationError::EmptyInput(Field::Password) => "auth.validation.passwordRequired",
            ValidationError::EmptyInput(Field::HouseholdName) => "household.nameRequired",
            ValidationError::MalformedEmail => "auth.validation.emailInvalid",
            ValidationError::TooShort { .. } => "auth.validation.passwordMinLength",
            ValidationError::MissingField => "auth.validation.allFieldsRequired",
        }
    }

    /// Stable taxonomy name, independent of the field involved.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyInput(_) => "EMPTY_INPUT",
            ValidationError::MalformedEmail => "MALFORMED_EMAIL",
            ValidationError::TooShort { .. } => "TOO_SHORT",
            ValidationError::MissingField => "MISSING_FIELD",
        }
    }
}

/// Wire shape handed to the presentation layer: `{ isValid, error? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

impl From<Result<(), ValidationError>> for ValidationResult {
    fn from(result: Result<(), ValidationError>) -> Self {
        match result {
            Ok(()) => ValidationResult {
                is_valid: true,
                error: None,
            },
            Err(err) => ValidationResult {
                is_valid: false,
                error: Some(err.code().to_string()),
            },
        }
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if is_blank(email) {
        return Err(ValidationError::EmptyInput(Field::Email));
    }
    if !EMAIL_PATTERN.is_match(email.trim()) {
        return Err(ValidationError::MalformedEmail);
    }
    Ok(())
}

/// Length is measured on the raw value in UTF-16 code units, so surrounding
/// whitespace counts and a character outside the BMP counts twice.
pub fn validate_password(password: &str, min_length: usize) -> Result<(), ValidationError> {
    if is_blank(password) {
        return Err(ValidationError::EmptyInput(Field::Password));
    }
    if password.encode_utf16().count() < min_length {
        return Err(ValidationError::TooShort { min_length });
    }
    Ok(())
}

pub fn validate_sign_up(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_sign_up_with(email, password, DEFAULT_MIN_PASSWORD_LENGTH)
}

pub fn validate_sign_up_with(
    email: &str,
    password: &str,
    min_length: usize,
) -> Result<(), ValidationError> {
    validate_email(email)?;
    validate_password(password, min_length)
}

/// Presence-only: shape and length are left to the authentication backend.
pub fn validate_sign_in(email: &str, password: &str) -> Result<(), ValidationError> {
    if is_blank(email) || is_blank(password) {
        return Err(ValidationError::MissingField);
    }
    Ok(())
}

pub fn validate_household_name(name: &str) -> Result<(), ValidationError> {
    if is_blank(name) {
        return Err(ValidationError::EmptyInput(Field::HouseholdName));
    }
    Ok(())
}
