//! Credential validation and password strength scoring.
//!
//! Pure derivations over the credential inputs, recomputed on every call —
//! the reactive "revalidate on each change" behavior of the sign-up screen
//! with no memoized state.

use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::AuthConfig;

/// Minimal `local@domain.tld` shape. The backend is authoritative on
/// deliverability; this only catches obvious typos before a remote call.
static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Credentials for one sign-up attempt.
///
/// The password lives in a `SecretString` so it never reaches Debug output
/// or log lines.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// A field-level validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldError {
    EmptyField,
    InvalidFormat,
    TooShort,
}

impl FieldError {
    /// Message shown under the offending field.
    pub fn message(&self) -> &'static str {
        match self {
            Self::EmptyField => "This field is required",
            Self::InvalidFormat => "Enter a valid email address",
            Self::TooShort => "Password must be at least 8 characters",
        }
    }
}

/// Outcome of validating one sign-up form state.
///
/// Field errors and the consent advisory are independent: a missing consent
/// blocks submission but never appears as a field error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub email: Option<FieldError>,
    pub password: Option<FieldError>,
    pub consent_missing: bool,
}

impl ValidationReport {
    /// Whether both fields passed.
    pub fn fields_ok(&self) -> bool {
        self.email.is_none() && self.password.is_none()
    }

    /// Whether submission may proceed: no field errors and consent given.
    pub fn is_valid(&self) -> bool {
        self.fields_ok() && !self.consent_missing
    }
}

/// Validate credentials and the consent flag.
///
/// Returns the full error set rather than short-circuiting, so the screen
/// can show every problem at once.
pub fn validate(credentials: &Credentials, consent: bool, config: &AuthConfig) -> ValidationReport {
    let email = credentials.email.trim();
    let password = credentials.password.expose_secret();

    let email_error = if email.is_empty() {
        Some(FieldError::EmptyField)
    } else if !EMAIL_SHAPE.is_match(email) {
        Some(FieldError::InvalidFormat)
    } else {
        None
    };

    let password_error = if password.trim().is_empty() {
        Some(FieldError::EmptyField)
    } else if password.chars().count() < config.min_password_length {
        Some(FieldError::TooShort)
    } else {
        None
    };

    ValidationReport {
        email: email_error,
        password: password_error,
        consent_missing: !consent,
    }
}

/// Password strength score in [0, 5].
///
/// One point per satisfied predicate: non-empty, length >= 8, contains an
/// uppercase letter, contains a digit, contains a symbol. Purely derived
/// from the password and never sent anywhere.
pub fn password_strength(password: &str) -> u8 {
    let predicates = [
        !password.is_empty(),
        password.chars().count() >= 8,
        password.chars().any(|c| c.is_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_alphanumeric()),
    ];
    predicates.into_iter().filter(|p| *p).count() as u8
}
