//! Error types for the auth core.

use crate::onboarding::validation::ValidationReport;

/// Fallback advisory shown when the backend rejects a request without a
/// usable message.
pub const GENERIC_REMOTE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Top-level error type for the auth core.
///
/// Every variant is recoverable: the operation that produced it has already
/// rolled the state machine back to its last stable phase and released the
/// in-flight flag. The `Display` text is the user-visible advisory.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Please correct the highlighted fields")]
    Validation(ValidationReport),

    #[error("You must accept the terms of service to continue")]
    ConsentRequired,

    #[error("Enter the verification code sent to your email")]
    CodeRequired,

    #[error("Another sign-in request is already in progress")]
    Busy,

    #[error("Cannot {action} while {phase}")]
    InvalidPhase { phase: String, action: &'static str },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl AuthError {
    /// The validation report attached to a `Validation` error, if any.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Validation(report) => Some(report),
            _ => None,
        }
    }
}

/// Errors from the remote identity collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The backend rejected the request. Its message is surfaced verbatim
    /// when present, otherwise the generic fallback.
    #[error("{}", message.as_deref().unwrap_or(GENERIC_REMOTE_MESSAGE))]
    Backend { message: Option<String> },

    #[error("{}", GENERIC_REMOTE_MESSAGE)]
    Network(String),
}

impl RemoteError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: Some(message.into()),
        }
    }
}

/// Errors from the social delegation path.
///
/// Coarse by design: provider SDK failures are not enumerable ahead of time,
/// so they collapse to `Failed` without leaking provider internals. The one
/// exception is `Unavailable`, which names the provider so a missing
/// integration is diagnosable rather than mistaken for a network failure.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Sign-in with {provider} is not available")]
    Unavailable { provider: String },

    #[error("Authentication failed")]
    Failed { provider: String },
}

/// Result type alias for the auth core.
pub type Result<T> = std::result::Result<T, AuthError>;
