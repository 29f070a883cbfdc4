//! Remote identity collaborator.
//!
//! The backend owns credential storage, password hashing, code generation
//! and validation — all opaque to this crate. The core only drives the
//! calls and folds the results into its own state machine.

pub mod http;

pub use http::HttpIdentityBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Opaque reference to a created-but-not-yet-verified account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef(pub String);

/// Opaque proof of authentication. Its presence is the only fact the
/// router inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef(pub String);

/// Verification status reported by the backend.
///
/// "complete" is not assumed to be the only reachable status: anything else
/// is carried as `Other` and must never crash the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Complete,
    Other(String),
}

impl VerificationStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "complete" => Self::Complete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Result of a verification attempt.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub status: VerificationStatus,
    /// Session reference, present when the backend considers the sign-up
    /// complete.
    pub session: Option<SessionRef>,
}

/// The remote identity service consumed by the orchestrator and the social
/// bridge.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Create an account for the given credentials.
    async fn create_account(&self, email: &str, password: &str) -> Result<AccountRef, RemoteError>;

    /// Ask the backend to dispatch a verification code to the account's
    /// email address. Safe to call repeatedly (resend).
    async fn request_email_verification(
        &self,
        account: &AccountRef,
        strategy: &str,
    ) -> Result<(), RemoteError>;

    /// Submit a verification code. The backend is authoritative on code
    /// correctness and expiry.
    async fn confirm_verification(
        &self,
        account: &AccountRef,
        code: &str,
    ) -> Result<ConfirmOutcome, RemoteError>;

    /// Activate a session returned by either auth path.
    async fn activate_session(&self, session: &SessionRef) -> Result<(), RemoteError>;
}
