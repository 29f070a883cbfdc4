//! Onboarding — the sign-up/verification flow preceding first use of the
//! main application.
//!
//! The orchestrator collects credentials, drives remote account creation
//! and the verification protocol, and on success activates a session
//! through the gate. At most one remote call is outstanding at a time.

pub mod orchestrator;
pub mod state;
pub mod validation;

pub use orchestrator::{Orchestrator, VerifyOutcome};
pub use state::{OnboardingPhase, OnboardingState, VerificationState};
pub use validation::{Credentials, FieldError, ValidationReport, password_strength, validate};
