//! Sign-up state machine — tracks which phase an onboarding attempt is in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The phases of a sign-up attempt.
///
/// Progresses Idle → Submitting → PendingVerification → Verifying →
/// Complete. The two remote phases fail back to their predecessor:
/// Submitting → Idle and Verifying → PendingVerification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingPhase {
    Idle,
    Submitting,
    PendingVerification,
    Verifying,
    Complete,
}

impl OnboardingPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingPhase) -> bool {
        use OnboardingPhase::*;
        matches!(
            (self, target),
            (Idle, Submitting)
                | (Submitting, PendingVerification)
                | (Submitting, Idle)
                | (PendingVerification, Verifying)
                | (Verifying, Complete)
                | (Verifying, PendingVerification)
        )
    }

    /// Whether this phase is terminal (a session has been created).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// The stable phase a failed remote call falls back to, if this phase
    /// has one.
    pub fn fallback(&self) -> Option<OnboardingPhase> {
        match self {
            Self::Submitting => Some(Self::Idle),
            Self::Verifying => Some(Self::PendingVerification),
            _ => None,
        }
    }

    /// Whether verification state must exist in this phase.
    pub fn holds_verification(&self) -> bool {
        matches!(self, Self::PendingVerification | Self::Verifying)
    }
}

impl Default for OnboardingPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for OnboardingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::PendingVerification => "pending_verification",
            Self::Verifying => "verifying",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// State of the email verification step.
///
/// Exists exactly while the phase is `PendingVerification` or `Verifying`;
/// dropped on completion or abandonment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationState {
    /// A code has been dispatched and not yet confirmed.
    pub pending_code: bool,
    /// The most recently submitted code.
    pub submitted_code: String,
    /// When the latest code was dispatched.
    pub code_sent_at: DateTime<Utc>,
}

impl VerificationState {
    pub fn new() -> Self {
        Self {
            pending_code: true,
            submitted_code: String::new(),
            code_sent_at: Utc::now(),
        }
    }
}

impl Default for VerificationState {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory state of one onboarding attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnboardingState {
    /// Current phase.
    pub phase: OnboardingPhase,
    /// Email the verification code was sent to, kept for display.
    pub pending_email: Option<String>,
    /// Verification step state, present iff the phase holds verification.
    pub verification: Option<VerificationState>,
}

impl OnboardingState {
    /// Move to `target` if the transition is valid. Verification state is
    /// dropped when leaving the verification phases.
    pub fn transition_to(&mut self, target: OnboardingPhase) -> Result<OnboardingPhase, String> {
        if !self.phase.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.phase, target));
        }
        self.phase = target;
        if !target.holds_verification() {
            self.verification = None;
        }
        Ok(target)
    }

    /// Record a successfully dispatched verification code:
    /// Submitting → PendingVerification with a fresh `VerificationState`.
    pub fn code_dispatched(&mut self, email: &str) -> Result<(), String> {
        self.transition_to(OnboardingPhase::PendingVerification)?;
        self.pending_email = Some(email.to_string());
        self.verification = Some(VerificationState::new());
        Ok(())
    }

    /// Roll back one step after a failed remote call. A no-op in phases
    /// with no fallback.
    pub fn fail_back(&mut self) -> OnboardingPhase {
        if let Some(fallback) = self.phase.fallback() {
            self.phase = fallback;
            if !fallback.holds_verification() {
                self.verification = None;
                self.pending_email = None;
            }
        }
        self.phase
    }

    /// Structural invariant: verification state exists iff the phase is
    /// PendingVerification or Verifying.
    pub fn invariants_hold(&self) -> bool {
        self.verification.is_some() == self.phase.holds_verification()
    }
}
