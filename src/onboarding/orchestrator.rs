//! Orchestrator — drives credential collection, remote account creation,
//! and the verification protocol for one onboarding attempt.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, RemoteError, Result};
use crate::identity::{AccountRef, IdentityBackend};
use crate::inflight::InFlight;
use crate::session::SessionGate;

use super::state::{OnboardingPhase, OnboardingState};
use super::validation::{Credentials, ValidationReport, validate};

/// Result of submitting a verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The backend completed the sign-up; a session is now active and the
    /// router will navigate away from onboarding.
    Completed,
    /// The backend reported a status other than "complete"; the attempt
    /// stays in `PendingVerification` with no error surfaced.
    StillPending,
}

/// Drives one onboarding attempt from credential intake to an active
/// session.
///
/// Owns the attempt's state exclusively for one screen lifetime. All remote
/// calls are serialized through the shared in-flight flag; every failure
/// rolls the state machine back one step and releases the flag.
pub struct Orchestrator {
    backend: Arc<dyn IdentityBackend>,
    gate: SessionGate,
    in_flight: InFlight,
    config: AuthConfig,
    state: Arc<RwLock<OnboardingState>>,
    /// Account reference from a successful creation, needed for the
    /// verification calls.
    account: RwLock<Option<AccountRef>>,
    /// Credentials retained for potential resubmission, never displayed.
    credentials: RwLock<Option<Credentials>>,
    attempt_id: Uuid,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        gate: SessionGate,
        in_flight: InFlight,
        config: AuthConfig,
    ) -> Self {
        Self {
            backend,
            gate,
            in_flight,
            config,
            state: Arc::new(RwLock::new(OnboardingState::default())),
            account: RwLock::new(None),
            credentials: RwLock::new(None),
            attempt_id: Uuid::new_v4(),
        }
    }

    /// The shared in-flight flag, for wiring the social bridge to the same
    /// serialization point.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Current phase of the attempt.
    pub async fn phase(&self) -> OnboardingPhase {
        self.state.read().await.phase
    }

    /// Snapshot of the attempt state, for rendering.
    pub async fn state(&self) -> OnboardingState {
        self.state.read().await.clone()
    }

    /// Validate credentials and consent without side effects. Recomputed on
    /// every field change by the screen.
    pub fn validate(&self, credentials: &Credentials, consent: bool) -> ValidationReport {
        validate(credentials, consent, &self.config)
    }

    /// Submit credentials: create the account remotely, then request that a
    /// verification code be dispatched.
    ///
    /// Invalid input is rejected before any remote call. Account creation
    /// and code dispatch are one atomic intent: if dispatch fails after
    /// creation succeeded, the attempt still falls back to `Idle` with the
    /// error surfaced rather than landing in a silent partial state.
    pub async fn submit_credentials(&self, credentials: Credentials, consent: bool) -> Result<()> {
        let report = self.validate(&credentials, consent);
        if !report.fields_ok() {
            return Err(AuthError::Validation(report));
        }
        if report.consent_missing {
            return Err(AuthError::ConsentRequired);
        }

        let _guard = self.in_flight.try_begin().ok_or(AuthError::Busy)?;

        {
            let mut state = self.state.write().await;
            if state.phase != OnboardingPhase::Idle {
                return Err(AuthError::InvalidPhase {
                    phase: state.phase.to_string(),
                    action: "submit credentials",
                });
            }
            state.transition_to(OnboardingPhase::Submitting).map_err(|_| {
                AuthError::InvalidPhase {
                    phase: state.phase.to_string(),
                    action: "submit credentials",
                }
            })?;
        }

        let email = credentials.email.trim().to_string();
        match self.create_and_dispatch(&email, &credentials).await {
            Ok(account) => {
                *self.account.write().await = Some(account);
                *self.credentials.write().await = Some(credentials);
                let mut state = self.state.write().await;
                match state.code_dispatched(&email) {
                    Ok(()) => {
                        tracing::info!(
                            attempt = %self.attempt_id,
                            phase = %state.phase,
                            "Verification code dispatched"
                        );
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!(attempt = %self.attempt_id, "{e}");
                        state.fail_back();
                        Err(RemoteError::Backend { message: None }.into())
                    }
                }
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.fail_back();
                tracing::warn!(
                    attempt = %self.attempt_id,
                    error = %e,
                    "Sign-up submission failed"
                );
                Err(e.into())
            }
        }
    }

    /// The atomic create-then-dispatch intent behind `submit_credentials`.
    async fn create_and_dispatch(
        &self,
        email: &str,
        credentials: &Credentials,
    ) -> std::result::Result<AccountRef, RemoteError> {
        use secrecy::ExposeSecret;

        let account = self
            .backend
            .create_account(email, credentials.password.expose_secret())
            .await?;
        self.backend
            .request_email_verification(&account, &self.config.verification_strategy)
            .await?;
        Ok(account)
    }

    /// Submit the verification code the user received by email.
    ///
    /// The backend is authoritative on code correctness and expiry; the only
    /// client-side precondition is a non-empty code. A backend status other
    /// than "complete" is a non-fatal no-op that stays in
    /// `PendingVerification`.
    pub async fn submit_verification_code(&self, code: &str) -> Result<VerifyOutcome> {
        if code.trim().is_empty() {
            return Err(AuthError::CodeRequired);
        }

        let _guard = self.in_flight.try_begin().ok_or(AuthError::Busy)?;

        let account = {
            let mut state = self.state.write().await;
            if state.phase != OnboardingPhase::PendingVerification {
                return Err(AuthError::InvalidPhase {
                    phase: state.phase.to_string(),
                    action: "submit a verification code",
                });
            }
            state.transition_to(OnboardingPhase::Verifying).map_err(|_| {
                AuthError::InvalidPhase {
                    phase: state.phase.to_string(),
                    action: "submit a verification code",
                }
            })?;
            if let Some(verification) = state.verification.as_mut() {
                verification.submitted_code = code.to_string();
            }
            self.account.read().await.clone()
        };
        let Some(account) = account else {
            // No account ref can only mean the attempt never reached
            // PendingVerification; roll back and reject.
            let mut state = self.state.write().await;
            state.fail_back();
            return Err(AuthError::InvalidPhase {
                phase: state.phase.to_string(),
                action: "submit a verification code",
            });
        };

        match self.backend.confirm_verification(&account, code).await {
            Ok(outcome) if outcome.status.is_complete() => match outcome.session {
                Some(session) => {
                    if let Err(e) = self.gate.activate(self.backend.as_ref(), &session).await {
                        let mut state = self.state.write().await;
                        state.fail_back();
                        tracing::warn!(
                            attempt = %self.attempt_id,
                            error = %e,
                            "Session activation failed"
                        );
                        return Err(e.into());
                    }
                    {
                        let mut state = self.state.write().await;
                        if let Err(e) = state.transition_to(OnboardingPhase::Complete) {
                            tracing::warn!(attempt = %self.attempt_id, "{e}");
                        }
                    }
                    // The attempt is done; drop everything sensitive.
                    *self.credentials.write().await = None;
                    *self.account.write().await = None;
                    tracing::info!(attempt = %self.attempt_id, "Onboarding complete");
                    Ok(VerifyOutcome::Completed)
                }
                None => {
                    // Complete without a session reference: nothing to
                    // activate, so stay put rather than invent a session.
                    let mut state = self.state.write().await;
                    state.fail_back();
                    tracing::warn!(
                        attempt = %self.attempt_id,
                        "Backend reported complete without a session reference"
                    );
                    Ok(VerifyOutcome::StillPending)
                }
            },
            Ok(outcome) => {
                let mut state = self.state.write().await;
                state.fail_back();
                tracing::info!(
                    attempt = %self.attempt_id,
                    status = ?outcome.status,
                    "Verification not complete; staying in pending_verification"
                );
                Ok(VerifyOutcome::StillPending)
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.fail_back();
                tracing::warn!(
                    attempt = %self.attempt_id,
                    error = %e,
                    "Verification attempt failed"
                );
                Err(e.into())
            }
        }
    }

    /// Ask the backend to dispatch a fresh verification code. Permitted any
    /// time the attempt is in `PendingVerification`; a failure surfaces an
    /// error but changes no state.
    pub async fn resend_verification_code(&self) -> Result<()> {
        let _guard = self.in_flight.try_begin().ok_or(AuthError::Busy)?;

        let account = {
            let state = self.state.read().await;
            if state.phase != OnboardingPhase::PendingVerification {
                return Err(AuthError::InvalidPhase {
                    phase: state.phase.to_string(),
                    action: "resend a verification code",
                });
            }
            self.account.read().await.clone()
        };
        let Some(account) = account else {
            return Err(AuthError::InvalidPhase {
                phase: OnboardingPhase::PendingVerification.to_string(),
                action: "resend a verification code",
            });
        };

        self.backend
            .request_email_verification(&account, &self.config.verification_strategy)
            .await
            .inspect_err(|e| {
                tracing::warn!(attempt = %self.attempt_id, error = %e, "Resend failed");
            })?;

        let mut state = self.state.write().await;
        if let Some(verification) = state.verification.as_mut() {
            verification.pending_code = true;
            verification.code_sent_at = chrono::Utc::now();
        }
        tracing::info!(attempt = %self.attempt_id, "Verification code re-dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::identity::{ConfirmOutcome, SessionRef, VerificationStatus};
    use crate::onboarding::validation::FieldError;

    /// Scriptable identity backend with call counters.
    struct MockBackend {
        create_calls: AtomicUsize,
        dispatch_calls: AtomicUsize,
        confirm_calls: AtomicUsize,
        activated: Mutex<Vec<String>>,
        fail_create: Mutex<Option<String>>,
        fail_dispatch: Mutex<Option<String>>,
        fail_confirm: Mutex<Option<String>>,
        confirm_status: Mutex<String>,
        confirm_session: Mutex<Option<String>>,
        /// When set, `create_account` blocks until notified.
        hold_create: Mutex<Option<Arc<Notify>>>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                create_calls: AtomicUsize::new(0),
                dispatch_calls: AtomicUsize::new(0),
                confirm_calls: AtomicUsize::new(0),
                activated: Mutex::new(Vec::new()),
                fail_create: Mutex::new(None),
                fail_dispatch: Mutex::new(None),
                fail_confirm: Mutex::new(None),
                confirm_status: Mutex::new("complete".to_string()),
                confirm_session: Mutex::new(Some("sess_1".to_string())),
                hold_create: Mutex::new(None),
            }
        }

        fn activated(&self) -> Vec<String> {
            self.activated.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IdentityBackend for MockBackend {
        async fn create_account(
            &self,
            _email: &str,
            _password: &str,
        ) -> std::result::Result<AccountRef, RemoteError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let hold = self.hold_create.lock().unwrap().clone();
            if let Some(hold) = hold {
                hold.notified().await;
            }
            if let Some(message) = self.fail_create.lock().unwrap().clone() {
                return Err(RemoteError::backend(message));
            }
            Ok(AccountRef("acct_1".to_string()))
        }

        async fn request_email_verification(
            &self,
            _account: &AccountRef,
            _strategy: &str,
        ) -> std::result::Result<(), RemoteError> {
            self.dispatch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.fail_dispatch.lock().unwrap().clone() {
                return Err(RemoteError::backend(message));
            }
            Ok(())
        }

        async fn confirm_verification(
            &self,
            _account: &AccountRef,
            _code: &str,
        ) -> std::result::Result<ConfirmOutcome, RemoteError> {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.fail_confirm.lock().unwrap().clone() {
                return Err(RemoteError::backend(message));
            }
            Ok(ConfirmOutcome {
                status: VerificationStatus::parse(&self.confirm_status.lock().unwrap()),
                session: self.confirm_session.lock().unwrap().clone().map(SessionRef),
            })
        }

        async fn activate_session(
            &self,
            session: &SessionRef,
        ) -> std::result::Result<(), RemoteError> {
            self.activated.lock().unwrap().push(session.0.clone());
            Ok(())
        }
    }

    fn setup() -> (Arc<MockBackend>, SessionGate, Orchestrator) {
        let backend = Arc::new(MockBackend::new());
        let gate = SessionGate::new();
        let orchestrator = Orchestrator::new(
            backend.clone(),
            gate.clone(),
            InFlight::new(),
            AuthConfig::default(),
        );
        (backend, gate, orchestrator)
    }

    fn good_credentials() -> Credentials {
        Credentials::new("a@b.com", "Abcdef12")
    }

    async fn reach_pending(orchestrator: &Orchestrator) {
        orchestrator
            .submit_credentials(good_credentials(), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_input_makes_no_remote_call() {
        let (backend, _gate, orchestrator) = setup();
        let err = orchestrator
            .submit_credentials(Credentials::new("bad", "short"), true)
            .await
            .unwrap_err();

        let report = err.validation_report().unwrap();
        assert_eq!(report.email, Some(FieldError::InvalidFormat));
        assert_eq!(report.password, Some(FieldError::TooShort));
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.phase().await, OnboardingPhase::Idle);
    }

    #[tokio::test]
    async fn missing_consent_blocks_before_any_remote_call() {
        let (backend, _gate, orchestrator) = setup();
        let err = orchestrator
            .submit_credentials(good_credentials(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ConsentRequired));
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_submission_enters_pending_verification() {
        let (backend, _gate, orchestrator) = setup();
        reach_pending(&orchestrator).await;

        let state = orchestrator.state().await;
        assert_eq!(state.phase, OnboardingPhase::PendingVerification);
        assert_eq!(state.pending_email.as_deref(), Some("a@b.com"));
        assert!(state.invariants_hold());
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.dispatch_calls.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.in_flight().is_set());
    }

    #[tokio::test]
    async fn submitted_email_is_trimmed() {
        let (_backend, _gate, orchestrator) = setup();
        orchestrator
            .submit_credentials(Credentials::new("  a@b.com  ", "Abcdef12"), true)
            .await
            .unwrap();
        let state = orchestrator.state().await;
        assert_eq!(state.pending_email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn failed_account_creation_surfaces_the_backend_message() {
        let (backend, _gate, orchestrator) = setup();
        *backend.fail_create.lock().unwrap() = Some("That email address is taken.".into());

        let err = orchestrator
            .submit_credentials(good_credentials(), true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "That email address is taken.");
        assert_eq!(orchestrator.phase().await, OnboardingPhase::Idle);
        assert_eq!(backend.dispatch_calls.load(Ordering::SeqCst), 0);
        assert!(!orchestrator.in_flight().is_set());
    }

    #[tokio::test]
    async fn dispatch_failure_after_creation_falls_back_to_idle() {
        let (backend, _gate, orchestrator) = setup();
        *backend.fail_dispatch.lock().unwrap() = Some("Rate limited.".into());

        let err = orchestrator
            .submit_credentials(good_credentials(), true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Rate limited.");
        // No silent partial state: creation succeeded, but the attempt
        // still landed back in Idle.
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
        let state = orchestrator.state().await;
        assert_eq!(state.phase, OnboardingPhase::Idle);
        assert!(state.verification.is_none());
        assert!(state.invariants_hold());
    }

    #[tokio::test]
    async fn second_trigger_while_in_flight_is_rejected_without_a_remote_call() {
        let (backend, _gate, orchestrator) = setup();
        let hold = Arc::new(Notify::new());
        *backend.hold_create.lock().unwrap() = Some(hold.clone());

        let orchestrator = Arc::new(orchestrator);
        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.submit_credentials(good_credentials(), true).await
            })
        };
        // Let the first call reach the backend and park there
        tokio::task::yield_now().await;
        while backend.create_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let err = orchestrator
            .submit_credentials(good_credentials(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Busy));
        let err = orchestrator.submit_verification_code("123456").await.unwrap_err();
        assert!(matches!(err, AuthError::Busy));
        let err = orchestrator.resend_verification_code().await.unwrap_err();
        assert!(matches!(err, AuthError::Busy));
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.confirm_calls.load(Ordering::SeqCst), 0);

        hold.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(orchestrator.phase().await, OnboardingPhase::PendingVerification);
    }

    #[tokio::test]
    async fn empty_code_is_rejected_without_a_remote_call() {
        let (backend, _gate, orchestrator) = setup();
        reach_pending(&orchestrator).await;

        for code in ["", "   "] {
            let err = orchestrator.submit_verification_code(code).await.unwrap_err();
            assert!(matches!(err, AuthError::CodeRequired));
        }
        assert_eq!(backend.confirm_calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.phase().await, OnboardingPhase::PendingVerification);
    }

    #[tokio::test]
    async fn code_submission_requires_pending_verification() {
        let (backend, _gate, orchestrator) = setup();
        let err = orchestrator.submit_verification_code("123456").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidPhase { .. }));
        assert_eq!(backend.confirm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn complete_status_activates_exactly_the_returned_session() {
        let (backend, gate, orchestrator) = setup();
        reach_pending(&orchestrator).await;

        let outcome = orchestrator.submit_verification_code("123456").await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Completed);
        assert_eq!(orchestrator.phase().await, OnboardingPhase::Complete);
        assert_eq!(backend.activated(), vec!["sess_1".to_string()]);
        assert!(gate.signal().is_active);
        assert!(orchestrator.state().await.invariants_hold());
    }

    #[tokio::test]
    async fn non_complete_status_is_a_silent_no_op() {
        let (backend, gate, orchestrator) = setup();
        *backend.confirm_status.lock().unwrap() = "missing_requirements".to_string();
        reach_pending(&orchestrator).await;

        let outcome = orchestrator.submit_verification_code("123456").await.unwrap();
        assert_eq!(outcome, VerifyOutcome::StillPending);
        assert_eq!(orchestrator.phase().await, OnboardingPhase::PendingVerification);
        assert!(backend.activated().is_empty());
        assert!(!gate.signal().is_active);
        assert!(orchestrator.state().await.invariants_hold());
    }

    #[tokio::test]
    async fn complete_without_a_session_stays_pending() {
        let (backend, _gate, orchestrator) = setup();
        *backend.confirm_session.lock().unwrap() = None;
        reach_pending(&orchestrator).await;

        let outcome = orchestrator.submit_verification_code("123456").await.unwrap();
        assert_eq!(outcome, VerifyOutcome::StillPending);
        assert_eq!(orchestrator.phase().await, OnboardingPhase::PendingVerification);
        assert!(backend.activated().is_empty());
    }

    #[tokio::test]
    async fn rejected_code_rolls_back_with_the_backend_message() {
        let (backend, _gate, orchestrator) = setup();
        *backend.fail_confirm.lock().unwrap() = Some("Incorrect code.".into());
        reach_pending(&orchestrator).await;

        let err = orchestrator.submit_verification_code("000000").await.unwrap_err();
        assert_eq!(err.to_string(), "Incorrect code.");
        let state = orchestrator.state().await;
        assert_eq!(state.phase, OnboardingPhase::PendingVerification);
        assert_eq!(
            state.verification.as_ref().unwrap().submitted_code,
            "000000"
        );
        assert!(!orchestrator.in_flight().is_set());

        // The attempt is still live: a corrected code completes it
        *backend.fail_confirm.lock().unwrap() = None;
        let outcome = orchestrator.submit_verification_code("123456").await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Completed);
    }

    #[tokio::test]
    async fn resend_is_permitted_while_pending_and_idempotent() {
        let (backend, _gate, orchestrator) = setup();
        reach_pending(&orchestrator).await;
        assert_eq!(backend.dispatch_calls.load(Ordering::SeqCst), 1);

        orchestrator.resend_verification_code().await.unwrap();
        orchestrator.resend_verification_code().await.unwrap();
        assert_eq!(backend.dispatch_calls.load(Ordering::SeqCst), 3);
        assert_eq!(orchestrator.phase().await, OnboardingPhase::PendingVerification);
    }

    #[tokio::test]
    async fn failed_resend_changes_no_state() {
        let (backend, _gate, orchestrator) = setup();
        reach_pending(&orchestrator).await;
        let before = orchestrator.state().await;

        *backend.fail_dispatch.lock().unwrap() = Some("Rate limited.".into());
        let err = orchestrator.resend_verification_code().await.unwrap_err();
        assert_eq!(err.to_string(), "Rate limited.");

        let after = orchestrator.state().await;
        assert_eq!(after.phase, before.phase);
        assert_eq!(after.pending_email, before.pending_email);
        assert!(!orchestrator.in_flight().is_set());
    }

    #[tokio::test]
    async fn resend_outside_pending_verification_is_rejected() {
        let (backend, _gate, orchestrator) = setup();
        let err = orchestrator.resend_verification_code().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidPhase { .. }));
        assert_eq!(backend.dispatch_calls.load(Ordering::SeqCst), 0);
    }
}
