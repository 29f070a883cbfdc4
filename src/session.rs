//! Session presence signal and the gate that publishes it.
//!
//! Both auth paths terminate in `SessionGate::activate`; the router only
//! ever observes the published `SessionSignal`, never the session itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};

use crate::error::RemoteError;
use crate::identity::{IdentityBackend, SessionRef};

/// The session-presence signal observed by the router.
///
/// `is_loaded` stays false until the initial session probe resolves, so a
/// cold start never flashes the wrong navigation subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSignal {
    pub is_loaded: bool,
    pub is_active: bool,
}

/// An activated session.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub reference: SessionRef,
    pub activated_at: DateTime<Utc>,
}

/// Publishes session presence to the router and holds the active session.
///
/// Cloning shares the underlying channel and session slot.
#[derive(Clone)]
pub struct SessionGate {
    tx: watch::Sender<SessionSignal>,
    active: Arc<RwLock<Option<ActiveSession>>>,
}

impl SessionGate {
    /// A gate in the unresolved cold-start state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionSignal::default());
        Self {
            tx,
            active: Arc::new(RwLock::new(None)),
        }
    }

    /// Subscribe to session-presence changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSignal> {
        self.tx.subscribe()
    }

    /// The current signal value.
    pub fn signal(&self) -> SessionSignal {
        *self.tx.borrow()
    }

    /// Record that the initial session probe resolved with no session.
    pub fn mark_loaded(&self) {
        self.tx.send_replace(SessionSignal {
            is_loaded: true,
            is_active: false,
        });
    }

    /// Activate a session reference returned by either auth path, then
    /// publish presence. Activation failures are the caller's to surface;
    /// the signal is left untouched on failure.
    pub async fn activate(
        &self,
        backend: &dyn IdentityBackend,
        session: &SessionRef,
    ) -> Result<(), RemoteError> {
        backend.activate_session(session).await?;
        *self.active.write().await = Some(ActiveSession {
            reference: session.clone(),
            activated_at: Utc::now(),
        });
        self.tx.send_replace(SessionSignal {
            is_loaded: true,
            is_active: true,
        });
        tracing::info!("Session activated");
        Ok(())
    }

    /// Drop the active session and publish absence. Sign-out itself is
    /// driven externally; this only reflects it into the signal.
    pub async fn clear(&self) {
        *self.active.write().await = None;
        self.tx.send_replace(SessionSignal {
            is_loaded: true,
            is_active: false,
        });
    }

    /// The currently active session, if any.
    pub async fn active_session(&self) -> Option<ActiveSession> {
        self.active.read().await.clone()
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::identity::{AccountRef, ConfirmOutcome};

    struct OkBackend;

    #[async_trait]
    impl IdentityBackend for OkBackend {
        async fn create_account(&self, _: &str, _: &str) -> Result<AccountRef, RemoteError> {
            unreachable!("not used by gate tests")
        }
        async fn request_email_verification(
            &self,
            _: &AccountRef,
            _: &str,
        ) -> Result<(), RemoteError> {
            unreachable!("not used by gate tests")
        }
        async fn confirm_verification(
            &self,
            _: &AccountRef,
            _: &str,
        ) -> Result<ConfirmOutcome, RemoteError> {
            unreachable!("not used by gate tests")
        }
        async fn activate_session(&self, _: &SessionRef) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl IdentityBackend for FailingBackend {
        async fn create_account(&self, _: &str, _: &str) -> Result<AccountRef, RemoteError> {
            unreachable!("not used by gate tests")
        }
        async fn request_email_verification(
            &self,
            _: &AccountRef,
            _: &str,
        ) -> Result<(), RemoteError> {
            unreachable!("not used by gate tests")
        }
        async fn confirm_verification(
            &self,
            _: &AccountRef,
            _: &str,
        ) -> Result<ConfirmOutcome, RemoteError> {
            unreachable!("not used by gate tests")
        }
        async fn activate_session(&self, _: &SessionRef) -> Result<(), RemoteError> {
            Err(RemoteError::Network("connection reset".into()))
        }
    }

    #[test]
    fn starts_unresolved() {
        let gate = SessionGate::new();
        assert_eq!(gate.signal(), SessionSignal::default());
    }

    #[test]
    fn mark_loaded_publishes_absence() {
        let gate = SessionGate::new();
        gate.mark_loaded();
        assert_eq!(
            gate.signal(),
            SessionSignal {
                is_loaded: true,
                is_active: false,
            }
        );
    }

    #[tokio::test]
    async fn activate_publishes_presence_and_stores_the_session() {
        let gate = SessionGate::new();
        gate.activate(&OkBackend, &SessionRef("sess_1".into()))
            .await
            .unwrap();

        assert_eq!(
            gate.signal(),
            SessionSignal {
                is_loaded: true,
                is_active: true,
            }
        );
        let active = gate.active_session().await.unwrap();
        assert_eq!(active.reference, SessionRef("sess_1".into()));
    }

    #[tokio::test]
    async fn failed_activation_leaves_the_signal_untouched() {
        let gate = SessionGate::new();
        gate.mark_loaded();
        let result = gate
            .activate(&FailingBackend, &SessionRef("sess_1".into()))
            .await;
        assert!(result.is_err());
        assert_eq!(
            gate.signal(),
            SessionSignal {
                is_loaded: true,
                is_active: false,
            }
        );
        assert!(gate.active_session().await.is_none());
    }

    #[tokio::test]
    async fn clear_publishes_absence() {
        let gate = SessionGate::new();
        gate.activate(&OkBackend, &SessionRef("sess_1".into()))
            .await
            .unwrap();
        gate.clear().await;
        assert!(!gate.signal().is_active);
        assert!(gate.signal().is_loaded);
        assert!(gate.active_session().await.is_none());
    }
}
