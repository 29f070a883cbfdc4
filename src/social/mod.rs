//! Social delegation — provider-hosted login folded into the same session
//! concept as the credential path.
//!
//! One capability shape per provider behind a closed set of tags, resolved
//! at call time. Provider SDK errors are deliberately collapsed to a coarse
//! advisory; only a missing integration is reported distinctly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ProviderError, Result};
use crate::identity::{IdentityBackend, SessionRef};
use crate::inflight::InFlight;
use crate::session::SessionGate;

/// The fixed set of external identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialProvider {
    Google,
    Apple,
}

impl std::fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Google => "google",
            Self::Apple => "apple",
        };
        write!(f, "{s}")
    }
}

/// How a provider-hosted flow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The provider authenticated the user and returned a session reference.
    Completed(SessionRef),
    /// The user backed out, or the flow ended without a session reference.
    /// Not an error; the caller stays on the onboarding screen.
    Cancelled,
}

/// A provider-hosted authentication flow.
///
/// Implementations wrap one provider SDK. Their error surface is not
/// enumerable ahead of time, hence the open `anyhow::Error`.
#[async_trait]
pub trait SocialFlow: Send + Sync {
    async fn start_flow(&self) -> anyhow::Result<FlowOutcome>;
}

/// Hands authentication off to a registered provider and activates the
/// resulting session.
///
/// Serializes against the same in-flight flag as the orchestrator, so a
/// user cannot start two competing auth attempts.
pub struct SocialBridge {
    backend: Arc<dyn IdentityBackend>,
    gate: SessionGate,
    in_flight: InFlight,
    flows: HashMap<SocialProvider, Arc<dyn SocialFlow>>,
}

impl SocialBridge {
    pub fn new(backend: Arc<dyn IdentityBackend>, gate: SessionGate, in_flight: InFlight) -> Self {
        Self {
            backend,
            gate,
            in_flight,
            flows: HashMap::new(),
        }
    }

    /// Register the flow implementation for a provider.
    pub fn register(&mut self, provider: SocialProvider, flow: Arc<dyn SocialFlow>) {
        self.flows.insert(provider, flow);
    }

    /// Whether a provider has a registered integration.
    pub fn is_available(&self, provider: SocialProvider) -> bool {
        self.flows.contains_key(&provider)
    }

    /// Run the provider's flow and activate the session it returns.
    ///
    /// `Ok(None)` means the user cancelled: a silent no-op, no session
    /// activated. Flow failures surface as the coarse `Failed` advisory.
    pub async fn delegate(&self, provider: SocialProvider) -> Result<Option<SessionRef>> {
        let flow = self
            .flows
            .get(&provider)
            .ok_or_else(|| ProviderError::Unavailable {
                provider: provider.to_string(),
            })?;

        let _guard = self.in_flight.try_begin().ok_or(AuthError::Busy)?;

        match flow.start_flow().await {
            Ok(FlowOutcome::Completed(session)) => {
                self.gate.activate(self.backend.as_ref(), &session).await?;
                tracing::info!(provider = %provider, "Delegated sign-in complete");
                Ok(Some(session))
            }
            Ok(FlowOutcome::Cancelled) => {
                tracing::info!(provider = %provider, "Delegated sign-in cancelled");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Delegated sign-in failed");
                Err(ProviderError::Failed {
                    provider: provider.to_string(),
                }
                .into())
            }
        }
    }
}
