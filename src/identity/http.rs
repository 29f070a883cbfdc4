//! HTTP adapter for the identity backend.
//!
//! Thin JSON client over the identity service's REST surface. The service
//! owns all auth semantics; this adapter only maps requests and surfaces
//! backend-provided error messages verbatim.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use async_trait::async_trait;

use super::{AccountRef, ConfirmOutcome, IdentityBackend, SessionRef, VerificationStatus};
use crate::error::RemoteError;

/// Identity backend over HTTP.
pub struct HttpIdentityBackend {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SignUpResponse {
    id: String,
}

#[derive(Deserialize)]
struct AttemptResponse {
    status: String,
    created_session_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpIdentityBackend {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Build a backend from `AUTHFLOW_IDENTITY_URL` and
    /// `AUTHFLOW_IDENTITY_KEY`. Returns `None` if the URL is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("AUTHFLOW_IDENTITY_URL").ok()?;
        let api_key = std::env::var("AUTHFLOW_IDENTITY_KEY").unwrap_or_default();
        Some(Self::new(base_url, SecretString::from(api_key)))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    /// POST a JSON body and decode the response, mapping transport errors to
    /// `Network` and non-2xx responses to `Backend` with the body's message.
    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Backend {
                message: extract_message(&text),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))
    }
}

/// Pull a human-readable message out of an error body, if there is one.
fn extract_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .or_else(|| parsed.errors.into_iter().next().map(|e| e.message))
}

#[async_trait]
impl IdentityBackend for HttpIdentityBackend {
    async fn create_account(&self, email: &str, password: &str) -> Result<AccountRef, RemoteError> {
        let body = serde_json::json!({
            "email_address": email,
            "password": password,
        });
        let response: SignUpResponse = self.post("sign_ups", &body).await?;
        Ok(AccountRef(response.id))
    }

    async fn request_email_verification(
        &self,
        account: &AccountRef,
        strategy: &str,
    ) -> Result<(), RemoteError> {
        let body = serde_json::json!({ "strategy": strategy });
        let path = format!("sign_ups/{}/prepare_verification", account.0);
        let _: serde_json::Value = self.post(&path, &body).await?;
        Ok(())
    }

    async fn confirm_verification(
        &self,
        account: &AccountRef,
        code: &str,
    ) -> Result<ConfirmOutcome, RemoteError> {
        let body = serde_json::json!({ "code": code });
        let path = format!("sign_ups/{}/attempt_verification", account.0);
        let response: AttemptResponse = self.post(&path, &body).await?;
        Ok(ConfirmOutcome {
            status: VerificationStatus::parse(&response.status),
            session: response.created_session_id.map(SessionRef),
        })
    }

    async fn activate_session(&self, session: &SessionRef) -> Result<(), RemoteError> {
        let path = format!("sessions/{}/activate", session.0);
        let _: serde_json::Value = self.post(&path, &serde_json::json!({})).await?;
        Ok(())
    }
}
