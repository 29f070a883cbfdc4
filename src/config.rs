//! Configuration types.

/// Auth core configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Minimum password length accepted at submission.
    pub min_password_length: usize,
    /// Verification strategy requested from the identity backend.
    pub verification_strategy: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_length: 8,
            verification_strategy: "email_code".to_string(),
        }
    }
}
