//! Authentication configuration
//!
//! Tokens are HS256 JWTs signed with a shared secret by the service that
//! issues sessions. This service only verifies them.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Reject WebSocket connections without a valid token
    #[serde(default = "default_require_auth")]
    pub require_auth: bool,

    /// Shared HS256 signing secret
    pub jwt_secret: Option<SecretString>,

    /// Expected `iss` claim, if any
    pub jwt_issuer: Option<String>,

    /// Expected `aud` claim, if any
    pub jwt_audience: Option<String>,
}

impl AuthConfig {
    /// Validate authentication configuration
    ///
    /// A secret is required whenever auth is enforced. In production it must
    /// also be at least 32 bytes.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let secret_len = self
            .jwt_secret
            .as_ref()
            .map(|s| s.expose_secret().len())
            .unwrap_or(0);

        if self.require_auth && secret_len == 0 {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        if *environment == Environment::Production && secret_len > 0 && secret_len < 32 {
            return Err(ValidationError::WeakJwtSecret);
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_auth: default_require_auth(),
            jwt_secret: None,
            jwt_issuer: None,
            jwt_audience: None,
        }
    }
}

fn default_require_auth() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: Some(SecretString::new(secret.to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn test_auth_required_by_default() {
        assert!(AuthConfig::default().require_auth);
    }

    #[test]
    fn test_validation_missing_secret() {
        let result = AuthConfig::default().validate(&Environment::Development);
        assert_eq!(
            result,
            Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"))
        );
    }

    #[test]
    fn test_secret_optional_when_auth_disabled() {
        let config = AuthConfig {
            require_auth: false,
            ..Default::default()
        };
        assert!(config.validate(&Environment::Production).is_ok());
    }

    #[test]
    fn test_short_secret_allowed_in_development() {
        assert!(with_secret("dev").validate(&Environment::Development).is_ok());
    }

    #[test]
    fn test_short_secret_rejected_in_production() {
        assert_eq!(
            with_secret("dev").validate(&Environment::Production),
            Err(ValidationError::WeakJwtSecret)
        );
        let long = "x".repeat(32);
        assert!(with_secret(&long).validate(&Environment::Production).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let rendered = format!("{:?}", with_secret("super-secret-value"));
        assert!(!rendered.contains("super-secret-value"));
    }
}
