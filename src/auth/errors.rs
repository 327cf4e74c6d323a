//! # Auth Errors

use thiserror::Error;

use crate::baas::BaasError;
use crate::control_plane::errors::ControlPlaneError;

/// Result type for tenant-scoped auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Subscriber not found")]
    SubscriberNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    NotAuthenticated,

    /// Authenticated, but against another tenant
    #[error("Session belongs to tenant {}, not '{}'", display_claim(.found), .expected)]
    TenantMismatch {
        expected: String,
        found: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream rejected request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

fn display_claim(found: &Option<String>) -> String {
    match found {
        Some(tenant) => format!("'{}'", tenant),
        None => "<none>".to_string(),
    }
}

impl AuthError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidEmail(_) => 400,
            AuthError::RateLimitExceeded(_) => 429,
            AuthError::SubscriberNotFound => 404,
            AuthError::InvalidCredentials => 401,
            AuthError::NotAuthenticated => 401,
            AuthError::TenantMismatch { .. } => 401,
            AuthError::Configuration(_) => 500,
            AuthError::Timeout(_) => 504,
            AuthError::UpstreamUnavailable(_) => 503,
            AuthError::UpstreamRejected { .. } => 502,
            AuthError::Internal(_) => 500,
        }
    }

    /// Whether the caller should be sent back through sign-in
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated | AuthError::TenantMismatch { .. }
        )
    }
}

impl From<ControlPlaneError> for AuthError {
    fn from(err: ControlPlaneError) -> Self {
        match err {
            ControlPlaneError::Configuration { message } => AuthError::Configuration(message),
            ControlPlaneError::TenantMismatch { expected, found } => {
                AuthError::TenantMismatch { expected, found }
            }
            ControlPlaneError::UpstreamUnavailable { message } => {
                AuthError::UpstreamUnavailable(message)
            }
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<BaasError> for AuthError {
    fn from(err: BaasError) -> Self {
        match err {
            BaasError::Unavailable(message) => AuthError::UpstreamUnavailable(message),
            BaasError::UserNotFound => AuthError::SubscriberNotFound,
            BaasError::InvalidCredentials => AuthError::InvalidCredentials,
            BaasError::Rejected { status, message } => {
                AuthError::UpstreamRejected { status, message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_is_not_unauthenticated() {
        let mismatch = AuthError::TenantMismatch {
            expected: "tenant-a".to_string(),
            found: Some("tenant-b".to_string()),
        };
        assert_ne!(mismatch, AuthError::NotAuthenticated);
        assert!(mismatch.requires_reauthentication());
        assert_eq!(
            mismatch.to_string(),
            "Session belongs to tenant 'tenant-b', not 'tenant-a'"
        );

        let unclaimed = AuthError::TenantMismatch {
            expected: "tenant-a".to_string(),
            found: None,
        };
        assert!(unclaimed.to_string().contains("<none>"));
    }

    #[test]
    fn test_conversions() {
        let err: AuthError = ControlPlaneError::config("no valid redirect URL").into();
        assert_eq!(err, AuthError::Configuration("no valid redirect URL".to_string()));
        assert_eq!(err.status_code(), 500);

        let err: AuthError = ControlPlaneError::TenantMismatch {
            expected: "acme".to_string(),
            found: None,
        }
        .into();
        assert!(err.requires_reauthentication());
        assert_ne!(err, AuthError::NotAuthenticated);

        let err: AuthError = BaasError::Unavailable("down".to_string()).into();
        assert_eq!(err.status_code(), 503);

        let err: AuthError = BaasError::UserNotFound.into();
        assert_eq!(err, AuthError::SubscriberNotFound);
        assert!(!err.requires_reauthentication());
    }
}
