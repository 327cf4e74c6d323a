//! # Control Plane Errors
//!
//! Error types for tenant isolation and quota governance.

use serde::Serialize;
use std::fmt;

/// Control plane error types
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ControlPlaneError {
    /// Operator-facing misconfiguration (unsupported isolation level,
    /// no valid redirect URL, no enabled auth provider, bad config file)
    Configuration {
        message: String,
    },

    /// Session tenant claim does not match the requesting tenant
    TenantMismatch {
        expected: String,
        found: Option<String>,
    },

    /// Metered action denied
    QuotaExceeded {
        subscriber_id: String,
        tier: String,
        consumed: u64,
        limit: u64,
    },

    /// External store or backend could not be reached
    UpstreamUnavailable {
        message: String,
    },

    /// Tenant not found in the directory
    TenantNotFound {
        tenant: String,
    },

    /// Invalid tenant identifier
    InvalidTenantName {
        name: String,
        reason: String,
    },

    /// Tenant domain already onboarded
    TenantDomainExists {
        domain: String,
    },

    /// Subscriber carries a tier id outside the catalog
    UnknownTier {
        tenant_id: String,
        subscriber_id: String,
        tier: String,
    },

    /// Usage record failed integrity checks
    CorruptUsageRecord {
        tenant_id: String,
        subscriber_id: String,
        tier: String,
        reason: String,
    },

    /// Internal error
    Internal {
        message: String,
    },
}

impl ControlPlaneError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for an upstream outage
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }
}

impl fmt::Display for ControlPlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::TenantMismatch { expected, found } => match found {
                Some(found) => write!(
                    f,
                    "Session belongs to tenant '{}', not '{}'",
                    found, expected
                ),
                None => write!(f, "Session carries no tenant claim (expected '{}')", expected),
            },
            Self::QuotaExceeded {
                subscriber_id,
                tier,
                consumed,
                limit,
            } => {
                write!(
                    f,
                    "Monthly quota exceeded for {} on tier {}: {} / {} (0 remaining)",
                    subscriber_id, tier, consumed, limit
                )
            }
            Self::UpstreamUnavailable { message } => {
                write!(f, "Upstream unavailable: {}", message)
            }
            Self::TenantNotFound { tenant } => {
                write!(f, "Tenant not found: {}", tenant)
            }
            Self::InvalidTenantName { name, reason } => {
                write!(f, "Invalid tenant id '{}': {}", name, reason)
            }
            Self::TenantDomainExists { domain } => {
                write!(f, "Tenant domain already exists: {}", domain)
            }
            Self::UnknownTier {
                tenant_id,
                subscriber_id,
                tier,
            } => {
                write!(
                    f,
                    "Unknown tier '{}' for subscriber {} of tenant {}",
                    tier, subscriber_id, tenant_id
                )
            }
            Self::CorruptUsageRecord {
                tenant_id,
                subscriber_id,
                tier,
                reason,
            } => {
                write!(
                    f,
                    "Corrupt usage record for subscriber {} of tenant {} (tier {}): {}",
                    subscriber_id, tenant_id, tier, reason
                )
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for ControlPlaneError {}

/// Result type for control plane operations
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

impl ControlPlaneError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration { .. } => 500,
            Self::TenantMismatch { .. } => 401,
            Self::QuotaExceeded { .. } => 429,
            Self::UpstreamUnavailable { .. } => 503,
            Self::TenantNotFound { .. } => 404,
            Self::InvalidTenantName { .. } => 400,
            Self::TenantDomainExists { .. } => 409,
            Self::UnknownTier { .. } => 500,
            Self::CorruptUsageRecord { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::TenantMismatch { .. } => "TENANT_MISMATCH",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            Self::TenantNotFound { .. } => "TENANT_NOT_FOUND",
            Self::InvalidTenantName { .. } => "INVALID_TENANT_NAME",
            Self::TenantDomainExists { .. } => "TENANT_DOMAIN_EXISTS",
            Self::UnknownTier { .. } => "UNKNOWN_TIER",
            Self::CorruptUsageRecord { .. } => "CORRUPT_USAGE_RECORD",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether the error is meant for operators rather than subscribers
    pub fn is_operator_facing(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::UnknownTier { .. }
                | Self::CorruptUsageRecord { .. }
                | Self::Internal { .. }
        )
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<ControlPlaneError> for ErrorResponse {
    fn from(err: ControlPlaneError) -> Self {
        // Operator-facing failures stay generic towards subscribers
        let (error, details) = if err.is_operator_facing() {
            ("Service misconfigured, contact support".to_string(), None)
        } else {
            (err.to_string(), serde_json::to_value(&err).ok())
        };

        Self {
            error,
            code: err.error_code(),
            status: err.status_code(),
            details,
        }
    }
}
