//! agency-governance - Tenant isolation and usage-quota governance
//!
//! Per-tenant backend client handles, tenant-bound authentication, and
//! tier-based monthly quotas for metered subscriber actions.

pub mod auth;
pub mod baas;
pub mod config;
pub mod config_validator;
pub mod control_plane;

pub use auth::{AuthError, AuthResult, TenantAuthService};
pub use config::GovernanceConfig;
pub use control_plane::{
    ControlPlaneError, ControlPlaneResult, QuotaDecision, QuotaEnforcer, TenantClientRegistry,
    TierCatalog,
};
