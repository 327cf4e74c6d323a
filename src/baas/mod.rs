//! # Backend-as-a-Service Seam
//!
//! The hosted backend is an external collaborator: identity (magic links,
//! OAuth, passwords, sessions) and a keyed profile store (get, insert and
//! update, each filtered on subscriber and tenant). Everything in the
//! governance layer talks to it through [`BaasClient`] handles produced by
//! a [`BaasConnector`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::oauth::OAuthRequest;
use crate::auth::profile::{Profile, ProfileUpdate};
use crate::control_plane::tenant::IsolationLevel;

pub use memory::InMemoryBaas;

/// Header carrying the tenant id under `rls` isolation
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";
/// Header carrying the tenant domain under `rls` isolation
pub const TENANT_DOMAIN_HEADER: &str = "X-Tenant-Domain";
/// Header carrying the isolation level under `rls` isolation
pub const ISOLATION_LEVEL_HEADER: &str = "X-Isolation-Level";

/// Metadata key holding the tenant claim on a user
pub const TENANT_ID_CLAIM: &str = "tenant_id";
/// Metadata key holding the tenant domain on a user
pub const TENANT_DOMAIN_CLAIM: &str = "tenant_domain";

/// Backend errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BaasError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Result type for backend calls
pub type BaasResult<T> = Result<T, BaasError>;

/// Connection settings for one tenant/isolation-level pair
#[derive(Debug, Clone)]
pub struct TenantBackendConfig {
    pub tenant_id: String,
    pub tenant_domain: String,
    pub isolation: IsolationLevel,
    /// Backend project URL
    pub url: String,
    /// Public (anon) API key
    pub anon_key: SecretString,
    /// Privileged key, when configured
    pub service_role_key: Option<SecretString>,
    /// Per-tenant schema under `schema` isolation
    pub schema: Option<String>,
    /// Headers attached to every outgoing request
    pub headers: BTreeMap<String, String>,
}

/// Authenticated backend user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    /// Free-form metadata stamped at signup
    #[serde(default)]
    pub user_metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Backend session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    /// Tenant id embedded in the user metadata, if any
    pub fn tenant_claim(&self) -> Option<&str> {
        self.user
            .user_metadata
            .get(TENANT_ID_CLAIM)
            .and_then(serde_json::Value::as_str)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Options for a magic-link challenge
#[derive(Debug, Clone, PartialEq)]
pub struct MagicLinkOptions {
    /// Allow the backend to provision an unknown email
    pub should_create_user: bool,
    /// Where the link lands
    pub email_redirect_to: String,
    /// Metadata persisted on a newly created user
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Profile lookup filter; both keys must match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFilter {
    pub subscriber_id: Uuid,
    pub tenant_id: String,
}

/// Tenant-scoped connection to the backend
#[async_trait]
pub trait BaasClient: Send + Sync {
    /// Send a passwordless sign-in link
    async fn send_magic_link(&self, email: &str, options: MagicLinkOptions) -> BaasResult<()>;

    /// Build the provider authorization URL
    async fn oauth_authorize_url(&self, request: &OAuthRequest) -> BaasResult<String>;

    /// Password sign-in; becomes the ambient session
    async fn sign_in_with_password(&self, email: &str, password: &str) -> BaasResult<Session>;

    /// Drop the ambient session
    async fn sign_out(&self) -> BaasResult<()>;

    /// Ambient session, if any
    async fn get_session(&self) -> BaasResult<Option<Session>>;

    /// Fetch a profile matching the filter
    async fn fetch_profile(&self, filter: &ProfileFilter) -> BaasResult<Option<Profile>>;

    /// Insert a profile row
    async fn insert_profile(&self, profile: &Profile) -> BaasResult<Profile>;

    /// Update the profile matching the filter; `None` when no row matches
    async fn update_profile(
        &self,
        filter: &ProfileFilter,
        update: &ProfileUpdate,
    ) -> BaasResult<Option<Profile>>;
}

/// Builds clients from resolved tenant configuration
pub trait BaasConnector: Send + Sync {
    fn connect(&self, config: &TenantBackendConfig) -> BaasResult<Arc<dyn BaasClient>>;
}
