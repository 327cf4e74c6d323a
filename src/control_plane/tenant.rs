//! # Tenant Model
//!
//! Core types for tenant isolation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::errors::{ControlPlaneError, ControlPlaneResult};
use crate::auth::oauth::OAuthProvider;

/// Tenant isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    /// Separate backend project and credentials per tenant
    Database,
    /// Shared backend, per-tenant schema at the data layer
    Schema,
    /// Shared backend and credentials, row-level policies keyed on tenant id
    Rls,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        Self::Rls
    }
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Rls => "rls",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = ControlPlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" => Ok(Self::Database),
            "schema" => Ok(Self::Schema),
            "rls" => Ok(Self::Rls),
            other => Err(ControlPlaneError::config(format!(
                "unsupported isolation level '{}'",
                other
            ))),
        }
    }
}

/// Per-tenant authentication settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Public site URL of the tenant
    pub site_url: String,
    /// Redirect URLs accepted after authentication
    #[serde(default)]
    pub allowed_redirect_urls: Vec<String>,
    /// OAuth providers enabled for this tenant
    #[serde(default)]
    pub enabled_providers: Vec<OAuthProvider>,
    /// Name of the secret holding tenant auth credentials (never the secret itself)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

impl AuthSettings {
    /// Default settings for a tenant served at `https://{domain}`
    pub fn for_domain(domain: &str) -> Self {
        Self {
            site_url: format!("https://{}", domain),
            allowed_redirect_urls: Vec::new(),
            enabled_providers: vec![OAuthProvider::Google],
            secret_ref: None,
        }
    }

    /// Resolve the URL users land on after an auth challenge.
    ///
    /// First allowed redirect URL that is an absolute http(s) URL wins,
    /// then `{site_url}/auth/callback`.
    pub fn callback_url(&self) -> ControlPlaneResult<String> {
        if let Some(url) = self
            .allowed_redirect_urls
            .iter()
            .find_map(|candidate| parse_http_url(candidate))
        {
            return Ok(url.to_string());
        }

        parse_http_url(&self.site_url)
            .and_then(|site| site.join("auth/callback").ok())
            .map(|url| url.to_string())
            .ok_or_else(|| ControlPlaneError::config("no valid redirect URL"))
    }

    /// Check that an OAuth provider is enabled
    pub fn require_provider(&self, provider: OAuthProvider) -> ControlPlaneResult<()> {
        if self.enabled_providers.contains(&provider) {
            Ok(())
        } else {
            Err(ControlPlaneError::config(format!(
                "no enabled auth provider '{}'",
                provider
            )))
        }
    }
}

fn parse_http_url(raw: &str) -> Option<url::Url> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Some(parsed),
        _ => None,
    }
}

/// Onboarded tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier (e.g. "acme")
    pub tenant_id: String,
    /// Public domain (e.g. "acme.agency.app")
    pub domain: String,
    /// Isolation level chosen at onboarding
    pub isolation: IsolationLevel,
    /// Auth settings
    pub auth: AuthSettings,
    /// Onboarding timestamp
    pub created_at: DateTime<Utc>,
    /// Last operator update
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a tenant with default auth settings for its domain
    pub fn new(tenant_id: impl Into<String>, domain: impl Into<String>, isolation: IsolationLevel) -> Self {
        let domain = domain.into();
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            auth: AuthSettings::for_domain(&domain),
            domain,
            isolation,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace auth settings
    pub fn with_auth(mut self, auth: AuthSettings) -> Self {
        self.auth = auth;
        self
    }

    /// Request-scoped context for this tenant
    pub fn context(&self) -> TenantContext {
        TenantContext {
            tenant_id: self.tenant_id.clone(),
            domain: self.domain.clone(),
            isolation: self.isolation,
            auth: self.auth.clone(),
        }
    }
}

/// Tenant context carried by an incoming request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub domain: String,
    pub isolation: IsolationLevel,
    pub auth: AuthSettings,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, domain: impl Into<String>, isolation: IsolationLevel) -> Self {
        let domain = domain.into();
        Self {
            tenant_id: tenant_id.into(),
            auth: AuthSettings::for_domain(&domain),
            domain,
            isolation,
        }
    }

    pub fn with_auth(mut self, auth: AuthSettings) -> Self {
        self.auth = auth;
        self
    }
}

impl From<&Tenant> for TenantContext {
    fn from(tenant: &Tenant) -> Self {
        tenant.context()
    }
}
