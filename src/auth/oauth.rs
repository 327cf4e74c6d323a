//! # OAuth Provider Support
//!
//! Tenant-tagged OAuth redirects. The backend owns the provider exchange;
//! this module only decides which provider, which scopes and where the
//! callback lands, carrying tenant identity so the callback can
//! re-associate the session.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ==================
// OAuth Providers
// ==================

/// Supported OAuth providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    GitHub,
    Azure,
    LinkedIn,
    Facebook,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
            OAuthProvider::Azure => "azure",
            OAuthProvider::LinkedIn => "linkedin",
            OAuthProvider::Facebook => "facebook",
        }
    }

    /// Scopes requested when the caller does not override them
    pub fn default_scopes(&self) -> &'static [&'static str] {
        match self {
            OAuthProvider::Google => &["openid", "email", "profile"],
            OAuthProvider::GitHub => &["user:email", "read:user"],
            OAuthProvider::Azure => &["openid", "email", "profile", "offline_access"],
            OAuthProvider::LinkedIn => &["openid", "email", "profile"],
            OAuthProvider::Facebook => &["email", "public_profile"],
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::GitHub),
            "azure" => Ok(OAuthProvider::Azure),
            "linkedin" | "linkedin_oidc" => Ok(OAuthProvider::LinkedIn),
            "facebook" => Ok(OAuthProvider::Facebook),
            other => Err(format!("unknown OAuth provider '{}'", other)),
        }
    }
}

// ==================
// OAuth Request
// ==================

/// Authorization request handed to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRequest {
    pub provider: OAuthProvider,
    /// Callback URL, already tagged with tenant query parameters
    pub redirect_to: String,
    pub scopes: Vec<String>,
    /// Extra query parameters forwarded to the authorize endpoint
    pub query_params: Vec<(String, String)>,
}

impl OAuthRequest {
    /// Build a request whose callback carries tenant id and domain
    pub fn for_tenant(
        provider: OAuthProvider,
        callback_url: &str,
        tenant_id: &str,
        tenant_domain: &str,
    ) -> Self {
        let query_params = vec![
            ("tenant_id".to_string(), tenant_id.to_string()),
            ("tenant_domain".to_string(), tenant_domain.to_string()),
        ];

        Self {
            provider,
            redirect_to: append_query(callback_url, &query_params),
            scopes: provider
                .default_scopes()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            query_params,
        }
    }

    /// Query value by key
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Append url-encoded query parameters to a URL
pub fn append_query(base: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }

    let encoded = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };

    format!("{}{}{}", base, separator, encoded)
}

// ==================
// Tests
// ==================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
        assert_eq!("linkedin_oidc".parse::<OAuthProvider>().unwrap(), OAuthProvider::LinkedIn);
        assert!("myspace".parse::<OAuthProvider>().is_err());

        let json = serde_json::to_string(&OAuthProvider::GitHub).unwrap();
        assert_eq!(json, "\"github\"");
    }

    #[test]
    fn test_request_carries_tenant() {
        let request = OAuthRequest::for_tenant(
            OAuthProvider::Google,
            "https://acme.agency.app/auth/callback",
            "acme",
            "acme.agency.app",
        );

        assert_eq!(
            request.redirect_to,
            "https://acme.agency.app/auth/callback?tenant_id=acme&tenant_domain=acme.agency.app"
        );
        assert_eq!(request.param("tenant_id"), Some("acme"));
        assert!(request.scopes.contains(&"email".to_string()));
    }

    #[test]
    fn test_append_query_encodes_and_extends() {
        let params = vec![("next".to_string(), "/a b&c".to_string())];
        assert_eq!(
            append_query("https://x.io/cb?x=1", &params),
            "https://x.io/cb?x=1&next=%2Fa%20b%26c"
        );
        assert_eq!(append_query("https://x.io/cb", &[]), "https://x.io/cb");
    }
}
