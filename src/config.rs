//! # Governance Configuration
//!
//! Loaded once at startup from TOML, overlaid with process environment.
//!
//! ```toml
//! [backend]
//! url = "https://shared.backend.io"
//! anon_key = "public-anon-key"
//!
//! [client_cache]
//! ttl_secs = 3600
//!
//! [auth]
//! request_timeout_ms = 5000
//! magic_link_rate_limit = 5
//! enabled_providers = ["google", "github"]
//!
//! [quota]
//! reset_day = 1
//! store_timeout_ms = 2000
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::auth::oauth::OAuthProvider;
use crate::config_validator::ConfigValidator;
use crate::control_plane::errors::{ControlPlaneError, ControlPlaneResult};
use crate::control_plane::tenant::AuthSettings;

/// Source of environment variables
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned().filter(|v| !v.trim().is_empty())
    }
}

/// Shared default backend credentials
#[derive(Debug, Clone, Deserialize)]
pub struct BackendDefaults {
    /// Shared backend project URL
    #[serde(default)]
    pub url: String,
    /// Shared public (anon) key
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub anon_key: SecretString,
    /// Shared privileged key
    #[serde(default, deserialize_with = "deserialize_optional_secret")]
    pub service_role_key: Option<SecretString>,
}

fn empty_secret() -> SecretString {
    SecretString::from("")
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Default for BackendDefaults {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: empty_secret(),
            service_role_key: None,
        }
    }
}

/// Client cache settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientCacheConfig {
    /// Handle lifetime; `None` keeps handles for the process lifetime
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl ClientCacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Auth settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthDefaults {
    /// Upper bound on every auth/profile call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Magic links per email per hour
    #[serde(default = "default_magic_link_rate_limit")]
    pub magic_link_rate_limit: u32,
    /// OAuth providers enabled for newly onboarded tenants
    #[serde(default = "default_enabled_providers")]
    pub enabled_providers: Vec<OAuthProvider>,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_magic_link_rate_limit() -> u32 {
    5
}

fn default_enabled_providers() -> Vec<OAuthProvider> {
    vec![OAuthProvider::Google]
}

impl Default for AuthDefaults {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            magic_link_rate_limit: default_magic_link_rate_limit(),
            enabled_providers: default_enabled_providers(),
        }
    }
}

impl AuthDefaults {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Auth settings for a tenant served at `https://{domain}`
    pub fn settings_for(&self, domain: &str) -> AuthSettings {
        AuthSettings {
            enabled_providers: self.enabled_providers.clone(),
            ..AuthSettings::for_domain(domain)
        }
    }
}

/// Quota settings
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Day of month counters roll over (1-31, clamped to month length)
    #[serde(default = "default_reset_day")]
    pub reset_day: u32,
    /// Upper bound on usage-store calls; slower calls deny
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_reset_day() -> u32 {
    1
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            reset_day: default_reset_day(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl QuotaConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub backend: BackendDefaults,
    #[serde(default)]
    pub client_cache: ClientCacheConfig,
    #[serde(default)]
    pub auth: AuthDefaults,
    #[serde(default)]
    pub quota: QuotaConfig,
}

impl GovernanceConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(raw: &str) -> ControlPlaneResult<Self> {
        toml::from_str(raw)
            .map_err(|e| ControlPlaneError::config(format!("invalid configuration: {}", e.message())))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ControlPlaneResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ControlPlaneError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Overlay `BAAS_URL`, `BAAS_ANON_KEY` and `BAAS_SERVICE_ROLE_KEY`
    pub fn apply_env(mut self, env: &dyn EnvSource) -> Self {
        if let Some(url) = env.var("BAAS_URL") {
            self.backend.url = url;
        }
        if let Some(key) = env.var("BAAS_ANON_KEY") {
            self.backend.anon_key = SecretString::from(key);
        }
        if let Some(key) = env.var("BAAS_SERVICE_ROLE_KEY") {
            self.backend.service_role_key = Some(SecretString::from(key));
        }
        self
    }

    /// Validate all fields, reporting every failure at once
    pub fn validate(&self) -> ControlPlaneResult<()> {
        let mut validator = ConfigValidator::new();
        validator
            .validate_non_empty("backend.url", &self.backend.url)
            .validate_http_url("backend.url", &self.backend.url)
            .validate_secret_present("backend.anon_key", self.backend.anon_key.expose_secret())
            .validate_range("quota.reset_day", i64::from(self.quota.reset_day), 1, 31)
            .validate_positive("quota.store_timeout_ms", to_i64(self.quota.store_timeout_ms))
            .validate_positive("auth.request_timeout_ms", to_i64(self.auth.request_timeout_ms))
            .validate_positive(
                "auth.magic_link_rate_limit",
                i64::from(self.auth.magic_link_rate_limit),
            );

        if let Some(ttl) = self.client_cache.ttl_secs {
            validator.validate_positive("client_cache.ttl_secs", to_i64(ttl));
        }

        validator.finish().map_err(|errors| {
            let fields = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            ControlPlaneError::config(fields)
        })
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [backend]
        url = "https://shared.backend.io"
        anon_key = "shared-anon-key"

        [client_cache]
        ttl_secs = 600

        [auth]
        enabled_providers = ["google", "github"]

        [quota]
        reset_day = 15
    "#;

    #[test]
    fn test_parse_with_defaults() {
        let config = GovernanceConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.backend.url, "https://shared.backend.io");
        assert_eq!(config.backend.anon_key.expose_secret(), "shared-anon-key");
        assert_eq!(config.client_cache.ttl(), Some(Duration::from_secs(600)));
        assert_eq!(config.quota.reset_day, 15);
        assert_eq!(config.quota.store_timeout_ms, 2_000);
        assert_eq!(config.auth.request_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());

        let settings = config.auth.settings_for("acme.agency.app");
        assert_eq!(settings.site_url, "https://acme.agency.app");
        assert_eq!(
            settings.enabled_providers,
            vec![OAuthProvider::Google, OAuthProvider::GitHub]
        );
    }

    #[test]
    fn test_default_config_needs_backend() {
        let config = GovernanceConfig::default();
        assert_eq!(config.auth.enabled_providers, vec![OAuthProvider::Google]);
        assert_eq!(config.quota.reset_day, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = GovernanceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.quota.reset_day, 15);

        let missing = GovernanceConfig::from_file("/definitely/not/here.toml");
        assert!(matches!(missing, Err(ControlPlaneError::Configuration { .. })));
    }

    #[test]
    fn test_env_overlay() {
        let mut env = HashMap::new();
        env.insert("BAAS_URL".to_string(), "https://override.backend.io".to_string());
        env.insert("BAAS_SERVICE_ROLE_KEY".to_string(), "service".to_string());
        env.insert("BAAS_ANON_KEY".to_string(), "  ".to_string());

        let config = GovernanceConfig::from_toml_str(SAMPLE).unwrap().apply_env(&env);
        assert_eq!(config.backend.url, "https://override.backend.io");
        assert_eq!(config.backend.anon_key.expose_secret(), "shared-anon-key");
        assert!(config.backend.service_role_key.is_some());
    }

    #[test]
    fn test_validation_never_echoes_secrets() {
        let raw = r#"
            [backend]
            url = "not-a-url"
            anon_key = ""

            [quota]
            reset_day = 40
        "#;
        let config = GovernanceConfig::from_toml_str(raw).unwrap();
        let err = config.validate().unwrap_err();
        let message = err.to_string();

        assert!(message.contains("backend.url"));
        assert!(message.contains("backend.anon_key"));
        assert!(message.contains("quota.reset_day"));

        let mut config = GovernanceConfig::from_toml_str(SAMPLE).unwrap();
        config.quota.reset_day = 0;
        let message = config.validate().unwrap_err().to_string();
        assert!(!message.contains("shared-anon-key"));
    }

    #[test]
    fn test_malformed_toml() {
        let result = GovernanceConfig::from_toml_str("[quota]\nreset_day = \"first\"");
        assert!(matches!(result, Err(ControlPlaneError::Configuration { .. })));
    }
}
