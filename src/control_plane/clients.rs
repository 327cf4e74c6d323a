//! # Tenant Client Registry
//!
//! Resolves a `(tenant, isolation level)` pair to backend connection settings
//! and hands out one cached [`ClientHandle`] per pair.
//!
//! ## Isolation policy
//!
//! - `database`: tenant-specific project credentials read from
//!   `TENANT_<ID>_URL`, `TENANT_<ID>_ANON_KEY`, `TENANT_<ID>_SERVICE_ROLE_KEY`,
//!   each falling back to the shared default when unset
//! - `schema`: shared credentials, per-tenant schema name `tenant_<id>`
//! - `rls`: shared credentials, tenant headers on every request
//!
//! Tenant ids must pass [`TenantDirectory::validate_id`]. That charset
//! (lowercase letters, digits, single inner hyphens) keeps the schema name
//! and the environment prefix injective, so two tenants can never resolve
//! to the same schema or the same credential set.
//!
//! ## Cache
//!
//! Get-or-create runs under a single lock, so concurrent first calls for
//! the same key observe the same handle. Handles live for the process
//! lifetime unless a TTL is configured; an expired handle is rebuilt on
//! next access, and served stale if the backend refuses the rebuild.

use parking_lot::Mutex;
use secrecy::SecretString;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::directory::TenantDirectory;
use super::errors::{ControlPlaneError, ControlPlaneResult};
use super::tenant::{IsolationLevel, TenantContext};
use crate::baas::{
    BaasClient, BaasConnector, BaasError, TenantBackendConfig, ISOLATION_LEVEL_HEADER,
    TENANT_DOMAIN_HEADER, TENANT_ID_HEADER,
};
use crate::config::{BackendDefaults, EnvSource};

/// Cached, tenant-scoped backend client
pub struct ClientHandle {
    key: String,
    config: TenantBackendConfig,
    client: Arc<dyn BaasClient>,
    created_at: Instant,
}

impl ClientHandle {
    /// Cache key (`{tenant_id}-{isolation}`)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Settings the client was built from
    pub fn config(&self) -> &TenantBackendConfig {
        &self.config
    }

    pub fn client(&self) -> &dyn BaasClient {
        self.client.as_ref()
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.map_or(false, |ttl| self.created_at.elapsed() >= ttl)
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("key", &self.key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Cache key for a tenant/isolation pair
pub fn cache_key(tenant_id: &str, isolation: IsolationLevel) -> String {
    format!("{}-{}", tenant_id, isolation)
}

/// Environment variable prefix for tenant credentials (`TENANT_ACME_CO`)
pub fn env_prefix(tenant_id: &str) -> String {
    let normalized: String = tenant_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("TENANT_{}", normalized)
}

fn check_tenant_id(tenant_id: &str) -> ControlPlaneResult<()> {
    TenantDirectory::validate_id(tenant_id).map_err(|e| match e {
        ControlPlaneError::InvalidTenantName { name, reason } => {
            ControlPlaneError::config(format!("unusable tenant id '{}': {}", name, reason))
        }
        other => other,
    })
}

/// Per-process registry of tenant client handles
pub struct TenantClientRegistry {
    defaults: BackendDefaults,
    env: Arc<dyn EnvSource>,
    connector: Arc<dyn BaasConnector>,
    ttl: Option<Duration>,
    handles: Mutex<HashMap<String, Arc<ClientHandle>>>,
}

impl TenantClientRegistry {
    pub fn new(
        defaults: BackendDefaults,
        env: Arc<dyn EnvSource>,
        connector: Arc<dyn BaasConnector>,
    ) -> Self {
        Self {
            defaults,
            env,
            connector,
            ttl: None,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild handles older than `ttl` on next access
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get or create the handle for a tenant/isolation pair
    pub fn get_client(
        &self,
        tenant_id: &str,
        tenant_domain: &str,
        isolation: IsolationLevel,
    ) -> ControlPlaneResult<Arc<ClientHandle>> {
        check_tenant_id(tenant_id)?;

        let key = cache_key(tenant_id, isolation);
        let mut handles = self.handles.lock();

        let stale = match handles.get(&key) {
            Some(handle) if !handle.is_expired(self.ttl) => {
                debug!(key = %key, "client handle cache hit");
                return Ok(Arc::clone(handle));
            }
            Some(handle) => Some(Arc::clone(handle)),
            None => None,
        };

        match self.build(&key, tenant_id, tenant_domain, isolation) {
            Ok(handle) => {
                info!(
                    tenant_id = %tenant_id,
                    isolation = %isolation,
                    key = %key,
                    "client handle created"
                );
                handles.insert(key, Arc::clone(&handle));
                Ok(handle)
            }
            Err(ControlPlaneError::UpstreamUnavailable { message }) if stale.is_some() => {
                warn!(
                    tenant_id = %tenant_id,
                    isolation = %isolation,
                    error = %message,
                    "backend unavailable, serving expired client handle"
                );
                stale.ok_or(ControlPlaneError::UpstreamUnavailable { message })
            }
            Err(e) => Err(e),
        }
    }

    /// Same as [`get_client`](Self::get_client) with an untyped isolation level
    pub fn get_client_with_level(
        &self,
        tenant_id: &str,
        tenant_domain: &str,
        isolation: &str,
    ) -> ControlPlaneResult<Arc<ClientHandle>> {
        let isolation = isolation.parse::<IsolationLevel>()?;
        self.get_client(tenant_id, tenant_domain, isolation)
    }

    /// Handle for a request's tenant context
    pub fn get_client_for(&self, ctx: &TenantContext) -> ControlPlaneResult<Arc<ClientHandle>> {
        self.get_client(&ctx.tenant_id, &ctx.domain, ctx.isolation)
    }

    /// Drop every cached handle of a tenant; returns how many were removed
    pub fn evict(&self, tenant_id: &str) -> usize {
        let mut handles = self.handles.lock();
        let before = handles.len();
        handles.retain(|_, handle| handle.config.tenant_id != tenant_id);
        let removed = before - handles.len();
        if removed > 0 {
            info!(tenant_id = %tenant_id, removed, "client handles evicted");
        }
        removed
    }

    pub fn contains(&self, tenant_id: &str, isolation: IsolationLevel) -> bool {
        self.handles
            .lock()
            .contains_key(&cache_key(tenant_id, isolation))
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    fn build(
        &self,
        key: &str,
        tenant_id: &str,
        tenant_domain: &str,
        isolation: IsolationLevel,
    ) -> ControlPlaneResult<Arc<ClientHandle>> {
        let config = self.resolve_config(tenant_id, tenant_domain, isolation)?;
        let client = self.connector.connect(&config).map_err(|e| match e {
            BaasError::Unavailable(message) => ControlPlaneError::upstream(message),
            other => ControlPlaneError::Internal {
                message: format!("client construction failed: {}", other),
            },
        })?;

        Ok(Arc::new(ClientHandle {
            key: key.to_string(),
            config,
            client,
            created_at: Instant::now(),
        }))
    }

    /// Connection settings implied by the isolation level
    pub fn resolve_config(
        &self,
        tenant_id: &str,
        tenant_domain: &str,
        isolation: IsolationLevel,
    ) -> ControlPlaneResult<TenantBackendConfig> {
        check_tenant_id(tenant_id)?;
        let mut config = TenantBackendConfig {
            tenant_id: tenant_id.to_string(),
            tenant_domain: tenant_domain.to_string(),
            isolation,
            url: self.defaults.url.clone(),
            anon_key: self.defaults.anon_key.clone(),
            service_role_key: self.defaults.service_role_key.clone(),
            schema: None,
            headers: BTreeMap::new(),
        };

        match isolation {
            IsolationLevel::Database => {
                let prefix = env_prefix(tenant_id);
                if let Some(url) = self.tenant_var(&prefix, "URL") {
                    config.url = url;
                }
                if let Some(key) = self.tenant_var(&prefix, "ANON_KEY") {
                    config.anon_key = SecretString::from(key);
                }
                if let Some(key) = self.tenant_var(&prefix, "SERVICE_ROLE_KEY") {
                    config.service_role_key = Some(SecretString::from(key));
                }
            }
            IsolationLevel::Schema => {
                config.schema = Some(format!("tenant_{}", tenant_id.replace('-', "_")));
            }
            IsolationLevel::Rls => {
                config
                    .headers
                    .insert(TENANT_ID_HEADER.to_string(), tenant_id.to_string());
                config
                    .headers
                    .insert(TENANT_DOMAIN_HEADER.to_string(), tenant_domain.to_string());
                config
                    .headers
                    .insert(ISOLATION_LEVEL_HEADER.to_string(), isolation.to_string());
            }
        }

        if config.url.trim().is_empty() {
            return Err(ControlPlaneError::config(format!(
                "no backend URL configured for tenant '{}' ({})",
                tenant_id, isolation
            )));
        }

        Ok(config)
    }

    fn tenant_var(&self, prefix: &str, kind: &str) -> Option<String> {
        let name = format!("{}_{}", prefix, kind);
        let value = self.env.var(&name);
        if value.is_none() {
            debug!(variable = %name, "tenant credential unset, using shared default");
        }
        value
    }
}
