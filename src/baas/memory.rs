//! In-memory backend for tests and local development.
//!
//! All clients produced by one [`InMemoryBaas`] share its user, profile and
//! session state, like browser tabs sharing a cookie jar. Profile reads made
//! through a client carrying an `X-Tenant-ID` header are additionally
//! filtered on that tenant, mimicking a row-level policy. Tests can switch
//! every tenant filter off to stand in for a misconfigured policy.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{
    AuthUser, BaasClient, BaasConnector, BaasError, BaasResult, MagicLinkOptions, ProfileFilter,
    Session, TenantBackendConfig, TENANT_ID_HEADER,
};
use crate::auth::oauth::{append_query, OAuthRequest};
use crate::auth::profile::{Profile, ProfileUpdate};

/// A magic link the backend "sent"
#[derive(Debug, Clone, PartialEq)]
pub struct SentLink {
    pub email: String,
    pub redirect_to: String,
    pub created_user: bool,
    pub tenant_id: String,
}

#[derive(Debug, Clone)]
struct StoredUser {
    user: AuthUser,
    password_hash: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    users: RwLock<HashMap<String, StoredUser>>,
    profiles: RwLock<HashMap<Uuid, Profile>>,
    session: Mutex<Option<Session>>,
    outbox: Mutex<Vec<SentLink>>,
    connected: Mutex<Vec<TenantBackendConfig>>,
    unavailable: AtomicBool,
    refuse_connections: AtomicBool,
    ignore_tenant_filter: AtomicBool,
    latency: Mutex<Option<Duration>>,
    connects: AtomicUsize,
}

/// Shared in-memory backend
#[derive(Clone, Default)]
pub struct InMemoryBaas {
    state: Arc<MemoryState>,
}

impl InMemoryBaas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user directly (admin API)
    pub fn register_user(
        &self,
        email: &str,
        password: Option<&str>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> AuthUser {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            user_metadata: metadata,
            created_at: Utc::now(),
        };
        self.state.users.write().insert(
            user.email.clone(),
            StoredUser {
                user: user.clone(),
                password_hash: password.map(hash_password),
            },
        );
        user
    }

    /// Look up a user by email
    pub fn user(&self, email: &str) -> Option<AuthUser> {
        self.state
            .users
            .read()
            .get(&email.to_lowercase())
            .map(|stored| stored.user.clone())
    }

    /// Simulate the user following their magic link
    pub fn complete_magic_link(&self, email: &str) -> Option<Session> {
        let user = self.user(email)?;
        let session = new_session(user);
        *self.state.session.lock() = Some(session.clone());
        Some(session)
    }

    /// Replace the ambient session
    pub fn install_session(&self, session: Option<Session>) {
        *self.state.session.lock() = session;
    }

    /// Insert a profile row bypassing any policy
    pub fn seed_profile(&self, profile: Profile) {
        self.state.profiles.write().insert(profile.id, profile);
    }

    /// Links sent so far
    pub fn sent_links(&self) -> Vec<SentLink> {
        self.state.outbox.lock().clone()
    }

    /// Configurations clients were built from
    pub fn connected_configs(&self) -> Vec<TenantBackendConfig> {
        self.state.connected.lock().clone()
    }

    /// Number of clients built
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Toggle availability of every backend call
    pub fn set_available(&self, available: bool) {
        self.state.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make new client construction fail with `Unavailable`
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Serve profile rows without checking tenant filters or headers
    pub fn ignore_tenant_filter(&self, ignore: bool) {
        self.state.ignore_tenant_filter.store(ignore, Ordering::SeqCst);
    }

    /// Delay every backend call
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.state.latency.lock() = latency;
    }
}

impl BaasConnector for InMemoryBaas {
    fn connect(&self, config: &TenantBackendConfig) -> BaasResult<Arc<dyn BaasClient>> {
        if self.state.refuse_connections.load(Ordering::SeqCst) {
            return Err(BaasError::Unavailable("connection refused".to_string()));
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.connected.lock().push(config.clone());

        Ok(Arc::new(InMemoryClient {
            state: Arc::clone(&self.state),
            config: config.clone(),
        }))
    }
}

/// Client bound to one tenant configuration
struct InMemoryClient {
    state: Arc<MemoryState>,
    config: TenantBackendConfig,
}

impl InMemoryClient {
    async fn round_trip(&self) -> BaasResult<()> {
        let latency = *self.state.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(BaasError::Unavailable(format!(
                "{} is not reachable",
                self.config.url
            )));
        }
        Ok(())
    }

    fn policy_tenant(&self) -> Option<&str> {
        self.config.headers.get(TENANT_ID_HEADER).map(String::as_str)
    }

    fn row_visible(&self, profile: &Profile, filter: &ProfileFilter) -> bool {
        if self.state.ignore_tenant_filter.load(Ordering::SeqCst) {
            return true;
        }
        profile.tenant_id == filter.tenant_id
            && self.policy_tenant().map_or(true, |t| t == profile.tenant_id)
    }
}

#[async_trait]
impl BaasClient for InMemoryClient {
    async fn send_magic_link(&self, email: &str, options: MagicLinkOptions) -> BaasResult<()> {
        self.round_trip().await?;
        let email = email.to_lowercase();

        let created_user = {
            let mut users = self.state.users.write();
            if users.contains_key(&email) {
                false
            } else if options.should_create_user {
                let user = AuthUser {
                    id: Uuid::new_v4(),
                    email: email.clone(),
                    user_metadata: options.data.clone().unwrap_or_default(),
                    created_at: Utc::now(),
                };
                users.insert(
                    email.clone(),
                    StoredUser {
                        user,
                        password_hash: None,
                    },
                );
                true
            } else {
                return Err(BaasError::UserNotFound);
            }
        };

        self.state.outbox.lock().push(SentLink {
            email,
            redirect_to: options.email_redirect_to,
            created_user,
            tenant_id: self.config.tenant_id.clone(),
        });
        Ok(())
    }

    async fn oauth_authorize_url(&self, request: &OAuthRequest) -> BaasResult<String> {
        self.round_trip().await?;

        let mut params = vec![
            ("provider".to_string(), request.provider.to_string()),
            ("redirect_to".to_string(), request.redirect_to.clone()),
            ("scopes".to_string(), request.scopes.join(" ")),
        ];
        params.extend(request.query_params.iter().cloned());

        Ok(append_query(
            &format!("{}/auth/v1/authorize", self.config.url.trim_end_matches('/')),
            &params,
        ))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BaasResult<Session> {
        self.round_trip().await?;

        let stored = self
            .state
            .users
            .read()
            .get(&email.to_lowercase())
            .cloned()
            .ok_or(BaasError::InvalidCredentials)?;

        match &stored.password_hash {
            Some(hash) if *hash == hash_password(password) => {}
            _ => return Err(BaasError::InvalidCredentials),
        }

        let session = new_session(stored.user);
        *self.state.session.lock() = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> BaasResult<()> {
        self.round_trip().await?;
        self.state.session.lock().take();
        Ok(())
    }

    async fn get_session(&self) -> BaasResult<Option<Session>> {
        self.round_trip().await?;
        let session = self.state.session.lock().clone();
        Ok(session.filter(|s| !s.is_expired(Utc::now())))
    }

    async fn fetch_profile(&self, filter: &ProfileFilter) -> BaasResult<Option<Profile>> {
        self.round_trip().await?;

        let profiles = self.state.profiles.read();
        Ok(profiles
            .get(&filter.subscriber_id)
            .filter(|p| self.row_visible(p, filter))
            .cloned())
    }

    async fn insert_profile(&self, profile: &Profile) -> BaasResult<Profile> {
        self.round_trip().await?;

        if let Some(policy_tenant) = self.policy_tenant() {
            if policy_tenant != profile.tenant_id {
                return Err(BaasError::Rejected {
                    status: 403,
                    message: "row violates tenant policy".to_string(),
                });
            }
        }

        let mut profiles = self.state.profiles.write();
        if profiles.contains_key(&profile.id) {
            return Err(BaasError::Rejected {
                status: 409,
                message: "duplicate profile".to_string(),
            });
        }
        profiles.insert(profile.id, profile.clone());
        Ok(profile.clone())
    }

    async fn update_profile(
        &self,
        filter: &ProfileFilter,
        update: &ProfileUpdate,
    ) -> BaasResult<Option<Profile>> {
        self.round_trip().await?;

        let mut profiles = self.state.profiles.write();
        let Some(profile) = profiles.get_mut(&filter.subscriber_id) else {
            return Ok(None);
        };
        if !self.row_visible(profile, filter) {
            return Ok(None);
        }

        profile.apply(update);
        Ok(Some(profile.clone()))
    }
}

fn new_session(user: AuthUser) -> Session {
    Session {
        access_token: Uuid::new_v4().simple().to_string(),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        user,
    }
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
