//! # Tenant-Scoped Auth Service
//!
//! Authentication and profile access through a tenant's cached client
//! handle. Tenant identity is stamped into everything written and
//! re-verified on everything read back: a session is only a claim, checked
//! on every retrieval.

use chrono::Utc;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};
use super::magic_link::MagicLinkGuard;
use super::oauth::{OAuthProvider, OAuthRequest};
use super::profile::{NewProfile, Profile, ProfileUpdate};
use crate::baas::{
    BaasResult, MagicLinkOptions, ProfileFilter, Session, TENANT_DOMAIN_CLAIM, TENANT_ID_CLAIM,
};
use crate::config::AuthDefaults;
use crate::control_plane::clients::{ClientHandle, TenantClientRegistry};
use crate::control_plane::errors::ControlPlaneError;
use crate::control_plane::tenant::TenantContext;

/// Metadata key holding the signup timestamp
pub const SIGNUP_AT_CLAIM: &str = "signup_at";

/// Auth operations bound to one tenant
pub struct TenantAuthService {
    context: TenantContext,
    handle: Arc<ClientHandle>,
    guard: Arc<MagicLinkGuard>,
    timeout: Duration,
}

impl TenantAuthService {
    /// Bind to a tenant, obtaining its handle from the registry.
    ///
    /// The service starts with its own magic-link guard, so the hourly limit
    /// only spans calls made through this instance. Callers that build a
    /// service per request must pass one process-wide guard through
    /// [`with_guard`](Self::with_guard).
    pub fn new(
        registry: &TenantClientRegistry,
        context: TenantContext,
        defaults: &AuthDefaults,
    ) -> AuthResult<Self> {
        let handle = registry.get_client_for(&context)?;
        Ok(Self {
            context,
            handle,
            guard: Arc::new(MagicLinkGuard::new(defaults.magic_link_rate_limit)),
            timeout: defaults.request_timeout(),
        })
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a magic-link rate limiter across services
    pub fn with_guard(mut self, guard: Arc<MagicLinkGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.context.tenant_id
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn handle(&self) -> &Arc<ClientHandle> {
        &self.handle
    }

    // ==================
    // Sign-in / Sign-up
    // ==================

    /// Send a sign-in link to an existing subscriber; never provisions one
    pub async fn sign_in_with_link(&self, email: &str) -> AuthResult<()> {
        self.guard.admit(email)?;
        let options = MagicLinkOptions {
            should_create_user: false,
            email_redirect_to: self.context.auth.callback_url()?,
            data: None,
        };

        self.bounded(self.handle.client().send_magic_link(email, options))
            .await
    }

    /// Send a sign-up link, creating the subscriber with tenant-stamped metadata
    pub async fn sign_up_with_link(&self, email: &str, metadata: Map<String, Value>) -> AuthResult<()> {
        self.guard.admit(email)?;
        let options = MagicLinkOptions {
            should_create_user: true,
            email_redirect_to: self.context.auth.callback_url()?,
            data: Some(self.stamp_signup(metadata)),
        };

        self.bounded(self.handle.client().send_magic_link(email, options))
            .await
    }

    /// Provider authorization URL whose callback carries the tenant
    pub async fn sign_in_with_oauth(&self, provider: OAuthProvider) -> AuthResult<String> {
        self.context.auth.require_provider(provider)?;
        let request = OAuthRequest::for_tenant(
            provider,
            &self.context.auth.callback_url()?,
            &self.context.tenant_id,
            &self.context.domain,
        );

        self.bounded(self.handle.client().oauth_authorize_url(&request))
            .await
    }

    /// Password sign-in; a session claimed by another tenant is dropped
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let session = self
            .bounded(self.handle.client().sign_in_with_password(email, password))
            .await?;

        if let Err(mismatch) = self.verify_claim(&session) {
            if let Err(e) = self.bounded(self.handle.client().sign_out()).await {
                warn!(tenant_id = %self.context.tenant_id, error = %e, "failed to drop foreign session");
            }
            return Err(mismatch);
        }
        Ok(session)
    }

    /// Idempotent sign-out
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.bounded(self.handle.client().sign_out()).await
    }

    // ==================
    // Sessions
    // ==================

    /// Ambient session, re-verified against this tenant.
    ///
    /// `Ok(None)` means not signed in; a session for another tenant (or
    /// one without a tenant claim) is `AuthError::TenantMismatch`.
    pub async fn get_session(&self) -> AuthResult<Option<Session>> {
        let session = self.bounded(self.handle.client().get_session()).await?;
        match session {
            Some(session) => {
                self.verify_claim(&session)?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Like [`get_session`](Self::get_session), with no session as `NotAuthenticated`
    pub async fn require_session(&self) -> AuthResult<Session> {
        self.get_session().await?.ok_or(AuthError::NotAuthenticated)
    }

    fn verify_claim(&self, session: &Session) -> AuthResult<()> {
        match session.tenant_claim() {
            Some(claim) if claim == self.context.tenant_id => Ok(()),
            found => {
                warn!(
                    tenant_id = %self.context.tenant_id,
                    claimed = found.unwrap_or("<none>"),
                    user_id = %session.user.id,
                    "session tenant claim mismatch"
                );
                Err(ControlPlaneError::TenantMismatch {
                    expected: self.context.tenant_id.clone(),
                    found: found.map(str::to_string),
                }
                .into())
            }
        }
    }

    // ==================
    // Profiles
    // ==================

    /// Profile matching both the subscriber id and this tenant
    pub async fn get_profile(&self, subscriber_id: Uuid) -> AuthResult<Option<Profile>> {
        let filter = self.profile_filter(subscriber_id);
        let profile = self
            .bounded(self.handle.client().fetch_profile(&filter))
            .await?;

        Ok(self.owned(profile))
    }

    /// Update this tenant's profile of a subscriber; `None` when there is none
    pub async fn update_profile(
        &self,
        subscriber_id: Uuid,
        update: ProfileUpdate,
    ) -> AuthResult<Option<Profile>> {
        if update.is_empty() {
            return self.get_profile(subscriber_id).await;
        }

        let filter = self.profile_filter(subscriber_id);
        let profile = self
            .bounded(self.handle.client().update_profile(&filter, &update))
            .await?;

        Ok(self.owned(profile))
    }

    fn profile_filter(&self, subscriber_id: Uuid) -> ProfileFilter {
        ProfileFilter {
            subscriber_id,
            tenant_id: self.context.tenant_id.clone(),
        }
    }

    fn owned(&self, profile: Option<Profile>) -> Option<Profile> {
        profile.filter(|p| {
            let owned = p.tenant_id == self.context.tenant_id;
            if !owned {
                warn!(
                    tenant_id = %self.context.tenant_id,
                    owner = %p.tenant_id,
                    subscriber_id = %p.id,
                    "backend returned a profile owned by another tenant"
                );
            }
            owned
        })
    }

    /// Persist a profile stamped with this tenant
    pub async fn create_profile(&self, profile: NewProfile) -> AuthResult<Profile> {
        let stamped = Profile::stamped(
            profile,
            self.context.tenant_id.clone(),
            self.context.domain.clone(),
            Utc::now(),
        );
        self.bounded(self.handle.client().insert_profile(&stamped))
            .await
    }

    fn stamp_signup(&self, mut metadata: Map<String, Value>) -> Map<String, Value> {
        metadata.insert(
            TENANT_ID_CLAIM.to_string(),
            Value::String(self.context.tenant_id.clone()),
        );
        metadata.insert(
            TENANT_DOMAIN_CLAIM.to_string(),
            Value::String(self.context.domain.clone()),
        );
        metadata.insert(
            SIGNUP_AT_CLAIM.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        metadata
    }

    async fn bounded<T>(&self, call: impl Future<Output = BaasResult<T>>) -> AuthResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(tenant_id = %self.context.tenant_id, timeout_ms, "backend call timed out");
                Err(AuthError::Timeout(timeout_ms))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::profile::SubscriberRole;
    use crate::baas::InMemoryBaas;
    use crate::config::BackendDefaults;
    use crate::control_plane::tenant::{AuthSettings, IsolationLevel};
    use secrecy::SecretString;
    use std::collections::HashMap;

    fn registry(baas: &InMemoryBaas) -> TenantClientRegistry {
        let defaults = BackendDefaults {
            url: "https://shared.backend.io".to_string(),
            anon_key: SecretString::from("anon"),
            service_role_key: None,
        };
        TenantClientRegistry::new(
            defaults,
            Arc::new(HashMap::<String, String>::new()),
            Arc::new(baas.clone()),
        )
    }

    fn context(tenant_id: &str, isolation: IsolationLevel) -> TenantContext {
        let domain = format!("{}.agency.app", tenant_id);
        let auth = AuthSettings {
            site_url: format!("https://{}", domain),
            allowed_redirect_urls: vec![format!("https://{}/welcome", domain)],
            enabled_providers: vec![OAuthProvider::Google, OAuthProvider::GitHub],
            secret_ref: None,
        };
        TenantContext::new(tenant_id, domain, isolation).with_auth(auth)
    }

    fn service(baas: &InMemoryBaas, tenant_id: &str) -> TenantAuthService {
        TenantAuthService::new(
            &registry(baas),
            context(tenant_id, IsolationLevel::Rls),
            &AuthDefaults::default(),
        )
        .unwrap()
    }

    fn claim(tenant_id: &str) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert(TENANT_ID_CLAIM.to_string(), Value::String(tenant_id.to_string()));
        metadata
    }

    #[tokio::test]
    async fn test_sign_in_link_never_provisions() {
        let baas = InMemoryBaas::new();
        let auth = service(&baas, "acme");

        let result = auth.sign_in_with_link("ghost@acme.com").await;
        assert_eq!(result, Err(AuthError::SubscriberNotFound));
        assert!(baas.user("ghost@acme.com").is_none());

        baas.register_user("ann@acme.com", None, claim("acme"));
        auth.sign_in_with_link("ann@acme.com").await.unwrap();
        let sent = baas.sent_links();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].redirect_to, "https://acme.agency.app/welcome");
        assert!(!sent[0].created_user);
    }

    #[tokio::test]
    async fn test_sign_up_stamps_tenant() {
        let baas = InMemoryBaas::new();
        let auth = service(&baas, "acme");

        let mut metadata = Map::new();
        metadata.insert("full_name".to_string(), Value::String("Ann".to_string()));
        metadata.insert(TENANT_ID_CLAIM.to_string(), Value::String("globex".to_string()));
        auth.sign_up_with_link("ann@acme.com", metadata).await.unwrap();

        let user = baas.user("ann@acme.com").unwrap();
        let meta = &user.user_metadata;
        assert_eq!(meta.get(TENANT_ID_CLAIM), Some(&Value::String("acme".to_string())));
        assert_eq!(
            meta.get(TENANT_DOMAIN_CLAIM),
            Some(&Value::String("acme.agency.app".to_string()))
        );
        assert!(meta.contains_key(SIGNUP_AT_CLAIM));
        assert_eq!(meta.get("full_name"), Some(&Value::String("Ann".to_string())));
    }

    #[tokio::test]
    async fn test_link_rejects_bad_email_before_upstream() {
        let baas = InMemoryBaas::new();
        let auth = service(&baas, "acme");

        let result = auth.sign_up_with_link("not-an-email", Map::new()).await;
        assert!(matches!(result, Err(AuthError::InvalidEmail(_))));
        assert!(baas.sent_links().is_empty());
    }

    #[tokio::test]
    async fn test_session_from_other_tenant_is_mismatch() {
        let baas = InMemoryBaas::new();
        baas.register_user("bob@b.com", None, claim("tenant-b"));
        baas.complete_magic_link("bob@b.com").unwrap();

        let auth = service(&baas, "tenant-a");
        let err = auth.get_session().await.unwrap_err();
        assert_eq!(
            err,
            AuthError::TenantMismatch {
                expected: "tenant-a".to_string(),
                found: Some("tenant-b".to_string()),
            }
        );
        assert_ne!(err, AuthError::NotAuthenticated);

        let own = service(&baas, "tenant-b");
        assert!(own.get_session().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_without_claim_is_mismatch() {
        let baas = InMemoryBaas::new();
        let eve = baas.register_user("eve@x.com", None, Map::new());
        baas.install_session(Some(Session {
            access_token: "tok".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: eve,
        }));

        let auth = service(&baas, "acme");
        let err = auth.get_session().await.unwrap_err();
        assert!(matches!(err, AuthError::TenantMismatch { found: None, .. }));
    }

    #[tokio::test]
    async fn test_no_session_is_not_authenticated() {
        let baas = InMemoryBaas::new();
        let auth = service(&baas, "acme");

        assert_eq!(auth.get_session().await.unwrap(), None);
        assert_eq!(
            auth.require_session().await.unwrap_err(),
            AuthError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn test_password_sign_in_verifies_claim() {
        let baas = InMemoryBaas::new();
        baas.register_user("ann@acme.com", Some("s3cret!"), claim("acme"));
        baas.register_user("bob@b.com", Some("s3cret!"), claim("tenant-b"));
        let auth = service(&baas, "acme");

        let session = auth.sign_in_with_password("ann@acme.com", "s3cret!").await.unwrap();
        assert_eq!(session.tenant_claim(), Some("acme"));

        let err = auth
            .sign_in_with_password("bob@b.com", "s3cret!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TenantMismatch { .. }));
        assert_eq!(auth.get_session().await.unwrap(), None);

        let err = auth
            .sign_in_with_password("ann@acme.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_oauth_redirect_carries_tenant() {
        let baas = InMemoryBaas::new();
        let auth = service(&baas, "acme");

        let url = auth.sign_in_with_oauth(OAuthProvider::GitHub).await.unwrap();
        assert!(url.starts_with("https://shared.backend.io/auth/v1/authorize?provider=github"));
        assert!(url.contains("&tenant_id=acme&tenant_domain=acme.agency.app"));

        let err = auth.sign_in_with_oauth(OAuthProvider::Azure).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_no_valid_redirect_is_config_error() {
        let baas = InMemoryBaas::new();
        let auth_settings = AuthSettings {
            site_url: "not a url".to_string(),
            allowed_redirect_urls: vec!["javascript:alert(1)".to_string()],
            enabled_providers: vec![OAuthProvider::Google],
            secret_ref: None,
        };
        let ctx = TenantContext::new("acme", "acme.agency.app", IsolationLevel::Rls)
            .with_auth(auth_settings);
        let auth = TenantAuthService::new(&registry(&baas), ctx, &AuthDefaults::default()).unwrap();

        let err = auth.sign_in_with_oauth(OAuthProvider::Google).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
        let err = auth.sign_in_with_link("ann@acme.com").await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_profiles_are_tenant_scoped() {
        let baas = InMemoryBaas::new();
        let registry = registry(&baas);
        let acme = TenantAuthService::new(
            &registry,
            context("acme", IsolationLevel::Schema),
            &AuthDefaults::default(),
        )
        .unwrap();
        let globex = TenantAuthService::new(
            &registry,
            context("globex", IsolationLevel::Schema),
            &AuthDefaults::default(),
        )
        .unwrap();

        let created = globex
            .create_profile(NewProfile {
                id: Uuid::new_v4(),
                email: "gia@globex.com".to_string(),
                full_name: Some("Gia".to_string()),
                role: SubscriberRole::Client,
                tier: "starter".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(created.tenant_id, "globex");
        assert_eq!(created.tenant_domain, "globex.agency.app");

        assert_eq!(globex.get_profile(created.id).await.unwrap(), Some(created.clone()));
        assert_eq!(acme.get_profile(created.id).await.unwrap(), None);
    }

    fn new_profile(email: &str, tier: &str) -> NewProfile {
        NewProfile {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: None,
            role: SubscriberRole::Client,
            tier: tier.to_string(),
        }
    }

    #[tokio::test]
    async fn test_foreign_profile_dropped_when_backend_ignores_filter() {
        let baas = InMemoryBaas::new();
        let globex = service(&baas, "globex");
        let created = globex
            .create_profile(new_profile("gia@globex.com", "starter"))
            .await
            .unwrap();

        baas.ignore_tenant_filter(true);
        let acme = service(&baas, "acme");
        assert_eq!(acme.get_profile(created.id).await.unwrap(), None);

        let update = ProfileUpdate {
            tier: Some("enterprise".to_string()),
            ..Default::default()
        };
        assert_eq!(acme.update_profile(created.id, update).await.unwrap(), None);
        assert_eq!(globex.get_profile(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_update_profile_is_tenant_scoped() {
        let baas = InMemoryBaas::new();
        let acme = service(&baas, "acme");
        let globex = service(&baas, "globex");
        let created = acme
            .create_profile(new_profile("ann@acme.com", "free"))
            .await
            .unwrap();

        let update = ProfileUpdate {
            tier: Some("growth".to_string()),
            full_name: Some("Ann".to_string()),
            ..Default::default()
        };
        assert_eq!(globex.update_profile(created.id, update.clone()).await.unwrap(), None);

        let updated = acme.update_profile(created.id, update).await.unwrap().unwrap();
        assert_eq!(updated.tier, "growth");
        assert_eq!(updated.full_name.as_deref(), Some("Ann"));
        assert_eq!(updated.tenant_id, "acme");

        let unchanged = acme
            .update_profile(created.id, ProfileUpdate::default())
            .await
            .unwrap();
        assert_eq!(unchanged, Some(updated));
    }

    #[tokio::test]
    async fn test_shared_guard_limits_across_services() {
        let baas = InMemoryBaas::new();
        let guard = Arc::new(MagicLinkGuard::new(1));

        let first = service(&baas, "acme").with_guard(Arc::clone(&guard));
        first.sign_up_with_link("ann@acme.com", Map::new()).await.unwrap();

        let second = service(&baas, "acme").with_guard(guard);
        let err = second.sign_in_with_link("ann@acme.com").await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimitExceeded(_)));
        assert_eq!(baas.sent_links().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_is_idempotent() {
        let baas = InMemoryBaas::new();
        baas.register_user("ann@acme.com", None, claim("acme"));
        baas.complete_magic_link("ann@acme.com").unwrap();
        let auth = service(&baas, "acme");

        auth.sign_out().await.unwrap();
        auth.sign_out().await.unwrap();
        assert_eq!(auth.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_timeout_is_distinct() {
        let baas = InMemoryBaas::new();
        let auth = service(&baas, "acme").with_timeout(Duration::from_millis(20));
        baas.set_latency(Some(Duration::from_millis(500)));

        let err = auth.get_session().await.unwrap_err();
        assert_eq!(err, AuthError::Timeout(20));
        assert_eq!(err.status_code(), 504);
    }

    #[test]
    fn test_unsupported_context_fails_construction() {
        let baas = InMemoryBaas::new();
        let ctx = TenantContext::new("", "acme.agency.app", IsolationLevel::Rls);
        let result = TenantAuthService::new(&registry(&baas), ctx, &AuthDefaults::default());
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }
}
