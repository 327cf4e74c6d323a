//! Onboard `acme` under row-level isolation, sign a starter subscriber in
//! and meter AI-assistant actions across a billing-period rollover.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use agency_governance::auth::{NewProfile, SubscriberRole, TenantAuthService};
use agency_governance::baas::{InMemoryBaas, TENANT_ID_HEADER};
use agency_governance::config::GovernanceConfig;
use agency_governance::control_plane::{
    DenialReason, InMemoryUsageStore, IsolationLevel, Limit, MeteredAction, QuotaDecision,
    QuotaEnforcer, Subscriber, Tenant, TenantClientRegistry, TenantDirectory, TierCatalog,
    UsageState,
};

const CONFIG: &str = r#"
    [backend]
    url = "https://shared.backend.io"
    anon_key = "shared-anon-key"

    [quota]
    reset_day = 15
"#;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
}

#[tokio::test]
async fn acme_starter_subscriber_hits_quota_and_recovers_on_reset() {
    let config = GovernanceConfig::from_toml_str(CONFIG).unwrap();
    config.validate().unwrap();

    // Onboarding
    let directory = TenantDirectory::new();
    let tenant = Tenant::new("acme", "acme.agency.app", IsolationLevel::Rls)
        .with_auth(config.auth.settings_for("acme.agency.app"));
    directory.onboard(tenant).unwrap();

    let baas = InMemoryBaas::new();
    let registry = TenantClientRegistry::new(
        config.backend.clone(),
        Arc::new(HashMap::<String, String>::new()),
        Arc::new(baas.clone()),
    )
    .with_ttl(config.client_cache.ttl());

    // Authentication
    let ctx = directory.get_by_domain("acme.agency.app").unwrap().context();
    let auth = TenantAuthService::new(&registry, ctx, &config.auth).unwrap();
    assert_eq!(
        auth.handle().config().headers.get(TENANT_ID_HEADER).map(String::as_str),
        Some("acme")
    );

    auth.sign_up_with_link("ann@acme.com", Map::new()).await.unwrap();
    let session = baas.complete_magic_link("ann@acme.com").unwrap();
    let verified = auth.require_session().await.unwrap();
    assert_eq!(verified.user.id, session.user.id);

    let profile = auth
        .create_profile(NewProfile {
            id: session.user.id,
            email: "ann@acme.com".to_string(),
            full_name: Some("Ann".to_string()),
            role: SubscriberRole::Client,
            tier: "starter".to_string(),
        })
        .await
        .unwrap();
    let profile = auth.get_profile(profile.id).await.unwrap().unwrap();
    assert_eq!(profile.tenant_id, "acme");

    // Metering
    let store = Arc::new(InMemoryUsageStore::new());
    let enforcer = QuotaEnforcer::new(
        Arc::new(TierCatalog::standard()),
        store.clone(),
        config.quota.reset_day,
        config.quota.store_timeout(),
    );
    let subscriber = Subscriber::from(&profile);
    let march = at(2026, 3, 20);

    for n in 1..=100u64 {
        let decision = enforcer
            .check_and_consume_at(&subscriber, MeteredAction::AiAssistant, march)
            .await
            .unwrap();
        assert!(
            matches!(decision, QuotaDecision::Admitted { consumed, .. } if consumed == n),
            "action {} should be admitted",
            n
        );
    }

    assert_eq!(
        enforcer.usage_state(&subscriber, march).await.unwrap(),
        UsageState::AtLimit {
            consumed: 100,
            limit: 100
        }
    );

    let denied = enforcer
        .check_and_consume_at(&subscriber, MeteredAction::AiAssistant, march)
        .await
        .unwrap();
    assert_eq!(
        denied,
        QuotaDecision::Denied {
            reason: DenialReason::QuotaExceeded,
            consumed: Some(100),
            limit: Limit::Limited(100),
        }
    );
    assert_eq!(store.record(subscriber.id).unwrap().calls_consumed, 100);

    // The day before the configured reset day is still in the old period
    let eve = at(2026, 4, 14);
    let still_denied = enforcer
        .check_and_consume_at(&subscriber, MeteredAction::AiAssistant, eve)
        .await
        .unwrap();
    assert_eq!(still_denied.denial_reason(), Some(DenialReason::QuotaExceeded));

    let reset = at(2026, 4, 15);
    let restored = enforcer
        .check_and_consume_at(&subscriber, MeteredAction::AiAssistant, reset)
        .await
        .unwrap();
    assert!(matches!(
        restored,
        QuotaDecision::Admitted {
            consumed: 1,
            remaining: Some(99),
            ..
        }
    ));

    let record = store.record(subscriber.id).unwrap();
    assert_eq!(record.next_reset, at(2026, 5, 15).date_naive());
}

#[tokio::test]
async fn acme_session_is_rejected_under_another_tenant() {
    let config = GovernanceConfig::from_toml_str(CONFIG).unwrap();
    let baas = InMemoryBaas::new();
    let registry = TenantClientRegistry::new(
        config.backend.clone(),
        Arc::new(HashMap::<String, String>::new()),
        Arc::new(baas.clone()),
    );

    let acme = Tenant::new("acme", "acme.agency.app", IsolationLevel::Rls).context();
    let globex = Tenant::new("globex", "globex.agency.app", IsolationLevel::Rls).context();
    let acme_auth = TenantAuthService::new(&registry, acme, &config.auth).unwrap();
    let globex_auth = TenantAuthService::new(&registry, globex, &config.auth).unwrap();

    acme_auth.sign_up_with_link("ann@acme.com", Map::new()).await.unwrap();
    baas.complete_magic_link("ann@acme.com").unwrap();

    assert!(acme_auth.get_session().await.unwrap().is_some());
    let err = globex_auth.get_session().await.unwrap_err();
    assert!(err.requires_reauthentication());
    assert_eq!(err.status_code(), 401);

    let admin = Subscriber::new(Uuid::new_v4(), "acme", "free").with_role(SubscriberRole::Admin);
    let store = Arc::new(InMemoryUsageStore::new());
    let enforcer = QuotaEnforcer::new(
        Arc::new(TierCatalog::standard()),
        store.clone(),
        config.quota.reset_day,
        config.quota.store_timeout(),
    );
    let decision = enforcer
        .check_and_consume(&admin, MeteredAction::CsvExport)
        .await
        .unwrap();
    assert!(decision.is_admitted());
    assert!(store.record(admin.id).is_none());
}
