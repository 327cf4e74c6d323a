//! # Quota Enforcement
//!
//! Per-subscriber monthly quotas for metered actions.
//!
//! The usage store owns the counters and must apply the
//! check-and-increment atomically ([`UsageStore::try_consume`]); the
//! enforcer never reads a counter and writes it back in two steps.
//!
//! Admission rules:
//! - privileged subscribers are always admitted at zero accounted cost
//! - unlimited tiers are always admitted
//! - otherwise admitted iff `consumed < quota`; a denial leaves the counter
//!   untouched
//! - store outages and timeouts deny (fail closed)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::errors::{ControlPlaneError, ControlPlaneResult};
use super::tier::{Limit, TierCatalog, TierId};
use super::usage::{UsageEvent, UsageRecord};
use crate::auth::profile::{Profile, SubscriberRole};

// ==================
// Subjects
// ==================

/// Metered action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeteredAction {
    AiAssistant,
    CsvExport,
    PdfExport,
    ReportGeneration,
    ApiRequest,
}

impl MeteredAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiAssistant => "ai_assistant",
            Self::CsvExport => "csv_export",
            Self::PdfExport => "pdf_export",
            Self::ReportGeneration => "report_generation",
            Self::ApiRequest => "api_request",
        }
    }
}

impl std::fmt::Display for MeteredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber as seen by the enforcer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub id: Uuid,
    pub tenant_id: String,
    /// Raw tier id from the subscriber's profile
    pub tier: String,
    pub role: SubscriberRole,
}

impl Subscriber {
    pub fn new(id: Uuid, tenant_id: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            id,
            tenant_id: tenant_id.into(),
            tier: tier.into(),
            role: SubscriberRole::Client,
        }
    }

    pub fn with_role(mut self, role: SubscriberRole) -> Self {
        self.role = role;
        self
    }
}

impl From<&Profile> for Subscriber {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id,
            tenant_id: profile.tenant_id.clone(),
            tier: profile.tier.clone(),
            role: profile.role,
        }
    }
}

// ==================
// Usage Store
// ==================

/// Usage store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageStoreError {
    #[error("usage store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt usage record: {0}")]
    Corrupt(String),
}

/// Conditional increment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub subscriber_id: Uuid,
    pub tenant_id: String,
    pub tier: TierId,
    pub limit: Limit,
    pub reset_day: u32,
    pub now: DateTime<Utc>,
}

/// Result of a conditional increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Counter incremented; value after the increment
    Consumed { consumed: u64 },
    /// Limit reached; counter unchanged
    Rejected { consumed: u64 },
}

/// Backing store for usage counters
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Atomically: create the record if missing, roll it over if the
    /// period ended, then increment iff the limit admits one more unit.
    async fn try_consume(&self, request: &ConsumeRequest) -> Result<ConsumeOutcome, UsageStoreError>;

    async fn get(&self, subscriber_id: Uuid) -> Result<Option<UsageRecord>, UsageStoreError>;

    async fn put(&self, record: UsageRecord) -> Result<(), UsageStoreError>;

    /// Append an audit entry
    async fn record_event(&self, event: UsageEvent) -> Result<(), UsageStoreError>;
}

/// In-process usage store with fault injection
#[derive(Default)]
pub struct InMemoryUsageStore {
    records: Mutex<HashMap<Uuid, UsageRecord>>,
    events: Mutex<Vec<UsageEvent>>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Snapshot of a record
    pub fn record(&self, subscriber_id: Uuid) -> Option<UsageRecord> {
        self.records.lock().get(&subscriber_id).cloned()
    }

    /// Audit entries so far
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().clone()
    }

    async fn round_trip(&self) -> Result<(), UsageStoreError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(UsageStoreError::Unavailable("usage store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn try_consume(&self, request: &ConsumeRequest) -> Result<ConsumeOutcome, UsageStoreError> {
        self.round_trip().await?;

        let mut records = self.records.lock();
        let record = records.entry(request.subscriber_id).or_insert_with(|| {
            UsageRecord::new(
                request.subscriber_id,
                request.tenant_id.clone(),
                request.tier,
                request.reset_day,
                request.now,
            )
        });

        if record.tenant_id != request.tenant_id {
            return Err(UsageStoreError::Corrupt(format!(
                "record belongs to tenant '{}'",
                record.tenant_id
            )));
        }
        if record.next_reset <= record.last_reset.date_naive() {
            return Err(UsageStoreError::Corrupt(
                "next reset precedes last reset".to_string(),
            ));
        }

        if record.is_due(request.reset_day, request.now) {
            record.reset(request.reset_day, request.now);
        }
        record.tier = request.tier;

        if request.limit.admits(record.calls_consumed) {
            record.calls_consumed += 1;
            Ok(ConsumeOutcome::Consumed {
                consumed: record.calls_consumed,
            })
        } else {
            Ok(ConsumeOutcome::Rejected {
                consumed: record.calls_consumed,
            })
        }
    }

    async fn get(&self, subscriber_id: Uuid) -> Result<Option<UsageRecord>, UsageStoreError> {
        self.round_trip().await?;
        Ok(self.record(subscriber_id))
    }

    async fn put(&self, record: UsageRecord) -> Result<(), UsageStoreError> {
        self.round_trip().await?;
        self.records.lock().insert(record.subscriber_id, record);
        Ok(())
    }

    async fn record_event(&self, event: UsageEvent) -> Result<(), UsageStoreError> {
        self.round_trip().await?;
        self.events.lock().push(event);
        Ok(())
    }
}

// ==================
// Decisions
// ==================

/// Why an action was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    QuotaExceeded,
    UsageStoreUnavailable,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota_exceeded",
            Self::UsageStoreUnavailable => "usage_store_unavailable",
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a metered action check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Admitted {
        /// Counter after this action
        consumed: u64,
        limit: Limit,
        /// `None` when unlimited
        remaining: Option<u64>,
        /// Units charged (0 for privileged subscribers)
        accounted_cost: u64,
    },
    Denied {
        reason: DenialReason,
        /// Unknown when the store could not be reached
        consumed: Option<u64>,
        limit: Limit,
    },
}

impl QuotaDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            Self::Denied { reason, .. } => Some(*reason),
            Self::Admitted { .. } => None,
        }
    }
}

/// Quota state of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageState {
    WithinLimit { consumed: u64, limit: u64 },
    AtLimit { consumed: u64, limit: u64 },
    Unlimited,
}

// ==================
// Enforcer
// ==================

/// Admits or denies metered actions
pub struct QuotaEnforcer {
    catalog: Arc<TierCatalog>,
    store: Arc<dyn UsageStore>,
    reset_day: u32,
    store_timeout: Duration,
}

impl QuotaEnforcer {
    pub fn new(
        catalog: Arc<TierCatalog>,
        store: Arc<dyn UsageStore>,
        reset_day: u32,
        store_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            store,
            reset_day,
            store_timeout,
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Check a metered action and consume one unit if admitted
    pub async fn check_and_consume(
        &self,
        subscriber: &Subscriber,
        action: MeteredAction,
    ) -> ControlPlaneResult<QuotaDecision> {
        self.check_and_consume_at(subscriber, action, Utc::now()).await
    }

    /// [`check_and_consume`](Self::check_and_consume) at an explicit instant
    pub async fn check_and_consume_at(
        &self,
        subscriber: &Subscriber,
        action: MeteredAction,
        now: DateTime<Utc>,
    ) -> ControlPlaneResult<QuotaDecision> {
        if subscriber.role.is_privileged() {
            self.audit(subscriber, action, 0, true, now).await;
            return Ok(QuotaDecision::Admitted {
                consumed: 0,
                limit: Limit::Unlimited,
                remaining: None,
                accounted_cost: 0,
            });
        }

        let tier = self.resolve_tier(subscriber)?;
        let limit = self.catalog.definition(tier).monthly_quota;
        let request = ConsumeRequest {
            subscriber_id: subscriber.id,
            tenant_id: subscriber.tenant_id.clone(),
            tier,
            limit,
            reset_day: self.reset_day,
            now,
        };

        let outcome = match self.bounded(self.store.try_consume(&request)).await {
            Ok(outcome) => outcome,
            Err(UsageStoreError::Unavailable(message)) => {
                warn!(
                    tenant_id = %subscriber.tenant_id,
                    subscriber_id = %subscriber.id,
                    tier = %tier.as_str(),
                    action = %action,
                    error = %message,
                    "usage store unavailable, denying metered action"
                );
                return Ok(QuotaDecision::Denied {
                    reason: DenialReason::UsageStoreUnavailable,
                    consumed: None,
                    limit,
                });
            }
            Err(UsageStoreError::Corrupt(reason)) => {
                error!(
                    tenant_id = %subscriber.tenant_id,
                    subscriber_id = %subscriber.id,
                    tier = %tier.as_str(),
                    reason = %reason,
                    "corrupt usage record"
                );
                return Err(ControlPlaneError::CorruptUsageRecord {
                    tenant_id: subscriber.tenant_id.clone(),
                    subscriber_id: subscriber.id.to_string(),
                    tier: tier.as_str().to_string(),
                    reason,
                });
            }
        };

        match outcome {
            ConsumeOutcome::Consumed { consumed } => {
                self.audit(subscriber, action, 1, false, now).await;
                Ok(QuotaDecision::Admitted {
                    consumed,
                    limit,
                    remaining: limit.remaining(consumed),
                    accounted_cost: 1,
                })
            }
            ConsumeOutcome::Rejected { consumed } => {
                debug!(
                    tenant_id = %subscriber.tenant_id,
                    subscriber_id = %subscriber.id,
                    tier = %tier.as_str(),
                    consumed,
                    limit = %limit,
                    "metered action denied: quota exceeded"
                );
                Ok(QuotaDecision::Denied {
                    reason: DenialReason::QuotaExceeded,
                    consumed: Some(consumed),
                    limit,
                })
            }
        }
    }

    /// Like [`check_and_consume`](Self::check_and_consume), with denials as errors
    pub async fn enforce(
        &self,
        subscriber: &Subscriber,
        action: MeteredAction,
    ) -> ControlPlaneResult<QuotaDecision> {
        let decision = self.check_and_consume(subscriber, action).await?;
        match decision {
            QuotaDecision::Denied {
                reason: DenialReason::QuotaExceeded,
                consumed,
                limit,
            } => Err(ControlPlaneError::QuotaExceeded {
                subscriber_id: subscriber.id.to_string(),
                tier: subscriber.tier.clone(),
                consumed: consumed.unwrap_or_default(),
                limit: limit.value().unwrap_or_default(),
            }),
            QuotaDecision::Denied {
                reason: DenialReason::UsageStoreUnavailable,
                ..
            } => Err(ControlPlaneError::upstream("usage store unavailable")),
            admitted => Ok(admitted),
        }
    }

    /// Current state without consuming
    pub async fn usage_state(
        &self,
        subscriber: &Subscriber,
        now: DateTime<Utc>,
    ) -> ControlPlaneResult<UsageState> {
        if subscriber.role.is_privileged() {
            return Ok(UsageState::Unlimited);
        }

        let tier = self.resolve_tier(subscriber)?;
        let limit = match self.catalog.definition(tier).monthly_quota {
            Limit::Unlimited => return Ok(UsageState::Unlimited),
            Limit::Limited(n) => n,
        };

        let consumed = match self.bounded(self.store.get(subscriber.id)).await {
            Ok(Some(record)) if !record.is_due(self.reset_day, now) => record.calls_consumed,
            Ok(_) => 0,
            Err(e) => return Err(ControlPlaneError::upstream(e.to_string())),
        };

        if consumed < limit {
            Ok(UsageState::WithinLimit { consumed, limit })
        } else {
            Ok(UsageState::AtLimit { consumed, limit })
        }
    }

    fn resolve_tier(&self, subscriber: &Subscriber) -> ControlPlaneResult<TierId> {
        subscriber.tier.parse::<TierId>().map_err(|_| {
            error!(
                tenant_id = %subscriber.tenant_id,
                subscriber_id = %subscriber.id,
                tier = %subscriber.tier,
                "subscriber tier is not in the catalog"
            );
            ControlPlaneError::UnknownTier {
                tenant_id: subscriber.tenant_id.clone(),
                subscriber_id: subscriber.id.to_string(),
                tier: subscriber.tier.clone(),
            }
        })
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, UsageStoreError>>,
    ) -> Result<T, UsageStoreError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(UsageStoreError::Unavailable(format!(
                    "timed out after {}ms",
                    self.store_timeout.as_millis()
                )))
            })
    }

    async fn audit(
        &self,
        subscriber: &Subscriber,
        action: MeteredAction,
        accounted_cost: u64,
        privileged: bool,
        at: DateTime<Utc>,
    ) {
        let event = UsageEvent {
            subscriber_id: subscriber.id,
            tenant_id: subscriber.tenant_id.clone(),
            action: action.as_str().to_string(),
            accounted_cost,
            privileged,
            at,
        };
        if let Err(e) = self.bounded(self.store.record_event(event)).await {
            warn!(
                tenant_id = %subscriber.tenant_id,
                subscriber_id = %subscriber.id,
                error = %e,
                "failed to record usage event"
            );
        }
    }
}
