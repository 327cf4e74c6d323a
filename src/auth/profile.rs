//! # Subscriber Profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscriber role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberRole {
    /// Agency client
    #[default]
    Client,
    /// Agency staff member
    Agent,
    /// Platform administrator; bypasses all quota checks
    Admin,
}

impl SubscriberRole {
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Profile as submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProfile {
    /// Auth user id
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: SubscriberRole,
    /// Subscription tier id
    pub tier: String,
}

/// Persisted profile, stamped with its tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: SubscriberRole,
    pub tier: String,
    pub tenant_id: String,
    pub tenant_domain: String,
    pub created_at: DateTime<Utc>,
}

/// Partial profile update; `None` fields are left untouched.
///
/// Tenant identity is not updatable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<SubscriberRole>,
    #[serde(default)]
    pub tier: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.role.is_none() && self.tier.is_none()
    }
}

impl Profile {
    /// Stamp tenant identity and creation time onto a new profile
    pub fn stamped(
        new: NewProfile,
        tenant_id: impl Into<String>,
        tenant_domain: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new.id,
            email: new.email,
            full_name: new.full_name,
            role: new.role,
            tier: new.tier,
            tenant_id: tenant_id.into(),
            tenant_domain: tenant_domain.into(),
            created_at,
        }
    }

    /// Apply the set fields of an update
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(full_name) = &update.full_name {
            self.full_name = Some(full_name.clone());
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        if let Some(tier) = &update.tier {
            self.tier = tier.clone();
        }
    }
}
