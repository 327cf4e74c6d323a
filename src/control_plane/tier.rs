//! # Tier Catalog
//!
//! Static registry of subscription tiers: monthly quota, feature flags
//! and resource ceilings. Loaded once, never mutated.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Subscription tier id, ordered by rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TierId {
    Free,
    Starter,
    Growth,
    Professional,
    Enterprise,
    LegacyEnterprise,
}

impl TierId {
    /// All tiers in rank order
    pub const ALL: [TierId; 6] = [
        TierId::Free,
        TierId::Starter,
        TierId::Growth,
        TierId::Professional,
        TierId::Enterprise,
        TierId::LegacyEnterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Growth => "growth",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
            Self::LegacyEnterprise => "legacyEnterprise",
        }
    }

    /// Rank in the tier hierarchy (free = 0)
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Lenient lookup: unknown ids rank as `free`
    pub fn parse_or_free(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Free)
    }

    /// One-step upgrade path used for recommendations.
    ///
    /// growth jumps straight to enterprise; professional and the
    /// enterprise tiers have no recommendation.
    fn recommended_upgrade(&self) -> Option<TierId> {
        match self {
            Self::Free => Some(Self::Starter),
            Self::Starter => Some(Self::Growth),
            Self::Growth => Some(Self::Enterprise),
            Self::Professional | Self::Enterprise | Self::LegacyEnterprise => None,
        }
    }
}

impl std::fmt::Display for TierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized tier id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier '{0}'")]
pub struct UnknownTierId(pub String);

impl FromStr for TierId {
    type Err = UnknownTierId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "growth" => Ok(Self::Growth),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            "legacyEnterprise" | "legacy_enterprise" | "legacy-enterprise" => {
                Ok(Self::LegacyEnterprise)
            }
            other => Err(UnknownTierId(other.to_string())),
        }
    }
}

/// A numeric ceiling that may be unlimited.
///
/// Serialized as a plain integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Finite value, if any
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Limited(n) => Some(*n),
            Self::Unlimited => None,
        }
    }

    /// Whether one more unit fits on top of `used`
    pub fn admits(&self, used: u64) -> bool {
        match self {
            Self::Limited(n) => used < *n,
            Self::Unlimited => true,
        }
    }

    /// Units left, `None` when unlimited
    pub fn remaining(&self, used: u64) -> Option<u64> {
        self.value().map(|n| n.saturating_sub(used))
    }

    /// Integer form with the `-1` sentinel
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Limited(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            Self::Unlimited => -1,
        }
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{}", n),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i64::deserialize(deserializer)? {
            -1 => Ok(Self::Unlimited),
            n if n >= 0 => Ok(Self::Limited(n as u64)),
            n => Err(serde::de::Error::custom(format!(
                "limit must be -1 or non-negative, got {}",
                n
            ))),
        }
    }
}

/// Named feature flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    AiAssistant,
    CsvExport,
    PdfExport,
    AdvancedAnalytics,
    CustomBranding,
    ApiAccess,
    PrioritySupport,
    WhiteLabel,
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aiAssistant" => Ok(Self::AiAssistant),
            "csvExport" => Ok(Self::CsvExport),
            "pdfExport" => Ok(Self::PdfExport),
            "advancedAnalytics" => Ok(Self::AdvancedAnalytics),
            "customBranding" => Ok(Self::CustomBranding),
            "apiAccess" => Ok(Self::ApiAccess),
            "prioritySupport" => Ok(Self::PrioritySupport),
            "whiteLabel" => Ok(Self::WhiteLabel),
            other => Err(format!("unknown feature '{}'", other)),
        }
    }
}

/// Boolean feature flags of a tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub ai_assistant: bool,
    pub csv_export: bool,
    pub pdf_export: bool,
    pub advanced_analytics: bool,
    pub custom_branding: bool,
    pub api_access: bool,
    pub priority_support: bool,
    pub white_label: bool,
}

impl FeatureFlags {
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::AiAssistant => self.ai_assistant,
            Feature::CsvExport => self.csv_export,
            Feature::PdfExport => self.pdf_export,
            Feature::AdvancedAnalytics => self.advanced_analytics,
            Feature::CustomBranding => self.custom_branding,
            Feature::ApiAccess => self.api_access,
            Feature::PrioritySupport => self.priority_support,
            Feature::WhiteLabel => self.white_label,
        }
    }

    fn all() -> Self {
        Self {
            ai_assistant: true,
            csv_export: true,
            pdf_export: true,
            advanced_analytics: true,
            custom_branding: true,
            api_access: true,
            priority_support: true,
            white_label: true,
        }
    }
}

/// Numeric resource ceilings of a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    pub max_projects: Limit,
    pub max_team_members: Limit,
    /// Storage allotment in GB
    pub storage_gb: Limit,
    pub max_custom_domains: Limit,
}

/// Full definition of a subscription tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierDefinition {
    pub id: TierId,
    pub name: String,
    /// Monthly price in USD
    pub monthly_price: f64,
    /// Metered actions per billing period
    pub monthly_quota: Limit,
    pub features: FeatureFlags,
    pub limits: ResourceLimits,
}

/// Share of the quota at which an upgrade is recommended (percent)
const UPGRADE_THRESHOLD_PERCENT: u64 = 80;

/// Ordered table of tier definitions
#[derive(Debug, Clone)]
pub struct TierCatalog {
    /// Indexed by `TierId::rank`
    tiers: Vec<TierDefinition>,
}

impl TierCatalog {
    /// The standard product catalog
    pub fn standard() -> Self {
        use Limit::{Limited, Unlimited};

        let tiers = vec![
            TierDefinition {
                id: TierId::Free,
                name: "Free".to_string(),
                monthly_price: 0.0,
                monthly_quota: Limited(10),
                features: FeatureFlags {
                    ai_assistant: true,
                    csv_export: true,
                    ..FeatureFlags::default()
                },
                limits: ResourceLimits {
                    max_projects: Limited(1),
                    max_team_members: Limited(1),
                    storage_gb: Limited(1),
                    max_custom_domains: Limited(0),
                },
            },
            TierDefinition {
                id: TierId::Starter,
                name: "Starter".to_string(),
                monthly_price: 29.0,
                monthly_quota: Limited(100),
                features: FeatureFlags {
                    ai_assistant: true,
                    csv_export: true,
                    pdf_export: true,
                    ..FeatureFlags::default()
                },
                limits: ResourceLimits {
                    max_projects: Limited(5),
                    max_team_members: Limited(3),
                    storage_gb: Limited(10),
                    max_custom_domains: Limited(1),
                },
            },
            TierDefinition {
                id: TierId::Growth,
                name: "Growth".to_string(),
                monthly_price: 79.0,
                monthly_quota: Limited(500),
                features: FeatureFlags {
                    ai_assistant: true,
                    csv_export: true,
                    pdf_export: true,
                    advanced_analytics: true,
                    custom_branding: true,
                    ..FeatureFlags::default()
                },
                limits: ResourceLimits {
                    max_projects: Limited(20),
                    max_team_members: Limited(10),
                    storage_gb: Limited(50),
                    max_custom_domains: Limited(3),
                },
            },
            TierDefinition {
                id: TierId::Professional,
                name: "Professional".to_string(),
                monthly_price: 199.0,
                monthly_quota: Limited(2_000),
                features: FeatureFlags {
                    white_label: false,
                    ..FeatureFlags::all()
                },
                limits: ResourceLimits {
                    max_projects: Limited(100),
                    max_team_members: Limited(25),
                    storage_gb: Limited(250),
                    max_custom_domains: Limited(10),
                },
            },
            TierDefinition {
                id: TierId::Enterprise,
                name: "Enterprise".to_string(),
                monthly_price: 499.0,
                monthly_quota: Unlimited,
                features: FeatureFlags::all(),
                limits: ResourceLimits {
                    max_projects: Unlimited,
                    max_team_members: Unlimited,
                    storage_gb: Limited(1_000),
                    max_custom_domains: Unlimited,
                },
            },
            TierDefinition {
                id: TierId::LegacyEnterprise,
                name: "Legacy Enterprise".to_string(),
                monthly_price: 299.0,
                monthly_quota: Unlimited,
                features: FeatureFlags::all(),
                limits: ResourceLimits {
                    max_projects: Unlimited,
                    max_team_members: Unlimited,
                    storage_gb: Unlimited,
                    max_custom_domains: Unlimited,
                },
            },
        ];

        Self { tiers }
    }

    /// Definition for a typed tier id
    pub fn definition(&self, tier: TierId) -> &TierDefinition {
        &self.tiers[tier.rank() as usize]
    }

    /// Definition for a raw tier id; unknown ids get `free`
    pub fn limits_for(&self, tier_id: &str) -> &TierDefinition {
        self.definition(TierId::parse_or_free(tier_id))
    }

    /// Feature flag lookup; unknown tiers get `free` flags
    pub fn has_feature(&self, tier_id: &str, feature: Feature) -> bool {
        self.limits_for(tier_id).features.get(feature)
    }

    /// Feature flag lookup by feature name; unknown features are off
    pub fn has_feature_named(&self, tier_id: &str, feature_name: &str) -> bool {
        feature_name
            .parse::<Feature>()
            .map(|feature| self.has_feature(tier_id, feature))
            .unwrap_or(false)
    }

    /// True iff `tier_id` ranks at or above `required_tier_id`
    pub fn rank_at_least(&self, tier_id: &str, required_tier_id: &str) -> bool {
        TierId::parse_or_free(tier_id) >= TierId::parse_or_free(required_tier_id)
    }

    /// Next tier to pitch once usage reaches 80% of the active quota
    pub fn upgrade_recommendation(&self, tier_id: &str, current_usage: u64) -> Option<&TierDefinition> {
        let current = self.limits_for(tier_id);
        let quota = current.monthly_quota.value()?;

        let threshold_reached =
            u128::from(current_usage) * 100 >= u128::from(quota) * u128::from(UPGRADE_THRESHOLD_PERCENT);
        if !threshold_reached {
            return None;
        }

        current.id.recommended_upgrade().map(|next| self.definition(next))
    }

    /// All definitions in rank order
    pub fn iter(&self) -> impl Iterator<Item = &TierDefinition> {
        self.tiers.iter()
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
