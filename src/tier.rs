//! # Tier: Price-to-Entitlement Projection
//!
//! A [`TierInfo`] answers "does this price include feature X" and "what is
//! limit Y" for a billing price. It is rebuilt from `plan_feature_limits`
//! rows on every lookup (see `db::tiers`); nothing is cached.
//!
//! When the store has no price described as `free`, [`TierInfo::default_free`]
//! supplies the built-in free plan.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

pub const FEATURE_EMAIL_BLASTS: &str = "email_blasts";
pub const FEATURE_VISUAL_FORM_BUILDER: &str = "visual_form_builder";

/// Boolean features the platform knows about.
pub const KNOWN_FEATURES: [&str; 7] = [
    FEATURE_EMAIL_BLASTS,
    "email_verification",
    "referral_system",
    FEATURE_VISUAL_FORM_BUILDER,
    "custom_branding",
    "webhooks",
    "json_export",
];

pub const LIMIT_CAMPAIGNS: &str = "campaigns";
pub const LIMIT_LEADS: &str = "leads";
pub const LIMIT_TEAM_MEMBERS: &str = "team_members";

/// One joined `plan_feature_limits` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlanFeatureRow {
    pub feature_name: String,
    pub enabled: bool,
    pub limit_name: Option<String>,
    pub limit_value: Option<i64>,
}

/// How much of something a tier allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Limit {
    Unlimited,
    Max(i64),
    /// The tier does not mention this limit at all.
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierInfo {
    pub price_id: Option<Uuid>,
    pub name: String,
    pub features: BTreeMap<String, bool>,
    /// `None` means unlimited.
    pub limits: BTreeMap<String, Option<i64>>,
}

impl TierInfo {
    /// Built-in free plan used when the store defines none.
    pub fn default_free() -> Self {
        let features = KNOWN_FEATURES
            .iter()
            .map(|f| (f.to_string(), *f == FEATURE_VISUAL_FORM_BUILDER))
            .collect();
        let limits = [
            (LIMIT_CAMPAIGNS, 1),
            (LIMIT_LEADS, 200),
            (LIMIT_TEAM_MEMBERS, 1),
        ]
        .into_iter()
        .map(|(name, max)| (name.to_string(), Some(max)))
        .collect();
        TierInfo {
            price_id: None,
            name: "free".to_string(),
            features,
            limits,
        }
    }

    /// Fold joined plan rows into a tier. A feature row that also names a
    /// limit contributes both.
    pub fn from_rows(price_id: Uuid, name: impl Into<String>, rows: &[PlanFeatureRow]) -> Self {
        let mut features = BTreeMap::new();
        let mut limits = BTreeMap::new();
        for row in rows {
            let enabled = features.entry(row.feature_name.clone()).or_insert(false);
            *enabled |= row.enabled;
            if let Some(limit) = &row.limit_name {
                limits.insert(limit.clone(), row.limit_value);
            }
        }
        TierInfo {
            price_id: Some(price_id),
            name: name.into(),
            features,
            limits,
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.get(feature).copied().unwrap_or(false)
    }

    pub fn limit(&self, name: &str) -> Limit {
        match self.limits.get(name) {
            Some(Some(max)) => Limit::Max(*max),
            Some(None) => Limit::Unlimited,
            None => Limit::Absent,
        }
    }

    /// Whether one more item fits when `current` are already in use. An
    /// absent limit allows nothing.
    pub fn allows_another(&self, name: &str, current: i64) -> bool {
        match self.limit(name) {
            Limit::Unlimited => true,
            Limit::Max(max) => current < max,
            Limit::Absent => false,
        }
    }

    pub fn can_send_blasts(&self) -> bool {
        self.has_feature(FEATURE_EMAIL_BLASTS)
    }
}
