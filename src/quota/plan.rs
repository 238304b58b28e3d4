use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    /// Capped-total tier: a fixed lifetime allowance, never refreshed
    Free,
    /// Recurring tier: allowance refreshed every calendar month
    Premium,
}

impl PlanType {
    /// Quota rules for this plan. Pure lookup, no side effects.
    pub fn policy(self) -> QuotaPolicy {
        match self {
            PlanType::Free => QuotaPolicy {
                limit: 5,
                period: PeriodKind::Lifetime,
            },
            PlanType::Premium => QuotaPolicy {
                limit: 30,
                period: PeriodKind::Monthly,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanType::Free => "free",
            PlanType::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(PlanType::Free),
            "premium" => Some(PlanType::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a plan's allowance is accounted over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Lifetime,
    Monthly,
}

impl PeriodKind {
    /// Identifier for the accounting window containing `now`.
    ///
    /// `"lifetime"` for capped-total plans, `"YYYY-MM"` for monthly plans.
    /// There is no explicit reset: when the wall clock crosses into a new
    /// month the key changes, and the absence of a usage row under the new
    /// key is the reset.
    pub fn key(self, now: DateTime<Utc>) -> String {
        match self {
            PeriodKind::Lifetime => "lifetime".to_string(),
            PeriodKind::Monthly => format!("{:04}-{:02}", now.year(), now.month()),
        }
    }
}

/// Quota rules for a plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Maximum units per accounting period
    pub limit: u32,
    /// Accounting window kind
    pub period: PeriodKind,
}
