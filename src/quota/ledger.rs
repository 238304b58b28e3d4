use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::plan::PlanType;
use crate::store::Database;

/// Result of an atomic consumption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumption {
    pub allowed: bool,
    /// Units left in the period after this attempt (0 when refused)
    pub remaining: u32,
}

/// Point-in-time usage view for a "show my usage" display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub plan: PlanType,
    pub consumed: u32,
    pub limit: u32,
    pub period_key: String,
}

/// Per-user, per-period consumption accounting over durable storage.
///
/// There is no reset operation anywhere. Monthly plans roll over because the
/// period key derived from the wall clock changes, and a missing row for the
/// new key reads as zero consumption.
#[derive(Clone)]
pub struct UsageLedger {
    db: Database,
}

impl UsageLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Accounting window for `plan` at `now`
    pub fn current_period_key(plan: PlanType, now: DateTime<Utc>) -> String {
        plan.policy().period.key(now)
    }

    /// Consume one unit if capacity remains in the current period.
    ///
    /// The check and the increment are a single conditional update, so two
    /// concurrent calls for the same user can never jointly exceed the
    /// limit. A refused attempt leaves the record untouched.
    pub fn try_consume(
        &self,
        user_id: &str,
        plan: PlanType,
        now: DateTime<Utc>,
    ) -> Result<Consumption> {
        let policy = plan.policy();
        let period_key = policy.period.key(now);
        match self
            .db
            .try_consume_unit(user_id, &period_key, plan, policy.limit)?
        {
            Some(consumed) => {
                debug!(
                    "User {} at {}/{} units in period {}",
                    user_id, consumed, policy.limit, period_key
                );
                Ok(Consumption {
                    allowed: true,
                    remaining: policy.limit.saturating_sub(consumed),
                })
            }
            None => Ok(Consumption {
                allowed: false,
                remaining: 0,
            }),
        }
    }

    /// Read-only usage view; never mutates the ledger
    pub fn peek(&self, user_id: &str, plan: PlanType, now: DateTime<Utc>) -> Result<UsageSnapshot> {
        let policy = plan.policy();
        let period_key = policy.period.key(now);
        let consumed = self.db.consumed_units(user_id, &period_key)?;
        Ok(UsageSnapshot {
            plan,
            consumed,
            limit: policy.limit,
            period_key,
        })
    }
}
