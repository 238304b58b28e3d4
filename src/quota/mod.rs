//! Plan policy and usage accounting
//!
//! This module answers two questions for the rest of the system:
//! - What does a subscription plan allow? (`PlanType`, `QuotaPolicy`)
//! - Has this user capacity left right now, and if so, consume one unit
//!   atomically (`UsageLedger`)

mod ledger;
mod plan;

pub use ledger::{Consumption, UsageLedger, UsageSnapshot};
pub use plan::{PeriodKind, PlanType, QuotaPolicy};
