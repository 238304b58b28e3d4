use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use std::sync::Arc;

use super::identity::IdentityProvider;
use crate::assess::{AssessmentGate, AssessmentProcessor};
use crate::error::Error;
use crate::quota::UsageLedger;
use crate::store::{Database, User};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub ledger: UsageLedger,
    pub identity: Arc<dyn IdentityProvider>,
    pub gate: Arc<AssessmentGate>,
    /// How long a minted session stays valid
    pub session_ttl: Duration,
}

impl AppState {
    pub fn new(
        db: Database,
        identity: Arc<dyn IdentityProvider>,
        processor: Arc<dyn AssessmentProcessor>,
        session_ttl: Duration,
    ) -> Self {
        let ledger = UsageLedger::new(db.clone());
        let gate = Arc::new(AssessmentGate::new(db.clone(), ledger.clone(), processor));
        Self {
            db,
            ledger,
            identity,
            gate,
            session_ttl,
        }
    }

    /// Resolve the request's bearer token to its user, or fail with an
    /// authentication error
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<User, Error> {
        let token = bearer_token(headers)
            .ok_or_else(|| Error::Authentication("missing bearer token".to_string()))?;
        self.db
            .session_user(token, Utc::now())?
            .ok_or_else(|| Error::Authentication("session expired or invalid".to_string()))
    }
}

pub(super) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}
