//! Error taxonomy shared by the server and the client
//!
//! Every failure a caller can remediate differently gets its own variant:
//! re-authenticate (`Authentication`), upgrade the plan (`QuotaExceeded`),
//! retry by user action (`Network`, `RateLimited`), or give up and report
//! (`Upstream`, `Internal`). The server serializes each variant to a stable
//! wire code so the client can map it back without guessing from the HTTP
//! status alone.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::quota::PlanType;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Token absent, expired, or rejected by the server
    #[error("not authenticated: {0}")]
    Authentication(String),

    /// One-time credential exchange rejected by the identity collaborator
    #[error("session exchange failed: {0}")]
    ExchangeFailure(String),

    /// Usage ledger at capacity for the current period
    #[error("quota exceeded: {consumed}/{limit} assessments used on the {plan} plan")]
    QuotaExceeded {
        plan: PlanType,
        limit: u32,
        consumed: u32,
    },

    /// Server asked us to slow down; no local state was mutated
    #[error("rate limited, try again shortly")]
    RateLimited,

    /// No response reached the server; retryable by user action
    #[error("network error: {0}")]
    Network(String),

    /// Opaque failure from a collaborator service
    #[error("upstream service error: {0}")]
    Upstream(String),

    /// Malformed request
    #[error("invalid request: {0}")]
    Validation(String),

    /// Record absent or not visible to the caller
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Stable wire code carried in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "not_authenticated",
            Error::ExchangeFailure(_) => "exchange_failed",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::RateLimited => "rate_limited",
            Error::Network(_) => "network",
            Error::Upstream(_) => "upstream",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Authentication(_) | Error::ExchangeFailure(_) => StatusCode::UNAUTHORIZED,
            Error::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::Network(_) | Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Reconstruct a typed error from a server response.
    ///
    /// The wire code wins over the HTTP status; in particular a quota error
    /// is only ever recognized from the explicit `quota_exceeded` code, never
    /// inferred from a bare 403.
    pub fn from_wire(status: StatusCode, body: Option<ErrorBody>) -> Self {
        if let Some(body) = body {
            let message = body.message;
            return match body.error.as_str() {
                "not_authenticated" => Error::Authentication(message),
                "exchange_failed" => Error::ExchangeFailure(message),
                "quota_exceeded" => Error::QuotaExceeded {
                    plan: body.plan.unwrap_or(PlanType::Free),
                    limit: body.limit.unwrap_or(0),
                    consumed: body.consumed.unwrap_or(0),
                },
                "rate_limited" => Error::RateLimited,
                "validation" => Error::Validation(message),
                "not_found" => Error::NotFound(message),
                _ => Error::Upstream(message),
            };
        }
        match status {
            StatusCode::UNAUTHORIZED => Error::Authentication("401 with no error body".into()),
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited,
            other => Error::Upstream(format!("unexpected status {other}")),
        }
    }
}

/// JSON body attached to every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code, see [`Error::code`]
    pub error: String,

    /// Human-readable description
    pub message: String,

    /// Plan context, present on quota errors so the UI can offer an upgrade
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed: Option<u32>,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        let (plan, limit, consumed) = match err {
            Error::QuotaExceeded {
                plan,
                limit,
                consumed,
            } => (Some(*plan), Some(*limit), Some(*consumed)),
            _ => (None, None, None),
        };
        ErrorBody {
            error: err.code().to_string(),
            message: err.to_string(),
            plan,
            limit,
            consumed,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if matches!(self, Error::Internal(_) | Error::Upstream(_)) {
            error!("request failed: {}", self);
        }
        let body = ErrorBody::from(&self);
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_error_round_trips_plan_context() {
        let err = Error::QuotaExceeded {
            plan: PlanType::Free,
            limit: 5,
            consumed: 5,
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.error, "quota_exceeded");
        assert_eq!(body.plan, Some(PlanType::Free));

        let back = Error::from_wire(StatusCode::FORBIDDEN, Some(body));
        match back {
            Error::QuotaExceeded {
                plan,
                limit,
                consumed,
            } => {
                assert_eq!(plan, PlanType::Free);
                assert_eq!(limit, 5);
                assert_eq!(consumed, 5);
            }
            other => panic!("expected quota error, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_403_is_not_a_quota_error() {
        let err = Error::from_wire(StatusCode::FORBIDDEN, None);
        assert!(!matches!(err, Error::QuotaExceeded { .. }));
    }

    #[test]
    fn test_unknown_code_maps_to_upstream() {
        let body = ErrorBody {
            error: "something_new".into(),
            message: "?".into(),
            plan: None,
            limit: None,
            consumed: None,
        };
        let err = Error::from_wire(StatusCode::IM_A_TEAPOT, Some(body));
        assert!(matches!(err, Error::Upstream(_)));
    }
}
