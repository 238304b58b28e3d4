//! Authorized HTTP client for the assessment API
//!
//! Every outbound request picks up the current bearer token from
//! [`TokenStore`] at send time. Responses are intercepted before endpoint
//! decoding: 401 surfaces as an authentication error (the stored token is
//! deliberately left in place), 429 as a rate-limit notice with no state
//! mutation, and a transport failure as a network error so callers never
//! mistake connectivity trouble for an auth or quota verdict.

use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::api::{
    AssessmentReceipt, LogoutResponse, NewAssessmentRequest, SessionRequest, SessionResponse,
    UserProfile,
};
use crate::auth::TokenStore;
use crate::error::{Error, ErrorBody};
use crate::quota::UsageSnapshot;
use crate::store::AssessmentRecord;

/// Overall deadline per request; there is no automatic retry anywhere,
/// retrying is a user action
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    tokens: Arc<TokenStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenStore>) -> Result<Self, Error> {
        let base_url: String = base_url.into();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(anyhow::anyhow!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token when one is present
    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.get() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Session looks invalid server-side. The token is NOT cleared
            // here; see DESIGN.md for the recorded decision.
            warn!("Request rejected as unauthenticated");
            return Err(Self::decode_error(response).await);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by server");
            return Err(Error::RateLimited);
        }
        if !status.is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(response)
    }

    async fn decode_error(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.json::<ErrorBody>().await.ok();
        Error::from_wire(status, body)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed response body: {e}")))
    }

    /// Exchange a one-time redirect credential for a durable session.
    /// Unauthenticated by design; the result carries the new token.
    pub async fn create_session(&self, session_id: &str) -> Result<SessionResponse, Error> {
        let request = SessionRequest {
            session_id: session_id.to_string(),
        };
        let response = self
            .execute(self.http.post(self.url("/api/auth/session")).json(&request))
            .await?;
        Self::decode(response).await
    }

    /// Current user profile; fails with `Authentication` when the token is
    /// absent, expired, or invalid
    pub async fn me(&self) -> Result<UserProfile, Error> {
        let response = self
            .execute(self.authorized(self.http.get(self.url("/api/auth/me"))))
            .await?;
        Self::decode(response).await
    }

    /// Invalidate the session server-side. Local cleanup is the
    /// [`SessionManager`](crate::auth::SessionManager)'s job and happens
    /// regardless of this call's outcome.
    pub async fn logout(&self) -> Result<(), Error> {
        let response = self
            .execute(self.authorized(self.http.post(self.url("/api/auth/logout"))))
            .await?;
        let _: LogoutResponse = Self::decode(response).await?;
        Ok(())
    }

    pub async fn usage(&self) -> Result<UsageSnapshot, Error> {
        let response = self
            .execute(self.authorized(self.http.get(self.url("/api/usage"))))
            .await?;
        Self::decode(response).await
    }

    /// Submit a recording for assessment. A refusal comes back as
    /// `QuotaExceeded` with the plan context needed for an upgrade prompt.
    pub async fn create_assessment(
        &self,
        request: &NewAssessmentRequest,
    ) -> Result<AssessmentReceipt, Error> {
        let response = self
            .execute(
                self.authorized(self.http.post(self.url("/api/assessments")))
                    .json(request),
            )
            .await?;
        Self::decode(response).await
    }

    pub async fn assessment(&self, assessment_id: &str) -> Result<AssessmentRecord, Error> {
        let path = format!("/api/assessments/{assessment_id}");
        let response = self
            .execute(self.authorized(self.http.get(self.url(&path))))
            .await?;
        Self::decode(response).await
    }
}
