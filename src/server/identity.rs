use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::Error;

/// What the upstream identity service knows about a freshly authenticated
/// user, including the durable token it minted for this login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub session_token: String,
}

/// Upstream authentication collaborator: resolves a one-time exchange
/// credential to the account it belongs to
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<IdentityProfile, Error>;
}

/// Production implementation: the OAuth session-data endpoint, queried with
/// the credential in an `X-Session-ID` header
pub struct HttpIdentityProvider {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(anyhow::anyhow!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve(&self, credential: &str) -> Result<IdentityProfile, Error> {
        let response = self
            .http
            .get(&self.endpoint)
            .header("X-Session-ID", credential)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("identity service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::ExchangeFailure(format!(
                "identity service rejected the credential ({})",
                response.status()
            )));
        }

        let profile: IdentityProfile = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed identity response: {e}")))?;

        info!("Credential resolved to {}", profile.email);
        Ok(profile)
    }
}
