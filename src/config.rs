use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub assessment: AssessmentConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// Upstream OAuth session-data endpoint that resolves one-time
    /// exchange credentials
    pub identity_endpoint: String,

    /// Lifetime of minted sessions, in days
    pub session_ttl_days: i64,
}

#[derive(Debug, Deserialize)]
pub struct AssessmentConfig {
    /// Transcription/scoring service endpoint
    pub processor_endpoint: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
