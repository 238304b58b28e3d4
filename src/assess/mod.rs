//! Quota-gated assessment intake
//!
//! `AssessmentGate` is the single choke point every paid assessment passes
//! through: consume a quota unit atomically, record the admitted request,
//! then hand the audio to the opaque transcription/scoring collaborator
//! behind [`AssessmentProcessor`].

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::api::AssessmentReceipt;
use crate::error::Error;
use crate::quota::UsageLedger;
use crate::store::{Database, User};

/// What the scoring collaborator hands back for a processed recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub transcription: String,
    /// Opaque analysis document (archetype, scores, strengths, ...); this
    /// crate stores and serves it without interpreting it
    pub analysis: serde_json::Value,
}

/// Transcription/scoring collaborator. The algorithm is out of scope here;
/// implementations wrap whatever upstream service does the work.
#[async_trait]
pub trait AssessmentProcessor: Send + Sync {
    async fn process(
        &self,
        assessment_id: &str,
        audio: &[u8],
        recording_time: u32,
    ) -> Result<AssessmentReport, Error>;
}

/// Admission control for assessment creation.
///
/// Refusals are absolute: no unit consumed, no record created, no
/// collaborator call. Once a unit is consumed it stays consumed even if the
/// collaborator then fails; usage counts requests accepted for processing,
/// not successful reports.
pub struct AssessmentGate {
    db: Database,
    ledger: UsageLedger,
    processor: Arc<dyn AssessmentProcessor>,
}

impl AssessmentGate {
    pub fn new(db: Database, ledger: UsageLedger, processor: Arc<dyn AssessmentProcessor>) -> Self {
        Self {
            db,
            ledger,
            processor,
        }
    }

    pub async fn submit(
        &self,
        user: &User,
        audio: &[u8],
        recording_mode: &str,
        recording_time: u32,
    ) -> Result<AssessmentReceipt, Error> {
        let now = Utc::now();

        let consumption = self.ledger.try_consume(&user.id, user.plan, now)?;
        if !consumption.allowed {
            let policy = user.plan.policy();
            info!(
                "Refusing assessment for user {}: {} plan at {}/{} units",
                user.id, user.plan, policy.limit, policy.limit
            );
            return Err(Error::QuotaExceeded {
                plan: user.plan,
                limit: policy.limit,
                consumed: policy.limit,
            });
        }

        let assessment_id = format!("assessment-{}", uuid::Uuid::new_v4());
        self.db
            .insert_assessment(&assessment_id, &user.id, recording_mode, recording_time, now)?;
        info!(
            "Assessment {} admitted for user {} ({} units remaining)",
            assessment_id, user.id, consumption.remaining
        );

        match self
            .processor
            .process(&assessment_id, audio, recording_time)
            .await
        {
            Ok(report) => {
                self.db.mark_assessment_processed(
                    &assessment_id,
                    &report.transcription,
                    &report.analysis,
                    Utc::now(),
                )?;
                Ok(AssessmentReceipt {
                    assessment_id,
                    status: "completed".to_string(),
                    remaining: consumption.remaining,
                })
            }
            Err(err) => {
                error!("Processing failed for {}: {}", assessment_id, err);
                self.db
                    .mark_assessment_failed(&assessment_id, &err.to_string(), Utc::now())?;
                Err(err)
            }
        }
    }
}

/// HTTP-backed processor: ships the audio to the scoring service and decodes
/// its report. Processing a recording takes a while, so the deadline is
/// generous.
pub struct HttpAssessmentProcessor {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpAssessmentProcessor {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Internal(anyhow::anyhow!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

#[derive(Serialize)]
struct ProcessRequest<'a> {
    assessment_id: &'a str,
    audio_base64: String,
    recording_time: u32,
}

#[async_trait]
impl AssessmentProcessor for HttpAssessmentProcessor {
    async fn process(
        &self,
        assessment_id: &str,
        audio: &[u8],
        recording_time: u32,
    ) -> Result<AssessmentReport, Error> {
        use base64::Engine;

        let request = ProcessRequest {
            assessment_id,
            audio_base64: base64::engine::general_purpose::STANDARD.encode(audio),
            recording_time,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("scoring service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "scoring service answered {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed scoring report: {e}")))
    }
}
