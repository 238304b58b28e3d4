#![allow(dead_code)]
// Shared test support: stub collaborators and a server spawned on an
// ephemeral port, driven by the real client.

use async_trait::async_trait;
use mirror_note::{
    create_router, AppState, AssessmentProcessor, AssessmentReport, Database, Error,
    IdentityProfile, IdentityProvider,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Identity collaborator stub. Counts resolve calls so tests can assert how
/// many exchanges actually happened.
pub struct StubIdentity {
    pub calls: AtomicUsize,
    /// Simulated upstream latency, to hold an exchange in flight
    pub delay: Duration,
    /// Reject every credential
    pub reject: AtomicBool,
    /// Derive a distinct user per credential instead of one shared user
    pub user_per_credential: bool,
}

impl StubIdentity {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reject: AtomicBool::new(false),
            user_per_credential: false,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    /// One distinct account per credential instead of the default shared one
    pub fn multi_user() -> Self {
        Self {
            user_per_credential: true,
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn resolve(&self, credential: &str) -> Result<IdentityProfile, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::ExchangeFailure("credential rejected".to_string()));
        }
        let (id, email) = if self.user_per_credential {
            (
                format!("user-{credential}"),
                format!("{credential}@example.com"),
            )
        } else {
            ("u1".to_string(), "user@example.com".to_string())
        };
        Ok(IdentityProfile {
            id,
            email,
            name: "Test User".to_string(),
            picture: None,
            session_token: format!("token-{credential}"),
        })
    }
}

/// Scoring collaborator stub with a call counter and a failure switch
pub struct StubProcessor {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl StubProcessor {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssessmentProcessor for StubProcessor {
    async fn process(
        &self,
        _assessment_id: &str,
        audio: &[u8],
        _recording_time: u32,
    ) -> Result<AssessmentReport, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Upstream("scoring service unavailable".to_string()));
        }
        Ok(AssessmentReport {
            transcription: "hello world".to_string(),
            analysis: serde_json::json!({
                "overall_score": 80,
                "audio_bytes": audio.len(),
            }),
        })
    }
}

pub struct TestServer {
    pub base_url: String,
    pub db: Database,
    pub identity: Arc<StubIdentity>,
    pub processor: Arc<StubProcessor>,
}

/// Bind the API to an ephemeral port with in-memory storage
pub async fn spawn_server(identity: Arc<StubIdentity>, processor: Arc<StubProcessor>) -> TestServer {
    let db = Database::open_in_memory().unwrap();
    let state = AppState::new(
        db.clone(),
        identity.clone() as Arc<dyn IdentityProvider>,
        processor.clone() as Arc<dyn AssessmentProcessor>,
        chrono::Duration::days(7),
    );
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        db,
        identity,
        processor,
    }
}
