// Assessment gate tests: refusals have zero side effects, admitted units
// stay consumed even when the scoring collaborator fails, and every failure
// mode is distinguishable on the wire.

mod common;

use base64::Engine;
use common::{spawn_server, StubIdentity, StubProcessor, TestServer};
use mirror_note::{
    ApiClient, Error, NewAssessmentRequest, PlanType, TokenStore, UsageLedger,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn audio_request() -> NewAssessmentRequest {
    NewAssessmentRequest {
        audio_base64: base64::engine::general_purpose::STANDARD.encode(b"pcm-bytes"),
        recording_mode: "free_speech".to_string(),
        recording_time: 30,
    }
}

async fn sign_in(server: &TestServer, credential: &str) -> (Arc<TokenStore>, Arc<ApiClient>) {
    let tokens = Arc::new(TokenStore::ephemeral());
    let api = Arc::new(ApiClient::new(server.base_url.clone(), tokens.clone()).unwrap());
    let response = api.create_session(credential).await.unwrap();
    tokens.set(&response.session_token).unwrap();
    (tokens, api)
}

async fn default_server() -> TestServer {
    spawn_server(Arc::new(StubIdentity::new()), Arc::new(StubProcessor::new())).await
}

#[tokio::test]
async fn test_free_user_consumes_up_to_the_cap() {
    let server = default_server().await;
    let (_tokens, api) = sign_in(&server, "gate-cred").await;

    for expected_remaining in (0..5).rev() {
        let receipt = api.create_assessment(&audio_request()).await.unwrap();
        assert_eq!(receipt.status, "completed");
        assert_eq!(receipt.remaining, expected_remaining);
    }

    let refused = api.create_assessment(&audio_request()).await;
    match refused {
        Err(Error::QuotaExceeded {
            plan,
            limit,
            consumed,
        }) => {
            assert_eq!(plan, PlanType::Free);
            assert_eq!(limit, 5);
            assert_eq!(consumed, 5);
        }
        other => panic!("expected quota refusal, got {other:?}"),
    }

    assert_eq!(server.processor.call_count(), 5);
    let usage = api.usage().await.unwrap();
    assert_eq!(usage.consumed, 5);
    assert_eq!(usage.limit, 5);
    assert_eq!(usage.period_key, "lifetime");
}

#[tokio::test]
async fn test_refusal_has_no_side_effects() {
    let server = default_server().await;
    let (_tokens, api) = sign_in(&server, "gate-cred").await;

    // Exhaust the plan directly in the ledger
    let ledger = UsageLedger::new(server.db.clone());
    for _ in 0..5 {
        assert!(ledger
            .try_consume("u1", PlanType::Free, chrono::Utc::now())
            .unwrap()
            .allowed);
    }

    let refused = api.create_assessment(&audio_request()).await;
    assert!(matches!(refused, Err(Error::QuotaExceeded { .. })));

    // No unit consumed past the cap, no record, no collaborator call
    assert_eq!(server.processor.call_count(), 0);
    assert_eq!(server.db.assessments_for_user("u1").unwrap(), 0);
    assert_eq!(api.usage().await.unwrap().consumed, 5);
}

#[tokio::test]
async fn test_processor_failure_keeps_the_unit_consumed() {
    let server = default_server().await;
    let (_tokens, api) = sign_in(&server, "gate-cred").await;
    server.processor.fail.store(true, Ordering::SeqCst);

    let result = api.create_assessment(&audio_request()).await;
    assert!(matches!(result, Err(Error::Upstream(_))));

    // Usage reflects requests accepted for processing, not successes
    assert_eq!(server.processor.call_count(), 1);
    assert_eq!(api.usage().await.unwrap().consumed, 1);
    assert_eq!(server.db.assessments_for_user("u1").unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_premium_race_for_the_last_unit() {
    let server = default_server().await;
    let (_tokens, api) = sign_in(&server, "gate-cred").await;
    server.db.set_plan("u1", PlanType::Premium).unwrap();

    // 29 of 30 consumed this month
    let ledger = UsageLedger::new(server.db.clone());
    let now = chrono::Utc::now();
    for _ in 0..29 {
        assert!(ledger
            .try_consume("u1", PlanType::Premium, now)
            .unwrap()
            .allowed);
    }

    let req_a = audio_request();
    let req_b = audio_request();
    let (a, b) = tokio::join!(
        api.create_assessment(&req_a),
        api.create_assessment(&req_b)
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    let refusals = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(Error::QuotaExceeded { .. })))
        .count();
    assert_eq!(winners, 1, "exactly one request may take the last unit");
    assert_eq!(refusals, 1);

    assert_eq!(api.usage().await.unwrap().consumed, 30);
    assert_eq!(server.processor.call_count(), 1);
}

#[tokio::test]
async fn test_validation_failures_consume_nothing() {
    let server = default_server().await;
    let (_tokens, api) = sign_in(&server, "gate-cred").await;

    let bad_base64 = NewAssessmentRequest {
        audio_base64: "definitely %% not base64".to_string(),
        ..audio_request()
    };
    assert!(matches!(
        api.create_assessment(&bad_base64).await,
        Err(Error::Validation(_))
    ));

    let empty_audio = NewAssessmentRequest {
        audio_base64: String::new(),
        ..audio_request()
    };
    assert!(matches!(
        api.create_assessment(&empty_audio).await,
        Err(Error::Validation(_))
    ));

    let zero_time = NewAssessmentRequest {
        recording_time: 0,
        ..audio_request()
    };
    assert!(matches!(
        api.create_assessment(&zero_time).await,
        Err(Error::Validation(_))
    ));

    assert_eq!(server.processor.call_count(), 0);
    assert_eq!(api.usage().await.unwrap().consumed, 0);
}

#[tokio::test]
async fn test_unauthenticated_submission_is_rejected() {
    let server = default_server().await;
    let tokens = Arc::new(TokenStore::ephemeral());
    let api = ApiClient::new(server.base_url.clone(), tokens).unwrap();

    assert!(matches!(
        api.create_assessment(&audio_request()).await,
        Err(Error::Authentication(_))
    ));
    assert_eq!(server.processor.call_count(), 0);
}

#[tokio::test]
async fn test_assessment_record_is_owner_only() {
    let server = spawn_server(
        Arc::new(StubIdentity::multi_user()),
        Arc::new(StubProcessor::new()),
    )
    .await;
    let (_tokens_a, api_a) = sign_in(&server, "cred-alpha").await;
    let (_tokens_b, api_b) = sign_in(&server, "cred-beta").await;

    let receipt = api_a.create_assessment(&audio_request()).await.unwrap();

    let record = api_a.assessment(&receipt.assessment_id).await.unwrap();
    assert!(record.processed);
    assert_eq!(record.transcription.as_deref(), Some("hello world"));
    assert!(record.error.is_none());

    // Another account sees the same 404 as for a missing record
    assert!(matches!(
        api_b.assessment(&receipt.assessment_id).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        api_a.assessment("assessment-nonexistent").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_quota_error_wire_shape() {
    let server = default_server().await;
    let (tokens, _api) = sign_in(&server, "gate-cred").await;

    let ledger = UsageLedger::new(server.db.clone());
    for _ in 0..5 {
        ledger
            .try_consume("u1", PlanType::Free, chrono::Utc::now())
            .unwrap();
    }

    // Raw request so the wire body itself is visible
    let response = reqwest::Client::new()
        .post(format!("{}/api/assessments", server.base_url))
        .bearer_auth(tokens.get().unwrap())
        .json(&audio_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["plan"], "free");
    assert_eq!(body["limit"], 5);
    assert_eq!(body["consumed"], 5);
}
