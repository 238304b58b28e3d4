use super::state::{bearer_token, AppState};
use crate::api::{
    LogoutResponse, NewAssessmentRequest, SessionRequest, SessionResponse, UserProfile,
};
use crate::error::Error;
use crate::quota::UsageSnapshot;
use crate::store::AssessmentRecord;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use base64::Engine;
use chrono::Utc;
use tracing::info;

// ============================================================================
// Session lifecycle
// ============================================================================

/// POST /api/auth/session
/// Exchange a one-time redirect credential for a durable session.
///
/// Safe to call twice with the same credential: the session row is keyed by
/// the credential, so the second call returns the session minted by the
/// first instead of creating another.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, Error> {
    let credential = request.session_id.trim();
    if credential.is_empty() {
        return Err(Error::Validation("session_id must not be empty".into()));
    }

    let profile = state.identity.resolve(credential).await?;

    let now = Utc::now();
    let user = state.db.upsert_user(
        &profile.id,
        &profile.email,
        &profile.name,
        profile.picture.as_deref(),
        now,
    )?;

    let session = state.db.create_session(
        credential,
        &profile.session_token,
        &user.id,
        now,
        state.session_ttl,
    )?;

    info!("Session created for user {}", user.id);

    Ok(Json(SessionResponse {
        session_token: session.session_token,
        user: UserProfile::from(user),
    }))
}

/// GET /api/auth/me
/// Current authenticated user
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, Error> {
    let user = state.authenticate(&headers)?;
    Ok(Json(UserProfile::from(user)))
}

/// POST /api/auth/logout
/// Invalidate the current session server-side
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, Error> {
    let token = bearer_token(&headers)
        .ok_or_else(|| Error::Authentication("missing bearer token".to_string()))?;

    // Delete whatever the token maps to; an already-dead session still logs
    // out cleanly
    let existed = state.db.delete_session(token)?;
    if existed {
        info!("Session invalidated");
    }

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
    }))
}

// ============================================================================
// Usage
// ============================================================================

/// GET /api/usage
/// Quota snapshot for the current user; read-only
pub async fn usage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UsageSnapshot>, Error> {
    let user = state.authenticate(&headers)?;
    let snapshot = state.ledger.peek(&user.id, user.plan, Utc::now())?;
    Ok(Json(snapshot))
}

// ============================================================================
// Assessments
// ============================================================================

/// POST /api/assessments
/// Create an assessment. Passes through the quota gate; a refusal has no
/// side effects and is distinguishable from every other failure by its
/// `quota_exceeded` wire code.
pub async fn create_assessment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewAssessmentRequest>,
) -> Result<impl IntoResponse, Error> {
    let user = state.authenticate(&headers)?;

    if request.recording_time == 0 {
        return Err(Error::Validation("recording_time must be positive".into()));
    }
    let audio = base64::engine::general_purpose::STANDARD
        .decode(&request.audio_base64)
        .map_err(|e| Error::Validation(format!("audio_base64 is not valid base64: {e}")))?;
    if audio.is_empty() {
        return Err(Error::Validation("audio payload is empty".into()));
    }

    let receipt = state
        .gate
        .submit(&user, &audio, &request.recording_mode, request.recording_time)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /api/assessments/:assessment_id
/// Stored assessment record, visible only to its owner
pub async fn get_assessment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assessment_id): Path<String>,
) -> Result<Json<AssessmentRecord>, Error> {
    let user = state.authenticate(&headers)?;

    match state.db.assessment(&assessment_id)? {
        Some(record) if record.user_id == user.id => Ok(Json(record)),
        // Hide other users' records behind the same 404 as missing ones
        _ => Err(Error::NotFound(format!(
            "assessment {assessment_id} not found"
        ))),
    }
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
