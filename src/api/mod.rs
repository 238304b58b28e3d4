//! Wire contract between the client and the HTTP API
//!
//! These types are serialized by the server handlers and decoded by
//! [`crate::client::ApiClient`]; keeping them in one place keeps the two
//! sides honest about field names.

use serde::{Deserialize, Serialize};

use crate::quota::PlanType;
use crate::store::User;

/// `POST /api/auth/session` request: the one-time credential from the
/// redirect URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}

/// Successful exchange: the durable token plus who it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_token: String,
    #[serde(flatten)]
    pub user: UserProfile,
}

/// The user fields exposed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub plan: PlanType,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            email: user.email,
            name: user.name,
            picture: user.picture,
            plan: user.plan,
        }
    }
}

/// `POST /api/assessments` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssessmentRequest {
    /// Recorded audio, base64-encoded; decoded and validated at the gate
    pub audio_base64: String,

    /// Which prompt mode produced the recording (free-form label)
    pub recording_mode: String,

    /// Recording length in seconds
    pub recording_time: u32,
}

/// Acknowledgement that an assessment was admitted and processed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentReceipt {
    pub assessment_id: String,
    pub status: String,
    /// Units left in the current quota period
    pub remaining: u32,
}

/// `POST /api/auth/logout` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}
