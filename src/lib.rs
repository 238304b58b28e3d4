pub mod api;
pub mod assess;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod quota;
pub mod server;
pub mod store;

pub use api::{
    AssessmentReceipt, LogoutResponse, NewAssessmentRequest, SessionRequest, SessionResponse,
    UserProfile,
};
pub use assess::{AssessmentGate, AssessmentProcessor, AssessmentReport, HttpAssessmentProcessor};
pub use auth::{extract_session_id, AuthState, ExchangeOutcome, SessionManager, TokenStore};
pub use client::ApiClient;
pub use config::Config;
pub use error::{Error, ErrorBody};
pub use quota::{Consumption, PeriodKind, PlanType, QuotaPolicy, UsageLedger, UsageSnapshot};
pub use server::{create_router, AppState, HttpIdentityProvider, IdentityProfile, IdentityProvider};
pub use store::{AssessmentRecord, Database, SessionRecord, User};
