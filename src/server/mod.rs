//! HTTP API server
//!
//! Routes:
//! - POST /api/auth/session - exchange a one-time credential for a session
//! - GET  /api/auth/me - current authenticated user
//! - POST /api/auth/logout - invalidate the session
//! - GET  /api/usage - quota snapshot for the current user
//! - POST /api/assessments - quota-gated assessment creation
//! - GET  /api/assessments/:id - stored assessment record
//! - GET  /health - health check

mod handlers;
mod identity;
mod routes;
mod state;

pub use identity::{HttpIdentityProvider, IdentityProfile, IdentityProvider};
pub use routes::create_router;
pub use state::AppState;
