//! Client-side session handling
//!
//! The pieces a device needs to turn an inbound redirect into an
//! authenticated session and keep the credential safe afterwards:
//! - `extract_session_id` pulls the one-time credential out of a launch or
//!   deep-link URL
//! - `SessionManager` performs the exchange exactly once per credential,
//!   serializing concurrent triggers
//! - `TokenStore` owns the durable session token

mod credential;
mod manager;
mod token_store;

pub use credential::extract_session_id;
pub use manager::{AuthState, ExchangeOutcome, SessionManager};
pub use token_store::TokenStore;
