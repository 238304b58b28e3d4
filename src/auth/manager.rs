use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::credential::extract_session_id;
use super::token_store::TokenStore;
use crate::api::UserProfile;
use crate::client::ApiClient;
use crate::error::Error;

/// Who this client currently believes it is
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// Not yet determined (fresh start, or offline with a stored token)
    Unknown,
    Authenticated(UserProfile),
    Unauthenticated,
}

/// What became of one inbound URL
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// URL carried no credential; state untouched
    NoCredential,
    /// Another exchange was in flight; this trigger was dropped
    DroppedInFlight,
    /// This credential was already handled (success or failure); dropped
    AlreadyHandled,
    /// Exchange succeeded; token stored and state authenticated
    SignedIn(UserProfile),
    /// Exchange failed; token cleared, state unauthenticated, no retry
    Failed(Error),
}

/// Turns inbound redirects into an authenticated session, exactly once per
/// credential.
///
/// Both trigger sources (the app's launch URL and live deep-link events)
/// funnel through [`handle_url`](Self::handle_url). A single-slot guard
/// serializes them: whoever flips the `exchanging` flag owns the exchange,
/// and every other trigger inside that window is dropped rather than queued.
/// The last-credential memo additionally drops re-deliveries of an already
/// handled credential after the flight completes.
pub struct SessionManager {
    api: Arc<ApiClient>,
    tokens: Arc<TokenStore>,
    exchanging: AtomicBool,
    last_credential: Mutex<Option<String>>,
    state: RwLock<AuthState>,
}

impl SessionManager {
    pub fn new(api: Arc<ApiClient>, tokens: Arc<TokenStore>) -> Self {
        Self {
            api,
            tokens,
            exchanging: AtomicBool::new(false),
            last_credential: Mutex::new(None),
            state: RwLock::new(AuthState::Unknown),
        }
    }

    pub async fn auth_state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    /// App-start entry point: exchange the launch URL's credential if there
    /// is one, otherwise validate whatever token survived the last run.
    pub async fn start(&self, launch_url: Option<&str>) -> Result<AuthState, Error> {
        if let Some(url) = launch_url {
            match self.handle_url(url).await {
                ExchangeOutcome::NoCredential => {}
                _ => return Ok(self.auth_state().await),
            }
        }
        self.check_session().await
    }

    /// Handle one inbound URL from any trigger source.
    ///
    /// Never runs two exchanges concurrently and never exchanges the same
    /// credential twice; dropped triggers leave all state untouched.
    pub async fn handle_url(&self, url: &str) -> ExchangeOutcome {
        let credential = match extract_session_id(url) {
            Some(c) => c,
            None => return ExchangeOutcome::NoCredential,
        };

        // Single-slot guard: losing the compare_exchange means another
        // trigger owns the flight, so this one is dropped even if it names
        // the same credential.
        if self
            .exchanging
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Exchange already in flight, dropping trigger");
            return ExchangeOutcome::DroppedInFlight;
        }

        let already_handled = self.last_credential.lock().as_deref() == Some(credential.as_str());
        if already_handled {
            self.exchanging.store(false, Ordering::SeqCst);
            debug!("Credential already handled, dropping trigger");
            return ExchangeOutcome::AlreadyHandled;
        }
        *self.last_credential.lock() = Some(credential.clone());

        info!("Exchanging session credential");
        let result = self.exchange(&credential).await;

        // The guard must release on every exit path or no later sign-in can
        // ever start
        self.exchanging.store(false, Ordering::SeqCst);

        match result {
            Ok(profile) => {
                info!("Signed in as {}", profile.email);
                ExchangeOutcome::SignedIn(profile)
            }
            Err(err) => {
                warn!("Session exchange failed: {}", err);
                ExchangeOutcome::Failed(err)
            }
        }
    }

    async fn exchange(&self, credential: &str) -> Result<UserProfile, Error> {
        match self.api.create_session(credential).await {
            Ok(response) => {
                if let Err(e) = self.tokens.set(&response.session_token) {
                    // The in-memory slot is already set; losing the disk
                    // copy only costs persistence across restarts
                    warn!("Failed to persist session token: {}", e);
                }
                *self.state.write().await = AuthState::Authenticated(response.user.clone());
                Ok(response.user)
            }
            Err(err) => {
                if let Err(e) = self.tokens.clear() {
                    warn!("Failed to clear stored token: {}", e);
                }
                *self.state.write().await = AuthState::Unauthenticated;
                Err(err)
            }
        }
    }

    /// Validate the persisted token with the server and settle the auth
    /// state.
    ///
    /// A definitive 401 clears the stored token. A network failure keeps it
    /// and leaves the state `Unknown`: offline is not an authentication
    /// verdict.
    pub async fn check_session(&self) -> Result<AuthState, Error> {
        if self.tokens.get().is_none() {
            *self.state.write().await = AuthState::Unauthenticated;
            return Ok(AuthState::Unauthenticated);
        }

        match self.api.me().await {
            Ok(profile) => {
                let state = AuthState::Authenticated(profile);
                *self.state.write().await = state.clone();
                Ok(state)
            }
            Err(Error::Authentication(reason)) => {
                info!("Stored session rejected ({}), signing out", reason);
                if let Err(e) = self.tokens.clear() {
                    warn!("Failed to clear stored token: {}", e);
                }
                *self.state.write().await = AuthState::Unauthenticated;
                Ok(AuthState::Unauthenticated)
            }
            Err(err) => {
                warn!("Session check inconclusive: {}", err);
                Err(err)
            }
        }
    }

    /// End the session. The server call is best-effort; the local token is
    /// cleared no matter what it answers.
    pub async fn logout(&self) -> Result<(), Error> {
        if let Err(e) = self.api.logout().await {
            warn!("Server logout failed, clearing local session anyway: {}", e);
        }
        self.tokens.clear().map_err(Error::Internal)?;
        *self.state.write().await = AuthState::Unauthenticated;
        info!("Logged out");
        Ok(())
    }
}
