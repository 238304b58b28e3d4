use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// On-disk form of the persisted credential: one file, one token
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    session_token: String,
    saved_at: DateTime<Utc>,
}

/// Single source of truth for the current session token.
///
/// Holds at most one token. `set`, `clear`, and `get` are atomic with
/// respect to each other: readers see either the previous token or the new
/// one, never a torn state. The in-memory slot is authoritative; the file is
/// written after it so a disk failure degrades durability, not correctness.
pub struct TokenStore {
    current: RwLock<Option<String>>,
    path: Option<PathBuf>,
}

impl TokenStore {
    /// In-memory store with no persistence (tests, throwaway clients)
    pub fn ephemeral() -> Self {
        Self {
            current: RwLock::new(None),
            path: None,
        }
    }

    /// Open a store persisted at `path`, loading any token saved earlier.
    ///
    /// A malformed file is ignored rather than fatal: the user just has to
    /// sign in again.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<StoredToken>(&contents) {
                Ok(stored) => {
                    debug!("Loaded persisted session token from {}", path.display());
                    Some(stored.session_token)
                }
                Err(e) => {
                    warn!("Ignoring malformed token file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read token file {}", path.display()))
            }
        };
        Ok(Self {
            current: RwLock::new(current),
            path: Some(path),
        })
    }

    /// Replace the current token and persist it
    pub fn set(&self, token: &str) -> Result<()> {
        *self.current.write() = Some(token.to_string());
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let stored = StoredToken {
                session_token: token.to_string(),
                saved_at: Utc::now(),
            };
            std::fs::write(path, serde_json::to_string_pretty(&stored)?)
                .with_context(|| format!("Failed to persist token to {}", path.display()))?;
        }
        Ok(())
    }

    /// Drop the current token and remove the persisted copy
    pub fn clear(&self) -> Result<()> {
        *self.current.write() = None;
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove token file {}", path.display()))
                }
            }
        }
        Ok(())
    }

    /// Current token, if any
    pub fn get(&self) -> Option<String> {
        self.current.read().clone()
    }
}
