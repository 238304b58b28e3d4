//! SQLite persistence for users, sessions, usage, and assessments
//!
//! One connection behind a process-wide mutex, WAL mode for concurrent
//! readers. The two writes that carry correctness invariants are expressed
//! as single conditional statements so they stay atomic even if the callers
//! race:
//! - session creation is keyed by the one-time exchange credential
//!   (UNIQUE + ON CONFLICT DO NOTHING), so one credential can never mint
//!   two sessions;
//! - usage consumption only increments while `consumed < limit`, so two
//!   concurrent requests can never jointly exceed the cap.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::quota::PlanType;

/// An authenticated account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub plan: PlanType,
    pub created_at: DateTime<Utc>,
}

/// A durable session minted from one exchange credential
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A stored assessment and, once processed, its report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub id: String,
    pub user_id: String,
    pub recording_mode: String,
    pub recording_time: u32,
    pub processed: bool,
    pub transcription: Option<String>,
    pub analysis: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// SQLite-backed storage shared by the HTTP handlers
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and initialize the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        // WAL for concurrent readers alongside the single writer
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// In-memory database for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id         TEXT PRIMARY KEY,
                email      TEXT NOT NULL UNIQUE,
                name       TEXT NOT NULL,
                picture    TEXT,
                plan       TEXT NOT NULL DEFAULT 'free',
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                session_token TEXT PRIMARY KEY,
                credential    TEXT NOT NULL UNIQUE,
                user_id       TEXT NOT NULL REFERENCES users(id),
                created_at    INTEGER NOT NULL,
                expires_at    INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS usage (
                user_id    TEXT NOT NULL,
                period_key TEXT NOT NULL,
                plan       TEXT NOT NULL,
                consumed   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, period_key)
            );

            CREATE TABLE IF NOT EXISTS assessments (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL REFERENCES users(id),
                recording_mode TEXT NOT NULL,
                recording_time INTEGER NOT NULL,
                processed      INTEGER NOT NULL DEFAULT 0,
                transcription  TEXT,
                analysis       TEXT,
                error          TEXT,
                created_at     INTEGER NOT NULL,
                processed_at   INTEGER
            );",
        )?;
        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Create the account on first login, or return the existing one.
    ///
    /// Accounts are keyed by email: a returning user keeps their original id
    /// and plan no matter what the identity provider hands back.
    pub fn upsert_user(
        &self,
        id: &str,
        email: &str,
        name: &str,
        picture: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, email, name, picture, plan, created_at)
             VALUES (?1, ?2, ?3, ?4, 'free', ?5)
             ON CONFLICT(email) DO NOTHING",
            params![id, email, name, picture, now.timestamp()],
        )?;
        let user = conn.query_row(
            "SELECT id, email, name, picture, plan, created_at FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )?;
        Ok(user)
    }

    pub fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, email, name, picture, plan, created_at FROM users WHERE id = ?1",
                params![user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Plan-upgrade contract: the only mutation path for `User.plan`.
    pub fn set_plan(&self, user_id: &str, plan: PlanType) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET plan = ?2 WHERE id = ?1",
            params![user_id, plan.as_str()],
        )?;
        anyhow::ensure!(changed == 1, "no such user: {user_id}");
        info!("User {} moved to {} plan", user_id, plan);
        Ok(())
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Mint a session for an exchange credential, exactly once.
    ///
    /// A credential that already produced a session returns the stored
    /// session unchanged, regardless of the token offered this time. This is
    /// the server-side backstop for clients whose in-flight guard was
    /// bypassed (e.g. two separate processes).
    pub fn create_session(
        &self,
        credential: &str,
        session_token: &str,
        user_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<SessionRecord> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (session_token, credential, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(credential) DO NOTHING",
            params![
                session_token,
                credential,
                user_id,
                now.timestamp(),
                (now + ttl).timestamp()
            ],
        )?;
        let session = conn.query_row(
            "SELECT session_token, user_id, created_at, expires_at
             FROM sessions WHERE credential = ?1",
            params![credential],
            |row| {
                Ok(SessionRecord {
                    session_token: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: timestamp_to_datetime(row.get(2)?),
                    expires_at: timestamp_to_datetime(row.get(3)?),
                })
            },
        )?;
        Ok(session)
    }

    /// Resolve a bearer token to its user, if the session is still valid
    pub fn session_user(&self, session_token: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT u.id, u.email, u.name, u.picture, u.plan, u.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.session_token = ?1 AND s.expires_at > ?2",
                params![session_token, now.timestamp()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Invalidate a session. Returns whether one existed.
    pub fn delete_session(&self, session_token: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE session_token = ?1",
            params![session_token],
        )?;
        Ok(deleted > 0)
    }

    /// Number of live session rows for a credential (test support)
    pub fn sessions_for_credential(&self, credential: &str) -> Result<u32> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE credential = ?1",
            params![credential],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ========================================================================
    // Usage
    // ========================================================================

    /// Atomically consume one unit if capacity remains in the period.
    ///
    /// Returns the new consumed count, or `None` (row unchanged) when the
    /// period is already at the limit. The check and the increment are one
    /// UPDATE statement.
    pub fn try_consume_unit(
        &self,
        user_id: &str,
        period_key: &str,
        plan: PlanType,
        limit: u32,
    ) -> Result<Option<u32>> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO usage (user_id, period_key, plan, consumed)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(user_id, period_key) DO NOTHING",
            params![user_id, period_key, plan.as_str()],
        )?;
        let changed = conn.execute(
            "UPDATE usage SET consumed = consumed + 1
             WHERE user_id = ?1 AND period_key = ?2 AND consumed < ?3",
            params![user_id, period_key, limit],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let consumed = conn.query_row(
            "SELECT consumed FROM usage WHERE user_id = ?1 AND period_key = ?2",
            params![user_id, period_key],
            |row| row.get(0),
        )?;
        Ok(Some(consumed))
    }

    /// Read consumed units without mutating anything
    pub fn consumed_units(&self, user_id: &str, period_key: &str) -> Result<u32> {
        let conn = self.conn.lock();
        let consumed = conn
            .query_row(
                "SELECT consumed FROM usage WHERE user_id = ?1 AND period_key = ?2",
                params![user_id, period_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(consumed.unwrap_or(0))
    }

    // ========================================================================
    // Assessments
    // ========================================================================

    /// Record an admitted assessment before handing it to the processor
    pub fn insert_assessment(
        &self,
        id: &str,
        user_id: &str,
        recording_mode: &str,
        recording_time: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO assessments (id, user_id, recording_mode, recording_time, processed, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![id, user_id, recording_mode, recording_time, now.timestamp()],
        )?;
        Ok(())
    }

    pub fn mark_assessment_processed(
        &self,
        id: &str,
        transcription: &str,
        analysis: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE assessments
             SET processed = 1, transcription = ?2, analysis = ?3, processed_at = ?4
             WHERE id = ?1",
            params![id, transcription, analysis.to_string(), now.timestamp()],
        )?;
        Ok(())
    }

    pub fn mark_assessment_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE assessments SET processed = 1, error = ?2, processed_at = ?3 WHERE id = ?1",
            params![id, error, now.timestamp()],
        )?;
        Ok(())
    }

    /// Number of stored assessments for a user (test support)
    pub fn assessments_for_user(&self, user_id: &str) -> Result<u32> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM assessments WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn assessment(&self, id: &str) -> Result<Option<AssessmentRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, user_id, recording_mode, recording_time, processed,
                        transcription, analysis, error, created_at, processed_at
                 FROM assessments WHERE id = ?1",
                params![id],
                |row| {
                    let analysis: Option<String> = row.get(6)?;
                    Ok(AssessmentRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        recording_mode: row.get(2)?,
                        recording_time: row.get(3)?,
                        processed: row.get::<_, i64>(4)? != 0,
                        transcription: row.get(5)?,
                        analysis: analysis.and_then(|a| serde_json::from_str(&a).ok()),
                        error: row.get(7)?,
                        created_at: timestamp_to_datetime(row.get(8)?),
                        processed_at: row
                            .get::<_, Option<i64>>(9)?
                            .map(timestamp_to_datetime),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let plan: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        picture: row.get(3)?,
        plan: PlanType::parse(&plan).unwrap_or(PlanType::Free),
        created_at: timestamp_to_datetime(row.get(5)?),
    })
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
