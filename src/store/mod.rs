//! Persistence seams for users and timing sessions.
//!
//! Both traits are object-safe so [`crate::state::AppState`] can hold either
//! the Postgres store or the in-memory one behind an `Arc<dyn ...>`.

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::repo_types::{NewUser, User};
use crate::leaderboard::range::TimeRange;
use crate::leaderboard::repo_types::{AttemptCount, BestTime};
use crate::timer::repo_types::TimingSession;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type UserId = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage call `{0}` timed out")]
    Timeout(&'static str),

    #[error("{0} already taken")]
    Duplicate(&'static str),
}

/// Result of a conflict-tolerant insert of a new open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Started(TimingSession),
    AlreadyOpen,
}

#[async_trait]
pub trait TimerStore: Send + Sync {
    /// The session of `user_id` whose end timestamp is still null, if any.
    async fn find_open_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<TimingSession>, StoreError>;

    /// Inserts an open session unless the user already has one.
    async fn open_session(
        &self,
        user_id: UserId,
        started_at: i64,
    ) -> Result<OpenOutcome, StoreError>;

    /// Sets end and elapsed on a still-open session. Returns false when the
    /// session was not open anymore.
    async fn finish_session(
        &self,
        session_id: i64,
        ended_at: i64,
        elapsed_ms: i64,
    ) -> Result<bool, StoreError>;

    async fn list_sessions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TimingSession>, StoreError>;

    async fn best_times(&self, range: Option<TimeRange>) -> Result<Vec<BestTime>, StoreError>;

    async fn attempt_counts(
        &self,
        range: Option<TimeRange>,
    ) -> Result<Vec<AttemptCount>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError>;

    /// Clears a matching one-time code and marks the user confirmed.
    async fn confirm_one_time_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Replaces the one-time code (and drops the auth token) for the user
    /// identified by both username and email.
    async fn issue_one_time_code(
        &self,
        username: &str,
        email: &str,
        code: &str,
    ) -> Result<bool, StoreError>;

    async fn reset_password(
        &self,
        email: &str,
        code: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Sets or clears the single active auth token. Setting one drops any
    /// pending one-time code.
    async fn set_auth_token(&self, id: UserId, token: Option<&str>) -> Result<(), StoreError>;

    async fn auth_token_matches(&self, id: UserId, token: &str) -> Result<bool, StoreError>;
}
