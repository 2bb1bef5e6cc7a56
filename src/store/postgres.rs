use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::{OpenOutcome, StoreError, TimerStore, UserId, UserStore};
use crate::auth::repo_types::{NewUser, User};
use crate::leaderboard::range::TimeRange;
use crate::leaderboard::repo_types::{AttemptCount, BestTime};
use crate::timer::repo_types::TimingSession;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, confirmed, one_time_code, auth_token, created_at";

/// Store backed by Postgres. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .context("connect to database")?;
        Ok(Self::from_pool(pool, timeout))
    }

    pub fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(map_unique_violation),
            Err(_) => Err(StoreError::Timeout(op)),
        }
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some(c) if c.contains("username") => StoreError::Duplicate("username"),
                Some(c) if c.contains("email") => StoreError::Duplicate("email"),
                _ => StoreError::Database(err),
            };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl TimerStore for PgStore {
    async fn find_open_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<TimingSession>, StoreError> {
        self.bounded(
            "find_open_session",
            sqlx::query_as::<_, TimingSession>(
                r#"
                SELECT id, user_id, started_at, ended_at, elapsed_ms
                FROM timing_sessions
                WHERE user_id = $1 AND ended_at IS NULL
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn open_session(
        &self,
        user_id: UserId,
        started_at: i64,
    ) -> Result<OpenOutcome, StoreError> {
        // The partial unique index turns a racing second insert into a no-op.
        let row = self
            .bounded(
                "open_session",
                sqlx::query_as::<_, TimingSession>(
                    r#"
                    INSERT INTO timing_sessions (user_id, started_at)
                    VALUES ($1, $2)
                    ON CONFLICT (user_id) WHERE ended_at IS NULL DO NOTHING
                    RETURNING id, user_id, started_at, ended_at, elapsed_ms
                    "#,
                )
                .bind(user_id)
                .bind(started_at)
                .fetch_optional(&self.pool),
            )
            .await?;
        Ok(match row {
            Some(session) => OpenOutcome::Started(session),
            None => OpenOutcome::AlreadyOpen,
        })
    }

    async fn finish_session(
        &self,
        session_id: i64,
        ended_at: i64,
        elapsed_ms: i64,
    ) -> Result<bool, StoreError> {
        let res = self
            .bounded(
                "finish_session",
                sqlx::query(
                    r#"
                    UPDATE timing_sessions
                    SET ended_at = $2, elapsed_ms = $3
                    WHERE id = $1 AND ended_at IS NULL
                    "#,
                )
                .bind(session_id)
                .bind(ended_at)
                .bind(elapsed_ms)
                .execute(&self.pool),
            )
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_sessions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TimingSession>, StoreError> {
        self.bounded(
            "list_sessions",
            sqlx::query_as::<_, TimingSession>(
                r#"
                SELECT id, user_id, started_at, ended_at, elapsed_ms
                FROM timing_sessions
                WHERE user_id = $1
                ORDER BY started_at DESC, id DESC
                LIMIT $2
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn best_times(&self, range: Option<TimeRange>) -> Result<Vec<BestTime>, StoreError> {
        self.bounded(
            "best_times",
            sqlx::query_as::<_, BestTime>(
                r#"
                SELECT ROW_NUMBER() OVER (ORDER BY MIN(t.elapsed_ms) ASC, u.id ASC) AS rank,
                       u.username AS username,
                       MIN(t.elapsed_ms) AS best_ms
                FROM timing_sessions t
                INNER JOIN users u ON u.id = t.user_id
                WHERE t.elapsed_ms IS NOT NULL
                  AND ($1::BIGINT IS NULL OR t.started_at >= $1)
                  AND ($2::BIGINT IS NULL OR t.started_at < $2)
                GROUP BY u.id, u.username
                ORDER BY rank
                "#,
            )
            .bind(range.map(|r| r.from_ms))
            .bind(range.map(|r| r.to_ms))
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn attempt_counts(
        &self,
        range: Option<TimeRange>,
    ) -> Result<Vec<AttemptCount>, StoreError> {
        self.bounded(
            "attempt_counts",
            sqlx::query_as::<_, AttemptCount>(
                r#"
                SELECT ROW_NUMBER() OVER (ORDER BY COUNT(t.id) DESC, u.id ASC) AS rank,
                       COUNT(t.id) AS count,
                       u.username AS username
                FROM timing_sessions t
                INNER JOIN users u ON u.id = t.user_id
                WHERE t.elapsed_ms IS NOT NULL
                  AND ($1::BIGINT IS NULL OR t.started_at >= $1)
                  AND ($2::BIGINT IS NULL OR t.started_at < $2)
                GROUP BY u.id, u.username
                ORDER BY rank
                "#,
            )
            .bind(range.map(|r| r.from_ms))
            .bind(range.map(|r| r.to_ms))
            .fetch_all(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, one_time_code) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        self.bounded(
            "create_user",
            sqlx::query_as::<_, User>(&sql)
                .bind(&new.username)
                .bind(&new.email)
                .bind(&new.password_hash)
                .bind(&new.one_time_code)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        self.bounded(
            "find_user_by_id",
            sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        self.bounded(
            "find_user_by_email",
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        self.bounded(
            "username_exists",
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn confirm_one_time_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET one_time_code = NULL, confirmed = TRUE \
             WHERE email = $1 AND one_time_code = $2 RETURNING {USER_COLUMNS}"
        );
        self.bounded(
            "confirm_one_time_code",
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .bind(code)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn issue_one_time_code(
        &self,
        username: &str,
        email: &str,
        code: &str,
    ) -> Result<bool, StoreError> {
        let res = self
            .bounded(
                "issue_one_time_code",
                sqlx::query(
                    r#"
                    UPDATE users SET one_time_code = $3, auth_token = NULL
                    WHERE username = $1 AND email = $2
                    "#,
                )
                .bind(username)
                .bind(email)
                .bind(code)
                .execute(&self.pool),
            )
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn reset_password(
        &self,
        email: &str,
        code: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET password_hash = $3, one_time_code = NULL, confirmed = TRUE \
             WHERE email = $1 AND one_time_code = $2 RETURNING {USER_COLUMNS}"
        );
        self.bounded(
            "reset_password",
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .bind(code)
                .bind(password_hash)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn set_auth_token(&self, id: UserId, token: Option<&str>) -> Result<(), StoreError> {
        self.bounded(
            "set_auth_token",
            sqlx::query(
                r#"
                UPDATE users
                SET auth_token = $2,
                    one_time_code = CASE WHEN $2::TEXT IS NULL THEN one_time_code ELSE NULL END
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(token)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn auth_token_matches(&self, id: UserId, token: &str) -> Result<bool, StoreError> {
        self.bounded(
            "auth_token_matches",
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND auth_token = $2)",
            )
            .bind(id)
            .bind(token)
            .fetch_one(&self.pool),
        )
        .await
    }
}
