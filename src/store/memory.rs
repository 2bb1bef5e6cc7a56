//! In-memory store with the same semantics as the Postgres one.
//!
//! Every mutation happens under a single write lock, which is what keeps the
//! one-open-session-per-user check and the insert atomic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{OpenOutcome, StoreError, TimerStore, UserId, UserStore};
use crate::auth::repo_types::{NewUser, User};
use crate::leaderboard::range::TimeRange;
use crate::leaderboard::repo_types::{AttemptCount, BestTime};
use crate::timer::repo_types::TimingSession;

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    sessions: Vec<TimingSession>,
    next_user_id: i64,
    next_session_id: i64,
}

impl Tables {
    fn user_mut(&mut self, pred: impl Fn(&User) -> bool) -> Option<&mut User> {
        self.users.iter_mut().find(|u| pred(u))
    }

    /// Finished sessions in `range`, grouped per user id.
    fn finished_by_user(&self, range: Option<TimeRange>) -> HashMap<i64, Vec<i64>> {
        let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
        for s in &self.sessions {
            let Some(elapsed) = s.elapsed_ms else { continue };
            if range.map_or(true, |r| r.contains(s.started_at)) {
                grouped.entry(s.user_id).or_default().push(elapsed);
            }
        }
        grouped
    }

    fn username(&self, id: i64) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl MemoryStore {
    /// Number of open sessions held for `user_id`.
    pub async fn open_count(&self, user_id: UserId) -> usize {
        self.tables
            .read()
            .await
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_open())
            .count()
    }

    /// Inserts an already finished session, bypassing the engine.
    pub async fn insert_finished(
        &self,
        user_id: UserId,
        started_at: i64,
        ended_at: i64,
    ) -> TimingSession {
        let mut t = self.tables.write().await;
        t.next_session_id += 1;
        let session = TimingSession {
            id: t.next_session_id,
            user_id,
            started_at,
            ended_at: Some(ended_at),
            elapsed_ms: Some(ended_at - started_at),
        };
        t.sessions.push(session.clone());
        session
    }
}

#[async_trait]
impl TimerStore for MemoryStore {
    async fn find_open_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<TimingSession>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.sessions
            .iter()
            .find(|s| s.user_id == user_id && s.is_open())
            .cloned())
    }

    async fn open_session(
        &self,
        user_id: UserId,
        started_at: i64,
    ) -> Result<OpenOutcome, StoreError> {
        let mut t = self.tables.write().await;
        if t.sessions.iter().any(|s| s.user_id == user_id && s.is_open()) {
            return Ok(OpenOutcome::AlreadyOpen);
        }
        t.next_session_id += 1;
        let session = TimingSession {
            id: t.next_session_id,
            user_id,
            started_at,
            ended_at: None,
            elapsed_ms: None,
        };
        t.sessions.push(session.clone());
        Ok(OpenOutcome::Started(session))
    }

    async fn finish_session(
        &self,
        session_id: i64,
        ended_at: i64,
        elapsed_ms: i64,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        match t
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.is_open())
        {
            Some(s) => {
                s.ended_at = Some(ended_at);
                s.elapsed_ms = Some(elapsed_ms);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_sessions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TimingSession>, StoreError> {
        let t = self.tables.read().await;
        let mut rows: Vec<TimingSession> = t
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn best_times(&self, range: Option<TimeRange>) -> Result<Vec<BestTime>, StoreError> {
        let t = self.tables.read().await;
        let mut best: Vec<(i64, i64)> = t
            .finished_by_user(range)
            .into_iter()
            .filter_map(|(user_id, times)| times.into_iter().min().map(|m| (user_id, m)))
            .collect();
        best.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(best
            .into_iter()
            .filter_map(|(user_id, best_ms)| {
                t.username(user_id).map(|name| (name.to_string(), best_ms))
            })
            .enumerate()
            .map(|(i, (username, best_ms))| BestTime {
                rank: i as i64 + 1,
                username,
                best_ms,
            })
            .collect())
    }

    async fn attempt_counts(
        &self,
        range: Option<TimeRange>,
    ) -> Result<Vec<AttemptCount>, StoreError> {
        let t = self.tables.read().await;
        let mut counts: Vec<(i64, i64)> = t
            .finished_by_user(range)
            .into_iter()
            .map(|(user_id, times)| (user_id, times.len() as i64))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(counts
            .into_iter()
            .filter_map(|(user_id, count)| t.username(user_id).map(|n| (n.to_string(), count)))
            .enumerate()
            .map(|(i, (username, count))| AttemptCount {
                rank: i as i64 + 1,
                count,
                username,
            })
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.username == new.username) {
            return Err(StoreError::Duplicate("username"));
        }
        if t.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Duplicate("email"));
        }
        t.next_user_id += 1;
        let user = User {
            id: t.next_user_id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            confirmed: false,
            one_time_code: Some(new.one_time_code),
            auth_token: None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.iter().any(|u| u.username == username))
    }

    async fn confirm_one_time_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write().await;
        let found = t.user_mut(|u| u.email == email && u.one_time_code.as_deref() == Some(code));
        Ok(found.map(|u| {
            u.one_time_code = None;
            u.confirmed = true;
            u.clone()
        }))
    }

    async fn issue_one_time_code(
        &self,
        username: &str,
        email: &str,
        code: &str,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        match t.user_mut(|u| u.username == username && u.email == email) {
            Some(u) => {
                u.one_time_code = Some(code.to_string());
                u.auth_token = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reset_password(
        &self,
        email: &str,
        code: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write().await;
        let found = t.user_mut(|u| u.email == email && u.one_time_code.as_deref() == Some(code));
        Ok(found.map(|u| {
            u.password_hash = password_hash.to_string();
            u.one_time_code = None;
            u.confirmed = true;
            u.clone()
        }))
    }

    async fn set_auth_token(&self, id: UserId, token: Option<&str>) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if let Some(u) = t.user_mut(|u| u.id == id) {
            u.auth_token = token.map(str::to_string);
            if token.is_some() {
                u.one_time_code = None;
            }
        }
        Ok(())
    }

    async fn auth_token_matches(&self, id: UserId, token: &str) -> Result<bool, StoreError> {
        let t = self.tables.read().await;
        Ok(t
            .users
            .iter()
            .any(|u| u.id == id && u.auth_token.as_deref() == Some(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "hash".into(),
            one_time_code: format!("code-{name}"),
        }
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_rejected() {
        let store = MemoryStore::new();
        store.create_user(new_user("ada")).await.unwrap();

        let err = store.create_user(new_user("ada")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("username")));

        let mut other = new_user("grace");
        other.email = "ada@example.com".into();
        let err = store.create_user(other).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("email")));
    }

    #[tokio::test]
    async fn one_time_code_and_auth_token_are_exclusive() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ada")).await.unwrap();

        store.set_auth_token(user.id, Some("tok")).await.unwrap();
        let u = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(u.auth_token.as_deref(), Some("tok"));
        assert!(u.one_time_code.is_none());

        assert!(store
            .issue_one_time_code("ada", "ada@example.com", "fresh")
            .await
            .unwrap());
        let u = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(u.auth_token.is_none());
        assert_eq!(u.one_time_code.as_deref(), Some("fresh"));
        assert!(!store.auth_token_matches(user.id, "tok").await.unwrap());
    }

    #[tokio::test]
    async fn second_open_is_reported_not_inserted() {
        let store = MemoryStore::new();
        let first = store.open_session(1, 10).await.unwrap();
        assert!(matches!(first, OpenOutcome::Started(_)));
        assert_eq!(store.open_session(1, 20).await.unwrap(), OpenOutcome::AlreadyOpen);
        assert_eq!(store.open_count(1).await, 1);
        // other users are unaffected
        assert!(matches!(store.open_session(2, 20).await.unwrap(), OpenOutcome::Started(_)));
    }

    #[tokio::test]
    async fn finish_only_applies_to_open_sessions() {
        let store = MemoryStore::new();
        let OpenOutcome::Started(s) = store.open_session(1, 100).await.unwrap() else {
            panic!("expected a new session");
        };
        assert!(store.finish_session(s.id, 350, 250).await.unwrap());
        assert!(!store.finish_session(s.id, 999, 899).await.unwrap());
        let rows = store.list_sessions(1, 10).await.unwrap();
        assert_eq!(rows[0].elapsed_ms, Some(250));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let store = MemoryStore::new();
        store.insert_finished(1, 100, 200).await;
        store.insert_finished(1, 300, 450).await;
        store.insert_finished(1, 500, 510).await;
        let rows = store.list_sessions(1, 2).await.unwrap();
        let starts: Vec<i64> = rows.iter().map(|s| s.started_at).collect();
        assert_eq!(starts, vec![500, 300]);
    }
}
