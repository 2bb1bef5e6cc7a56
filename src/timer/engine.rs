use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::{OpenOutcome, StoreError, TimerStore, UserId};
use crate::timer::repo_types::TimingSession;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("no active timer")]
    NoActiveTimer,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Starts and stops per-user timing sessions.
///
/// The caller is expected to pass a user id already resolved by the auth
/// gateway. Storage failures are returned as-is and never retried here.
#[derive(Clone)]
pub struct TimerEngine {
    store: Arc<dyn TimerStore>,
    clock: Arc<dyn Clock>,
}

impl TimerEngine {
    pub fn new(store: Arc<dyn TimerStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn TimerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Opens a session for `user_id`. Starting while a session is already
    /// open succeeds without creating another one.
    #[instrument(skip(self))]
    pub async fn start_timer(&self, user_id: UserId) -> Result<(), TimerError> {
        if let Some(open) = self.store.find_open_session(user_id).await? {
            debug!(user_id, session_id = open.id, "timer already running");
            return Ok(());
        }

        let started_at = self.clock.now_millis();
        match self.store.open_session(user_id, started_at).await? {
            OpenOutcome::Started(session) => {
                info!(user_id, session_id = session.id, started_at, "timer started");
            }
            OpenOutcome::AlreadyOpen => {
                debug!(user_id, "concurrent start lost the race, timer already running");
            }
        }
        Ok(())
    }

    /// Closes the open session of `user_id` and returns its elapsed
    /// milliseconds.
    #[instrument(skip(self))]
    pub async fn end_timer(&self, user_id: UserId) -> Result<i64, TimerError> {
        let open = self
            .store
            .find_open_session(user_id)
            .await?
            .ok_or(TimerError::NoActiveTimer)?;

        let ended_at = self.clock.now_millis();
        let elapsed = ended_at - open.started_at;
        if !self.store.finish_session(open.id, ended_at, elapsed).await? {
            warn!(user_id, session_id = open.id, "session closed concurrently");
            return Err(TimerError::NoActiveTimer);
        }

        info!(user_id, session_id = open.id, elapsed_ms = elapsed, "timer stopped");
        Ok(elapsed)
    }

    pub async fn current_timer(
        &self,
        user_id: UserId,
    ) -> Result<Option<TimingSession>, TimerError> {
        Ok(self.store.find_open_session(user_id).await?)
    }

    pub async fn history(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TimingSession>, TimerError> {
        Ok(self.store.list_sessions(user_id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::clock::ManualClock;
    use crate::leaderboard::range::TimeRange;
    use crate::leaderboard::repo_types::{AttemptCount, BestTime};
    use crate::store::MemoryStore;

    /// Lets another caller stop the session right after the engine has
    /// looked it up, so the engine's own finish finds it already closed.
    struct StoppedUnderfoot {
        inner: MemoryStore,
        stopped_at: i64,
    }

    #[async_trait]
    impl TimerStore for StoppedUnderfoot {
        async fn find_open_session(
            &self,
            user_id: UserId,
        ) -> Result<Option<TimingSession>, StoreError> {
            let open = self.inner.find_open_session(user_id).await?;
            if let Some(s) = &open {
                let elapsed = self.stopped_at - s.started_at;
                assert!(self.inner.finish_session(s.id, self.stopped_at, elapsed).await?);
            }
            Ok(open)
        }

        async fn open_session(
            &self,
            user_id: UserId,
            started_at: i64,
        ) -> Result<OpenOutcome, StoreError> {
            self.inner.open_session(user_id, started_at).await
        }

        async fn finish_session(
            &self,
            session_id: i64,
            ended_at: i64,
            elapsed_ms: i64,
        ) -> Result<bool, StoreError> {
            self.inner.finish_session(session_id, ended_at, elapsed_ms).await
        }

        async fn list_sessions(
            &self,
            user_id: UserId,
            limit: i64,
        ) -> Result<Vec<TimingSession>, StoreError> {
            self.inner.list_sessions(user_id, limit).await
        }

        async fn best_times(&self, range: Option<TimeRange>) -> Result<Vec<BestTime>, StoreError> {
            self.inner.best_times(range).await
        }

        async fn attempt_counts(
            &self,
            range: Option<TimeRange>,
        ) -> Result<Vec<AttemptCount>, StoreError> {
            self.inner.attempt_counts(range).await
        }
    }

    fn engine_at(ms: i64) -> (TimerEngine, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(ms));
        let engine = TimerEngine::with_clock(store.clone(), clock.clone());
        (engine, store, clock)
    }

    #[tokio::test]
    async fn start_then_end_returns_elapsed() {
        let (engine, store, clock) = engine_at(1_000);
        engine.start_timer(7).await.unwrap();
        clock.set(4_500);

        assert_eq!(engine.end_timer(7).await.unwrap(), 3_500);

        let rows = store.list_sessions(7, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        let s = &rows[0];
        assert_eq!(s.started_at, 1_000);
        assert_eq!(s.ended_at, Some(4_500));
        assert_eq!(s.elapsed_ms, Some(s.ended_at.unwrap() - s.started_at));
    }

    #[tokio::test]
    async fn double_start_keeps_single_open_session() {
        let (engine, store, clock) = engine_at(1_000);
        engine.start_timer(1).await.unwrap();
        clock.advance(200);
        engine.start_timer(1).await.unwrap();

        assert_eq!(store.open_count(1).await, 1);
        let open = engine.current_timer(1).await.unwrap().unwrap();
        assert_eq!(open.started_at, 1_000);
    }

    #[tokio::test]
    async fn end_without_open_session_is_not_found() {
        let (engine, store, _) = engine_at(0);
        store.insert_finished(2, 10, 20).await;

        let err = engine.end_timer(2).await.unwrap_err();
        assert!(matches!(err, TimerError::NoActiveTimer));

        let rows = store.list_sessions(2, 10).await.unwrap();
        assert_eq!(rows[0].ended_at, Some(20));
    }

    #[tokio::test]
    async fn second_end_after_stop_is_not_found() {
        let (engine, _, clock) = engine_at(0);
        engine.start_timer(3).await.unwrap();
        clock.advance(50);
        engine.end_timer(3).await.unwrap();
        assert!(matches!(
            engine.end_timer(3).await.unwrap_err(),
            TimerError::NoActiveTimer
        ));
    }

    #[tokio::test]
    async fn concurrent_starts_open_one_session() {
        let (engine, store, _) = engine_at(5);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.start_timer(9).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.open_count(9).await, 1);
    }

    #[tokio::test]
    async fn restart_after_stop_opens_new_session() {
        let (engine, store, clock) = engine_at(0);
        engine.start_timer(4).await.unwrap();
        clock.advance(100);
        engine.end_timer(4).await.unwrap();
        engine.start_timer(4).await.unwrap();

        assert_eq!(store.open_count(4).await, 1);
        assert_eq!(engine.history(4, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn end_loses_to_concurrent_stop() {
        let inner = MemoryStore::new();
        inner.open_session(6, 1_000).await.unwrap();
        let store = Arc::new(StoppedUnderfoot {
            inner: inner.clone(),
            stopped_at: 2_000,
        });
        let engine = TimerEngine::with_clock(store, Arc::new(ManualClock::new(9_000)));

        let err = engine.end_timer(6).await.unwrap_err();
        assert!(matches!(err, TimerError::NoActiveTimer));

        let rows = inner.list_sessions(6, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ended_at, Some(2_000));
        assert_eq!(rows[0].elapsed_ms, Some(1_000));
    }

    #[tokio::test]
    async fn concurrent_ends_close_session_once() {
        let (engine, store, clock) = engine_at(1_000);
        engine.start_timer(8).await.unwrap();
        clock.set(3_000);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.end_timer(8).await })
            })
            .collect();
        let mut stopped = Vec::new();
        let mut not_found = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(elapsed) => stopped.push(elapsed),
                Err(TimerError::NoActiveTimer) => not_found += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(stopped, vec![2_000]);
        assert_eq!(not_found, 1);

        let rows = store.list_sessions(8, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].elapsed_ms, Some(2_000));
    }
}
