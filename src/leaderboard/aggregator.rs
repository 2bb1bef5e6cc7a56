use std::sync::Arc;

use tracing::{debug, instrument};

use crate::clock::{Clock, SystemClock};
use crate::leaderboard::range::{Period, TimeRange};
use crate::leaderboard::repo_types::{AttemptCount, BestTime};
use crate::store::{StoreError, TimerStore};

/// Read-only rankings over finished sessions.
#[derive(Clone)]
pub struct Leaderboard {
    store: Arc<dyn TimerStore>,
    clock: Arc<dyn Clock>,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn TimerStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn TimerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Each user's fastest finished session, fastest first. Equal times are
    /// ordered by lower user id.
    #[instrument(skip(self))]
    pub async fn best_times(&self, range: Option<TimeRange>) -> Result<Vec<BestTime>, StoreError> {
        let rows = self.store.best_times(range).await?;
        debug!(rows = rows.len(), "best times ranked");
        Ok(rows)
    }

    /// Finished sessions per user, most first. Equal counts are ordered by
    /// lower user id.
    #[instrument(skip(self))]
    pub async fn attempt_counts(
        &self,
        range: Option<TimeRange>,
    ) -> Result<Vec<AttemptCount>, StoreError> {
        let rows = self.store.attempt_counts(range).await?;
        debug!(rows = rows.len(), "attempt counts ranked");
        Ok(rows)
    }

    pub async fn best_times_for(&self, period: Period) -> Result<Vec<BestTime>, StoreError> {
        self.best_times(period.range(self.clock.now_millis())).await
    }

    pub async fn attempt_counts_for(
        &self,
        period: Period,
    ) -> Result<Vec<AttemptCount>, StoreError> {
        self.attempt_counts(period.range(self.clock.now_millis())).await
    }
}
