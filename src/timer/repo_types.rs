use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One start-to-finish attempt. Timestamps are UTC milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TimingSession {
    pub id: i64,
    pub user_id: i64,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub elapsed_ms: Option<i64>,
}

impl TimingSession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}
