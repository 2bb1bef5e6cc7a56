use serde::{Deserialize, Serialize};

use crate::leaderboard::range::Period;
use crate::leaderboard::repo_types::BestTime;
use crate::timer::dto::ElapsedDisplay;

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<Period>,
}

#[derive(Debug, Serialize)]
pub struct FastestItem {
    pub rank: i64,
    pub username: String,
    pub best_ms: i64,
    pub display: ElapsedDisplay,
}

impl From<BestTime> for FastestItem {
    fn from(b: BestTime) -> Self {
        Self {
            rank: b.rank,
            display: ElapsedDisplay::from_millis(b.best_ms),
            username: b.username,
            best_ms: b.best_ms,
        }
    }
}
