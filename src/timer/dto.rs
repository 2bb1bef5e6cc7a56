use serde::{Deserialize, Serialize};

use crate::timer::repo_types::TimingSession;

/// Elapsed time split for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElapsedDisplay {
    pub minutes: i64,
    pub seconds: i64,
    /// Tenths of a second, 0..=9.
    pub tenths: i64,
}

impl ElapsedDisplay {
    pub fn from_millis(ms: i64) -> Self {
        Self {
            minutes: ms / 60_000 % 60,
            seconds: ms / 1_000 % 60,
            tenths: ms / 100 % 10,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartedResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StoppedResponse {
    pub elapsed_ms: i64,
    pub display: ElapsedDisplay,
}

#[derive(Debug, Serialize)]
pub struct SessionItem {
    pub id: i64,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub elapsed_ms: Option<i64>,
    pub display: Option<ElapsedDisplay>,
}

impl From<TimingSession> for SessionItem {
    fn from(s: TimingSession) -> Self {
        Self {
            id: s.id,
            started_at: s.started_at,
            ended_at: s.ended_at,
            elapsed_ms: s.elapsed_ms,
            display: s.elapsed_ms.map(ElapsedDisplay::from_millis),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}
