use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct BestTime {
    pub rank: i64,
    pub username: String,
    pub best_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct AttemptCount {
    pub rank: i64,
    pub count: i64,
    pub username: String,
}
