use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{error::AppError, state::AppState};

use super::dto::{FastestItem, PeriodQuery};
use super::range::Period;
use super::repo_types::AttemptCount;

pub fn leaderboard_routes() -> Router<AppState> {
    Router::new()
        .route("/leaderboard/fastest", get(fastest))
        .route("/leaderboard/attempts", get(attempts))
}

#[instrument(skip(state))]
pub async fn fastest(
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<Vec<FastestItem>>, AppError> {
    let rows = state
        .leaderboard
        .best_times_for(q.period.unwrap_or(Period::Today))
        .await?;
    Ok(Json(rows.into_iter().map(FastestItem::from).collect()))
}

#[instrument(skip(state))]
pub async fn attempts(
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<Vec<AttemptCount>>, AppError> {
    let rows = state
        .leaderboard
        .attempt_counts_for(q.period.unwrap_or(Period::All))
        .await?;
    Ok(Json(rows))
}
