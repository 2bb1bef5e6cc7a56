use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    state::AppState,
};

use super::dto::{ElapsedDisplay, HistoryQuery, SessionItem, StartedResponse, StoppedResponse};

const MAX_HISTORY: i64 = 200;

pub fn timer_routes() -> Router<AppState> {
    Router::new()
        .route("/timer", get(current_timer))
        .route("/timer/start", post(start_timer))
        .route("/timer/stop", post(stop_timer))
        .route("/timer/history", get(history))
}

#[instrument(skip(state))]
pub async fn start_timer(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<(StatusCode, Json<StartedResponse>), AppError> {
    state.timers.start_timer(user_id).await?;
    Ok((StatusCode::ACCEPTED, Json(StartedResponse { status: "started" })))
}

#[instrument(skip(state))]
pub async fn stop_timer(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<StoppedResponse>, AppError> {
    let elapsed_ms = state.timers.end_timer(user_id).await?;
    Ok(Json(StoppedResponse {
        elapsed_ms,
        display: ElapsedDisplay::from_millis(elapsed_ms),
    }))
}

#[instrument(skip(state))]
pub async fn current_timer(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Option<SessionItem>>, AppError> {
    let open = state.timers.current_timer(user_id).await?;
    Ok(Json(open.map(SessionItem::from)))
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<SessionItem>>, AppError> {
    let limit = q.limit.clamp(1, MAX_HISTORY);
    let rows = state.timers.history(user_id, limit).await?;
    Ok(Json(rows.into_iter().map(SessionItem::from).collect()))
}
