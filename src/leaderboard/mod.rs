use crate::state::AppState;
use axum::Router;

mod aggregator;
pub mod dto;
pub mod handlers;
pub mod range;
pub mod repo_types;

pub use aggregator::Leaderboard;

pub fn router() -> Router<AppState> {
    handlers::leaderboard_routes()
}
