use crate::state::AppState;
use axum::Router;

pub mod dto;
mod engine;
pub mod handlers;
pub mod repo_types;

pub use engine::{TimerEngine, TimerError};

pub fn router() -> Router<AppState> {
    handlers::timer_routes()
}
