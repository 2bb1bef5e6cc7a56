//! Stair-run stopwatch service: per-user timers and leaderboards over HTTP.

pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod notify;
pub mod state;
pub mod store;
pub mod timer;
