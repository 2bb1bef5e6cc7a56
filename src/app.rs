use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{Request, Response};
use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Span;

use crate::state::AppState;
use crate::{auth, leaderboard, timer};

/// Routes served under `/api/v1`.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(auth::router())
        .merge(timer::router())
        .merge(leaderboard::router())
}

pub fn build_app(state: AppState) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<_>| {
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri(),
                status = tracing::field::Empty,
            )
        })
        .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
            let status = res.status();
            span.record("status", tracing::field::display(status));
            let latency_ms = latency.as_millis() as u64;
            match status.as_u16() {
                500.. => tracing::error!(%status, latency_ms, "response"),
                400..=499 => tracing::warn!(%status, latency_ms, "response"),
                _ => tracing::info!(%status, latency_ms, "response"),
            }
        });

    Router::new()
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(trace)
}

/// Binds `host:port` and serves until ctrl-c.
pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "stairtimer listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
