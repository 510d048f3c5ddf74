//! # Drishti Server
//!
//! The dashboard's only contracts with the engine: recent candles, the
//! current plan (or HOLD/WAIT), repository stats, liveness, and a throttled
//! tick/outcome stream.

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::{ApiState, SymbolHandle};

/// Build the router with all dashboard routes.
pub fn create_app(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3_600));

    Router::new()
        .route("/api/candles", get(routes::get_candles))
        .route("/api/levels", get(routes::get_levels))
        .route("/api/stats", get(routes::get_stats))
        .route("/api/health", get(routes::get_health))
        .route("/ws/stream", get(routes::ws_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: ApiState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    info!(addr = %listener.local_addr()?, "dashboard server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
