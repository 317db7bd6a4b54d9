mod backend;
mod config;
mod models;
mod orchestrator;
mod pdf;
mod preview;
mod progress;
mod routes;
mod session;

use anyhow::Context;
use routes::{router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::backend::BuilderClient;
use crate::config::AppConfig;
use crate::orchestrator::Orchestrator;
use crate::session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::load()?;
    tracing::info!(
        api_base = %config.api_base,
        asset_base = %config.asset_base,
        min_chars = config.limits.min_chars,
        max_chars = config.limits.max_chars,
        "Loaded configuration"
    );

    let client = BuilderClient::new(config.api_base.clone(), config.request_timeout)
        .context("failed to build backend client")?;
    let state = AppState {
        session: Arc::new(Session::new(Orchestrator::new(client, config.limits))),
        asset_base: Arc::from(config.asset_base.as_str()),
    };

    let app = router(state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")
}
