//! HTTP service setup and initialization

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

use crate::api::{self, AppState};
use crate::config::Config;

/// Build the router - all boundaries exposed by the service
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(api::get_health))
        // Job/chunk submission boundary
        .route("/api/jobs", post(api::create_job).get(api::list_jobs))
        .route("/api/jobs/reap", post(api::reap_jobs))
        .route("/api/jobs/:id", get(api::get_job))
        .route("/api/jobs/:id/chunks", post(api::submit_chunk))
        .route("/api/jobs/:id/status", post(api::update_job_status))
        // Profile and scoring boundaries
        .route("/api/profiles/:user_id", get(api::get_profile))
        .route(
            "/api/profiles/:user_id/scores",
            get(api::get_scores).post(api::generate_scores),
        )
        // Prompt/chat boundary
        .route("/api/agent/adaptation/:user_id", get(api::get_adaptation))
        .route("/api/agent/chat", post(api::chat))
        .with_state(state)
}

/// Start the HTTP service and run until ctrl-c
pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    let app = build_router(state);

    tracing::info!("Starting service on {}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    tracing::info!("Service shut down gracefully");
    Ok(())
}
