//! HTTP surface for the breach-notification workflow.
//!
//! A thin axum router over [`BreachWorkflowService`](breachflow_workflow::BreachWorkflowService).
//! Tenant and actor identity are taken from headers set by an upstream
//! gateway; see [`extract`].

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod extract;
pub mod notifier;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use extract::{ACTOR_HEADER, ApiJson, RequestContext, TENANT_HEADER};
pub use notifier::LogNotifier;
pub use state::AppState;

/// Builds the application router.
pub fn app(state: AppState) -> Router {
    use routes::breaches;

    Router::new()
        .route("/health", get(routes::health))
        .route("/breaches", post(breaches::create_breach))
        .route(
            "/breaches/submit-for-verification/{id}",
            post(breaches::submit_for_verification),
        )
        .route("/breaches/verify/{id}", post(breaches::verify_breach))
        .route(
            "/breaches/approve-data-principal-notification/{id}",
            post(breaches::approve_data_principal_notification),
        )
        .route(
            "/breaches/send-dpb-notification/{id}",
            post(breaches::send_dpb_notification),
        )
        .route(
            "/breaches/send-data-principal-notifications/{id}",
            post(breaches::send_data_principal_notifications),
        )
        .route("/breaches/sla-status/{id}", get(breaches::sla_status))
        .route("/breaches/breach-register", get(breaches::breach_register))
        .route("/breaches/escalate-overdue", post(breaches::escalate_overdue))
        .route("/breaches/{id}", get(breaches::get_breach))
        .route("/breaches/{id}/timeline", get(breaches::get_timeline))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not found") })
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the router until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "breachflow listening");

    axum::serve(listener, app(state))
        .await
        .context("HTTP server failed")?;
    Ok(())
}
