//! `breachflow serve`: run the HTTP API.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use breachflow_config::BreachflowConfig;
use breachflow_server::AppState;
use tracing::info;

pub fn run(config: &BreachflowConfig, bind: Option<&str>) -> Result<()> {
    let bind = bind.unwrap_or(&config.server.bind_address);
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind:?}"))?;

    let state =
        AppState::from_config(&config.workflow).context("failed to build breach workflow")?;
    info!(
        fanout_workers = config.workflow.fanout_workers,
        dpb = %config.workflow.dpb_contact_email,
        "breach workflow ready"
    );

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(breachflow_server::serve(state, addr))
}
