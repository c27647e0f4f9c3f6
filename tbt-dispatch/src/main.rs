//! tbt-dispatch - Inference Trigger Service
//!
//! Receives patient-record write events from the remote store's change feed
//! and schedules asynchronous AI inference tasks, exactly-once-effectively,
//! on the external queue.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tbt_dispatch::tasks::CloudTasksQueue;
use tbt_dispatch::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tbt-dispatch (Inference Trigger) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    // Config is validated at enqueue time, not here: the service must boot
    // and serve /health even with an incomplete environment.
    info!(
        "Target model version: {}",
        tbt_dispatch::config::target_model_version()
    );

    let state = AppState::new(Arc::new(CloudTasksQueue::new()));
    let app = tbt_dispatch::build_router(state);

    let port: u16 = std::env::var("TBT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on http://0.0.0.0:{port}");
    info!("Health check: http://0.0.0.0:{port}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
