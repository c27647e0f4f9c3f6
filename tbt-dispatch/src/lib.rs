//! tbt-dispatch library interface
//!
//! Server-side trigger service: observes patient-record write events,
//! evaluates the enqueue decision, and dispatches idempotent inference
//! tasks to the external queue.

pub mod config;
pub mod decision;
pub mod error;
pub mod tasks;
pub mod trigger;

pub use crate::error::{ApiError, ApiResult};

use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tasks::{TaskDispatcher, TaskQueue};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<TaskDispatcher>,
}

impl AppState {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            dispatcher: Arc::new(TaskDispatcher::new(queue)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/trigger/patients/:patient_id",
            post(trigger::handle_patient_write),
        )
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "time": chrono::Utc::now(),
    }))
}
