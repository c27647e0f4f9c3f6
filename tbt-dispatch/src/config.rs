//! Runtime configuration for the dispatch service
//!
//! Validated lazily at the point of use (an enqueue attempt), never at
//! process start: the service must come up and serve `/health` even with an
//! incomplete environment, and unrelated code paths stay usable.

use crate::error::{ApiError, ApiResult};

pub const PROJECT_ID_ENV: &str = "TBT_PROJECT_ID";
pub const INFER_URL_ENV: &str = "TBT_INFER_URL";
pub const TASK_INVOKER_SA_ENV: &str = "TBT_TASK_INVOKER_SA";
pub const TARGET_MODEL_VERSION_ENV: &str = "TBT_TARGET_MODEL_VERSION";
pub const QUEUE_ENV: &str = "TBT_QUEUE";
pub const QUEUE_REGION_ENV: &str = "TBT_QUEUE_REGION";
pub const TASKS_API_BASE_ENV: &str = "TBT_TASKS_API_BASE";

pub const DEFAULT_TARGET_MODEL_VERSION: &str = "medgemma-4b-it-v1";
pub const DEFAULT_QUEUE: &str = "tb-inference";
pub const DEFAULT_QUEUE_REGION: &str = "asia-south1";
pub const DEFAULT_TASKS_API_BASE: &str = "https://cloudtasks.googleapis.com";

/// Fully resolved dispatch configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub project_id: String,
    pub infer_url: String,
    pub task_invoker_sa: String,
    pub target_model_version: String,
    pub queue: String,
    pub queue_region: String,
    pub tasks_api_base: String,
}

impl DispatchConfig {
    /// Read and validate the full configuration from the environment.
    pub fn from_env() -> ApiResult<Self> {
        Ok(Self {
            project_id: require_env(PROJECT_ID_ENV)?,
            infer_url: require_env(INFER_URL_ENV)?,
            task_invoker_sa: require_env(TASK_INVOKER_SA_ENV)?,
            target_model_version: target_model_version(),
            queue: env_or(QUEUE_ENV, DEFAULT_QUEUE),
            queue_region: env_or(QUEUE_REGION_ENV, DEFAULT_QUEUE_REGION),
            tasks_api_base: env_or(TASKS_API_BASE_ENV, DEFAULT_TASKS_API_BASE),
        })
    }

    /// `projects/{p}/locations/{l}/queues/{q}` — the provider queue path
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.queue_region, self.queue
        )
    }
}

/// The model version dispatched tasks target. Defaulted, never fails, so the
/// enqueue decision can run with an otherwise incomplete environment.
pub fn target_model_version() -> String {
    env_or(TARGET_MODEL_VERSION_ENV, DEFAULT_TARGET_MODEL_VERSION)
}

fn require_env(name: &str) -> ApiResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ApiError::Config(format!(
            "missing required environment variable: {name}"
        ))),
    }
}

fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}
