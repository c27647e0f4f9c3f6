//! Idempotent inference-task creation against the external queue
//!
//! Task identity is the deterministic name derived from
//! (patient id, target model version); the queue rejects a second task with
//! the same name, and that rejection is the designed de-dup path, not an
//! error. Provider-specific failure codes never leave this module.

use crate::config::DispatchConfig;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;
use tbt_common::models::InferenceTaskRequest;
use tbt_common::task_name;
use tracing::{info, warn};

/// Provider response to a create-task request, stripped of provider codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateTaskStatus {
    Created,
    /// A task with this name already exists (duplicate-name conflict)
    AlreadyExists,
}

/// Queue provider boundary.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn create_task(
        &self,
        task_name: &str,
        request: &InferenceTaskRequest,
    ) -> ApiResult<CreateTaskStatus>;
}

/// Cloud Tasks REST implementation.
///
/// Configuration is read per call so validation happens at the point of use
/// and a service started with an incomplete environment still serves its
/// other routes.
pub struct CloudTasksQueue {
    http: reqwest::Client,
}

impl CloudTasksQueue {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for CloudTasksQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for CloudTasksQueue {
    async fn create_task(
        &self,
        task_name: &str,
        request: &InferenceTaskRequest,
    ) -> ApiResult<CreateTaskStatus> {
        let config = DispatchConfig::from_env()?;
        let queue_path = config.queue_path();
        let url = format!("{}/v2/{}/tasks", config.tasks_api_base, queue_path);

        let payload = serde_json::to_vec(request).map_err(tbt_common::Error::from)?;
        let body = serde_json::json!({
            "task": {
                "name": format!("{queue_path}/tasks/{task_name}"),
                "httpRequest": {
                    "url": config.infer_url,
                    "httpMethod": "POST",
                    "headers": { "Content-Type": "application/json" },
                    "oidcToken": {
                        "serviceAccountEmail": config.task_invoker_sa,
                        "audience": config.infer_url,
                    },
                    "body": base64::engine::general_purpose::STANDARD.encode(payload),
                }
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Queue(format!("create-task request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Ok(CreateTaskStatus::AlreadyExists);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::Queue(format!(
                "create-task returned {status}: {detail}"
            )));
        }
        Ok(CreateTaskStatus::Created)
    }
}

/// What an enqueue attempt achieved. `Duplicate` completes the caller's
/// intent: the task already exists, so nothing further is owed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Created { task_name: String },
    Duplicate { task_name: String },
}

impl DispatchOutcome {
    pub fn task_name(&self) -> &str {
        match self {
            DispatchOutcome::Created { task_name } | DispatchOutcome::Duplicate { task_name } => {
                task_name
            }
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DispatchOutcome::Duplicate { .. })
    }
}

/// Idempotent task dispatch. Performs no retry: a provider failure
/// propagates with context and delivery-retry policy stays external.
pub struct TaskDispatcher {
    queue: Arc<dyn TaskQueue>,
}

impl TaskDispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Create (or find already created) the inference task for a patient and
    /// model version. The same (patient_id, target_model_version) pair
    /// always produces the same task name, whatever `source_write_time`
    /// says, so repeated calls never yield two live tasks.
    pub async fn enqueue(
        &self,
        patient_id: &str,
        target_model_version: &str,
        source_write_time: Option<String>,
    ) -> ApiResult<DispatchOutcome> {
        let name = task_name(patient_id, target_model_version);
        let request = InferenceTaskRequest {
            patient_id: patient_id.to_string(),
            target_model_version: target_model_version.to_string(),
            source_write_time,
        };

        match self.queue.create_task(&name, &request).await {
            Ok(CreateTaskStatus::Created) => {
                info!(patient_id, target_model_version, task_name = %name, "Inference task created");
                Ok(DispatchOutcome::Created { task_name: name })
            }
            Ok(CreateTaskStatus::AlreadyExists) => {
                info!(patient_id, target_model_version, task_name = %name, "Inference task already queued");
                Ok(DispatchOutcome::Duplicate { task_name: name })
            }
            Err(e) => {
                warn!(patient_id, target_model_version, error = %e, "Inference task dispatch failed");
                Err(e)
            }
        }
    }
}
