//! Write-event trigger endpoint
//!
//! Each invocation is a stateless unit: parse the event, evaluate the pure
//! enqueue decision, dispatch when warranted. Delivery is at-least-once, so
//! the same write may arrive more than once; the deterministic task name
//! absorbs the duplicates. A dispatch failure is logged and answered 200 —
//! retrying is the delivery system's job only if we asked for it, and this
//! layer deliberately does not.

use crate::config;
use crate::decision::decide;
use crate::error::ApiResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tbt_common::PatientRecord;
use tracing::{info, warn};

/// A patient-record write event as delivered by the store's change feed.
#[derive(Debug, Deserialize)]
pub struct WriteEvent {
    /// Prior document; absent on creation
    #[serde(default)]
    pub before: Option<PatientRecord>,
    /// New document; absent on deletion
    #[serde(default)]
    pub after: Option<PatientRecord>,
    /// When the write happened (ISO-8601), forwarded onto the task payload
    #[serde(default)]
    pub write_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub patient_id: String,
    pub enqueued: bool,
    pub reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_error: Option<String>,
}

/// `POST /trigger/patients/{patient_id}`
pub async fn handle_patient_write(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Json(event): Json<WriteEvent>,
) -> ApiResult<Json<TriggerResponse>> {
    let target_model_version = config::target_model_version();
    let decision = decide(
        event.before.as_ref(),
        event.after.as_ref(),
        &target_model_version,
    );

    // Every decision is logged, whatever the outcome
    info!(
        patient_id = %patient_id,
        target_model_version = %target_model_version,
        enqueue = decision.enqueue,
        reason = decision.reason,
        has_before = event.before.is_some(),
        has_after = event.after.is_some(),
        "Evaluated patient write"
    );

    if !decision.enqueue {
        return Ok(Json(TriggerResponse {
            patient_id,
            enqueued: false,
            reason: decision.reason,
            task_name: None,
            duplicate: false,
            dispatch_error: None,
        }));
    }

    match state
        .dispatcher
        .enqueue(&patient_id, &target_model_version, event.write_time)
        .await
    {
        Ok(outcome) => Ok(Json(TriggerResponse {
            patient_id,
            enqueued: true,
            reason: decision.reason,
            duplicate: outcome.is_duplicate(),
            task_name: Some(outcome.task_name().to_string()),
            dispatch_error: None,
        })),
        Err(e) => {
            // Logged, not retried, and not bounced back to the delivery
            // system: local write durability already happened upstream.
            warn!(
                patient_id = %patient_id,
                target_model_version = %target_model_version,
                error = %e,
                "Dispatch failed; leaving retry to external policy"
            );
            Ok(Json(TriggerResponse {
                patient_id,
                enqueued: false,
                reason: decision.reason,
                task_name: None,
                duplicate: false,
                dispatch_error: Some(e.to_string()),
            }))
        }
    }
}
