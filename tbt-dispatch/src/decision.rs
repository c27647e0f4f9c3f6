//! Pure enqueue predicate over patient write events
//!
//! Deterministic function of (before, after, target model version). The
//! dedup burden sits on the task name, so this predicate only has to be
//! correct, not exactly-once: at-least-once trigger delivery may evaluate
//! the same event repeatedly.

use tbt_common::models::{InferenceStatus, PatientRecord};

/// Outcome of evaluating a write event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub enqueue: bool,
    pub reason: &'static str,
}

impl Decision {
    fn skip(reason: &'static str) -> Self {
        Self {
            enqueue: false,
            reason,
        }
    }

    fn go(reason: &'static str) -> Self {
        Self {
            enqueue: true,
            reason,
        }
    }
}

/// Decide whether a patient write warrants scheduling inference.
pub fn decide(
    before: Option<&PatientRecord>,
    after: Option<&PatientRecord>,
    target_model_version: &str,
) -> Decision {
    let Some(after) = after else {
        return Decision::skip("deleted");
    };

    let after_version = after
        .ai
        .as_ref()
        .and_then(|ai| ai.model_version.as_deref());
    let after_status = after.ai.as_ref().and_then(|ai| ai.inference_status);

    // A write that only populated the AI sub-record with the target version
    // is the inference worker's own write-back; re-enqueueing it would loop.
    let inputs_unchanged = before.is_some_and(|b| strip_ai(b) == strip_ai(after));
    if inputs_unchanged && after_version == Some(target_model_version) {
        return Decision::skip("ai_writeback");
    }

    if !inference_inputs_ready(after) {
        return Decision::skip("inputs_not_ready");
    }

    if after_version == Some(target_model_version) {
        return match after_status {
            Some(InferenceStatus::Success) => Decision::skip("already_current"),
            Some(InferenceStatus::Processing) => Decision::skip("in_progress"),
            // Failed or unset with the target version recorded: re-dispatch
            _ => Decision::go("retry_after_failure"),
        };
    }

    if before.is_none() {
        Decision::go("created")
    } else if !inputs_unchanged {
        Decision::go("inputs_changed")
    } else {
        Decision::go("model_version_stale")
    }
}

/// Inference needs a completed questionnaire and at least one audio
/// reference with a resolvable storage location.
fn inference_inputs_ready(record: &PatientRecord) -> bool {
    let has_clinical = record.clinical.is_some();
    let has_audio = record.audio.iter().any(|a| {
        a.storage_uri
            .as_deref()
            .is_some_and(|uri| !uri.trim().is_empty())
    });
    has_clinical && has_audio
}

/// The document as compared for "did inference inputs change": everything
/// except the AI sub-record.
fn strip_ai(record: &PatientRecord) -> serde_json::Value {
    // Serializing a PatientRecord cannot fail; fall back to null rather
    // than panic if it ever does.
    let mut value = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        map.remove("ai");
        // Sync bookkeeping is not an inference input either
        map.remove("synced_at");
    }
    value
}
