//! Patient and upload document models
//!
//! These structs mirror the documents stored in the remote patient collection.
//! Write events from other roles may carry fields this build does not know
//! about, so the top-level records keep unknown fields in a flattened map and
//! round-trip them untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved patient id for uploads captured before a patient record exists.
///
/// Every upload carrying this value must be reassigned exactly once when the
/// owning patient record is created.
pub const SENTINEL_PATIENT_ID: &str = "__unassigned__";

/// Maximum length of a queue task name accepted by the provider.
pub const MAX_TASK_NAME_LEN: usize = 490;

/// Risk factor codes understood by the scorer.
pub mod factor {
    pub const PRIOR_TB: &str = "priorTb";
    pub const FAMILY_TB: &str = "familyTb";
    pub const DIABETES: &str = "diabetes";
    pub const SMOKER: &str = "smoker";
    pub const HIV: &str = "hiv";
    pub const COVID: &str = "covid";
}

/// Patient identity fields captured at screening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub phone: String,
    pub village: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id_last4: Option<String>,
}

/// Temperature unit recorded by the capturing device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

/// Vitals captured at screening (all optional)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Vitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate_bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_temperature_unit: Option<TemperatureUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoughNature {
    Dry,
    Wet,
    BloodStained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeverHistory {
    None,
    LowGrade,
    HighGrade,
}

/// Answer to a yes/no screening question or risk factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FactorAnswer {
    Yes,
    No,
    Unknown,
    Declined,
}

/// Clinical questionnaire answers
///
/// Risk factors appear in two historical shapes: a flat list of factor codes
/// (older clients) and a keyed answer map. [`normalized_risk_factors`] merges
/// both; nothing else should branch on the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Clinical {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cough_duration_weeks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cough_nature: Option<CoughNature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fever_history: Option<FeverHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_sweats: Option<FactorAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_loss: Option<FactorAnswer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub physical_signs: Vec<String>,
    /// Legacy flat list: presence of a code means "yes"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_factors: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub risk_factor_answers: BTreeMap<String, FactorAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_observations: Option<String>,
}

/// Merge the legacy flat factor list with the keyed answer map.
///
/// A code in the flat list counts as an explicit "yes"; the answer map wins
/// when both carry the same code. Executed once at the boundary so the scorer
/// never branches on document shape.
pub fn normalized_risk_factors(clinical: &Clinical) -> BTreeMap<String, FactorAnswer> {
    let mut merged = BTreeMap::new();
    for code in &clinical.risk_factors {
        merged.insert(code.clone(), FactorAnswer::Yes);
    }
    for (code, answer) in &clinical.risk_factor_answers {
        merged.insert(code.clone(), *answer);
    }
    merged
}

/// Reference to a captured audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRef {
    pub audio_file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InferenceStatus {
    Processing,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

/// AI result sub-record, written back by the inference worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AiResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_status: Option<InferenceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    /// Worker-written fields this build does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Case workflow statuses, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageStatus {
    Pending,
    AiTriaged,
    TestQueued,
    LabDone,
    DoctorFinalized,
    AshaActionInProgress,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triage_status: Option<TriageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_scheduled_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_notes: Option<String>,
}

/// A patient screening record, keyed by a stable patient identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient_id: String,
    pub demographics: Demographics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<Vitals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical: Option<Clinical>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio: Vec<AudioRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    pub created_at: DateTime<Utc>,
    /// Date the screening was collected in the field (may predate sync)
    pub collection_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    /// Fields written by other roles this build does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PatientRecord {
    /// Stamp a provisional risk score and level computed from the screening
    /// answers. The inference worker overwrites these fields later; until
    /// then `model_version` stays unset so the record is still dispatchable.
    pub fn refresh_risk(&mut self) {
        let score = crate::risk::risk_score(self);
        let ai = self.ai.get_or_insert_with(AiResult::default);
        ai.risk_score = Some(score);
        ai.risk_level = Some(crate::risk::risk_level(score));
    }

    /// The risk level used for local secondary indexing: the AI-assigned
    /// level when present, otherwise one computed from the screening answers.
    pub fn effective_risk_level(&self) -> RiskLevel {
        if let Some(level) = self.ai.as_ref().and_then(|ai| ai.risk_level) {
            return level;
        }
        crate::risk::risk_level(crate::risk::risk_score(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapturerRole {
    Asha,
    Doctor,
    LabTech,
}

impl CapturerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapturerRole::Asha => "ASHA",
            CapturerRole::Doctor => "DOCTOR",
            CapturerRole::LabTech => "LAB_TECH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Audio,
    Image,
    Report,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Report => "report",
        }
    }
}

/// A pending media upload captured on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: String,
    /// May hold [`SENTINEL_PATIENT_ID`] until the owning patient is created
    pub patient_id: String,
    pub role: CapturerRole,
    pub kind: MediaKind,
    pub file_name: String,
    pub mime_type: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl UploadRecord {
    /// Media captured before the owning patient record exists, keyed to
    /// [`SENTINEL_PATIENT_ID`] until reassignment.
    pub fn new_sentinel(
        role: CapturerRole,
        kind: MediaKind,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            upload_id: uuid::Uuid::new_v4().to_string(),
            patient_id: SENTINEL_PATIENT_ID.to_string(),
            role,
            kind,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Payload of an inference task on the external queue.
///
/// Logical identity is `(patient_id, target_model_version)` — never the
/// write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceTaskRequest {
    pub patient_id: String,
    pub target_model_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_write_time: Option<String>,
}

/// Derive the deterministic queue task name for a patient/model pair.
///
/// Characters outside `[A-Za-z0-9_-]` become `_`; the result is truncated to
/// [`MAX_TASK_NAME_LEN`]. This string is the de-duplication key at the queue
/// boundary, so equal inputs must always produce equal output.
pub fn task_name(patient_id: &str, target_model_version: &str) -> String {
    let raw = format!("{patient_id}-{target_model_version}");
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    name.truncate(MAX_TASK_NAME_LEN);
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_clinical() -> Clinical {
        Clinical {
            risk_factors: vec![factor::SMOKER.to_string(), factor::HIV.to_string()],
            risk_factor_answers: BTreeMap::from([
                (factor::HIV.to_string(), FactorAnswer::Declined),
                (factor::PRIOR_TB.to_string(), FactorAnswer::Yes),
            ]),
            ..Clinical::default()
        }
    }

    #[test]
    fn normalization_merges_both_shapes_with_map_winning() {
        let merged = normalized_risk_factors(&minimal_clinical());
        assert_eq!(merged.get(factor::SMOKER), Some(&FactorAnswer::Yes));
        assert_eq!(merged.get(factor::PRIOR_TB), Some(&FactorAnswer::Yes));
        // Map answer overrides the legacy list entry
        assert_eq!(merged.get(factor::HIV), Some(&FactorAnswer::Declined));
        assert_eq!(merged.get(factor::DIABETES), None);
    }

    #[test]
    fn task_name_is_sanitized_and_bounded() {
        let name = task_name("p/1:ä", "model v2.0");
        assert_eq!(name, "p_1__-model_v2_0");

        let long = task_name(&"x".repeat(600), "v1");
        assert_eq!(long.len(), MAX_TASK_NAME_LEN);
        assert!(long
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn task_name_is_deterministic() {
        assert_eq!(task_name("P123", "v1"), task_name("P123", "v1"));
    }

    #[test]
    fn unknown_document_fields_round_trip() {
        let doc = serde_json::json!({
            "patient_id": "P1",
            "demographics": {
                "name": "A", "age": 40, "gender": "F",
                "phone": "9", "village": "V"
            },
            "created_at": "2026-01-01T00:00:00Z",
            "collection_date": "2026-01-01T00:00:00Z",
            "assigned_doctor_id": "doc-7"
        });
        let record: PatientRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(
            record.extra.get("assigned_doctor_id").and_then(|v| v.as_str()),
            Some("doc-7")
        );
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["assigned_doctor_id"], "doc-7");
    }
}
