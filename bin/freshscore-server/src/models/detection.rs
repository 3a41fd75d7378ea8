//! Detection API types and the model-facing result contract.

use std::sync::LazyLock;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::TaskRecord;

/// Detection categories a caller may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DetectionType {
    Fruit,
    Vegetable,
}

/// Request body for `POST /api/image/detect`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DetectImageRequest {
    /// Publicly reachable URL of the image to score.
    pub image_url: String,
    pub detection_type: DetectionType,
}

/// Response body for `POST /api/image/detect`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DetectionTaskResponse {
    /// Identifier to poll via `GET /api/task/{task_id}`.
    pub task_id: String,
}

/// Task snapshot returned by `GET /api/task/{task_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskResponse {
    pub task_id: String,
    /// `pending`, `running`, `success` or `failed`.
    pub status: String,
    /// Raw model output, echoed as JSON; present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRecord {
    pub fn to_response(&self) -> TaskResponse {
        TaskResponse {
            task_id: self.task_id.clone(),
            status: self.status.as_str().to_owned(),
            // Stored results are model JSON; fall back to a plain string if
            // a row somehow holds non-JSON content.
            result: self.result.as_ref().map(|s| {
                serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone()))
            }),
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
        }
    }
}

// ── structured model output ──────────────────────────────────────────────────

/// Structured verdict the model is required to return for every detection.
///
/// `deny_unknown_fields` makes the generated schema close the object
/// (`additionalProperties: false`), which the provider's strict mode
/// requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DetectImageResponse {
    /// Common name of the object detected in the image.
    pub name: String,
    /// Scientific name of the object detected in the image.
    pub scientific_name: String,
    /// Category of the object, e.g. fruit or vegetable.
    pub category: String,
    /// Botanical family of the object.
    pub family: String,
    /// Per-criterion quality judgments.
    pub metrics: Vec<Metric>,
    pub overall_score: OverallScore,
    pub expert_advice: ExpertAdvice,
}

/// One scored quality criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Metric {
    /// Machine-friendly metric name, e.g. `ripeness`.
    pub name: String,
    /// Display label for the metric.
    pub label: String,
    /// Score from 0 to 10.
    pub value: f64,
    /// What in the image justifies the score.
    pub basis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OverallScore {
    /// Aggregate score derived from the metrics.
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExpertAdvice {
    /// How to store the produce.
    pub storage: String,
    /// Notable nutritional properties.
    pub nutrition: String,
    /// How to pick a good specimen.
    pub selection: String,
}

/// JSON schema handed to the model provider as the response contract.
///
/// A pure function of [`DetectImageResponse`], computed once at first use.
pub static DETECT_IMAGE_RESPONSE_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    serde_json::to_value(schemars::schema_for!(DetectImageResponse))
        .expect("detection response schema serialises to JSON")
});

// ── Tests ──────────────────────────────────────────────────────────────────────
