use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[strum(serialize = "detector")]
    Detector,
    #[strum(serialize = "tabular")]
    Tabular,
    #[strum(serialize = "weekly")]
    Weekly,
}

/// Body of a successful `/api/pestwatch_yolo` call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectionResponse {
    pub pest_class: String,
    pub suggestion: String,
    pub annotated_image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResponse {
    pub prediction: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// Feature values arrive from free-text form inputs, so they stay untyped here.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PestPredictionRequest {
    pub feature1: Option<serde_json::Value>,
    pub feature2: Option<serde_json::Value>,
    pub feature3: Option<serde_json::Value>,
    pub feature4: Option<serde_json::Value>,
    pub feature5: Option<serde_json::Value>,
}

impl PestPredictionRequest {
    pub fn features(&self) -> [Option<&serde_json::Value>; 5] {
        [
            self.feature1.as_ref(),
            self.feature2.as_ref(),
            self.feature3.as_ref(),
            self.feature4.as_ref(),
            self.feature5.as_ref(),
        ]
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WeekPredictionRequest {
    /// `None` only when the field is absent; an explicit `null` is kept.
    #[serde(default, deserialize_with = "present")]
    pub week: Option<serde_json::Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelStatus {
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub models: std::collections::BTreeMap<String, ModelStatus>,
}
