use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::engine::types::{OddsSnapshot, ValidatedOutcome};

use crate::engine::line_movement::RepredictionDecision;

/// One recorded re-prediction for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepredictionRecord {
    pub id: Option<i64>,
    pub event_id: String,
    pub attempted_at: DateTime<Utc>,
    /// Whether the new prediction replaced the standing one.
    pub superseded: bool,
}

/// The prediction currently in force for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub event_id: String,
    pub prediction: crate::engine::ModelPrediction,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Result of a gated re-prediction attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RepredictionAttempt {
    pub decision: RepredictionDecision,
    pub superseded: bool,
    /// The standing prediction after this attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standing: Option<StoredPrediction>,
}
