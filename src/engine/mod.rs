pub mod calibration;
pub mod consolidate;
pub mod evaluation;
pub mod gate;
pub mod kelly;
pub mod line_movement;
pub mod matching;
pub mod normalize;
pub mod odds;
pub mod recommend;
pub mod refit;
pub mod sport;
pub mod types;
pub mod uncertainty;

pub use calibration::{CalibrationHandle, RecalibrationParams};
pub use recommend::{analyze_event, AnalysisError, EngineSettings, EventAnalysis};
pub use types::{EventInput, ModelPrediction};
