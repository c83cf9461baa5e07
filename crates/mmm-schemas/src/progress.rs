//! Progress events streamed on stdout while a run advances.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Pipeline stage announced to the supervising process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Stage {
    LoadingData,
    DataLoaded,
    DataPrepared,
    ModelConfigured,
    TrainingStarted,
    ResultsExtracted,
    ResultsSaved,
    Completed,
    /// Terminal failure. Carries no percentage of its own; the event repeats
    /// the last reported value.
    Error,
}

impl Stage {
    /// Percentage reported when this stage is reached.
    pub const fn progress(self) -> Option<u8> {
        match self {
            Stage::LoadingData => Some(10),
            Stage::DataLoaded => Some(20),
            Stage::DataPrepared => Some(35),
            Stage::ModelConfigured => Some(40),
            Stage::TrainingStarted => Some(45),
            Stage::ResultsExtracted => Some(80),
            Stage::ResultsSaved => Some(90),
            Stage::Completed => Some(100),
            Stage::Error => None,
        }
    }
}

/// One line of the progress stream.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ProgressEvent {
    pub status: Stage,
    /// 0 to 100, never decreasing within a run.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub message: Option<String>,
}
