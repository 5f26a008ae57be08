use std::fmt;

use assess_core::model::{LevelId, Placement};

/// Sidebar status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Testing(LevelId),
    Complete(Placement),
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Testing(level) => write!(f, "Testing {level}"),
            EngineStatus::Complete(_) => f.write_str("Complete"),
        }
    }
}

/// Position within the current level, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentProgress {
    pub level: LevelId,
    /// 1-based.
    pub track_number: usize,
    pub tracks_in_level: usize,
    /// 1-based, within the track.
    pub question_number: usize,
    pub answered_total: usize,
    pub levels_administered: usize,
}
