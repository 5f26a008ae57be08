mod config;
mod engine;
mod progress;
mod view;

pub use crate::error::EngineError;
pub use config::EngineConfig;
pub use engine::{Answer, AnswerOutcome, AnswerResult, AssessmentEngine};
pub use progress::{AssessmentProgress, EngineStatus};
pub use view::QuestionView;
