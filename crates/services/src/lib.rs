#![forbid(unsafe_code)]

pub mod assessment;
pub mod error;
pub mod export;
pub mod results;

pub use assess_core::Clock;

pub use assessment::{
    Answer, AnswerOutcome, AnswerResult, AssessmentEngine, AssessmentProgress, EngineConfig,
    EngineStatus, QuestionView,
};
pub use error::{EngineError, ExportError};
pub use export::{
    ExportRow, HttpResultSink, HttpSinkConfig, InMemoryResultSink, ResponseKind, ResultSink,
    export_rows, report_to_json, rows_to_json,
};
pub use results::{PublishOutcome, ResultPublisher};
