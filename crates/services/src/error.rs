//! Shared error types for the services crate.

use thiserror::Error;

use assess_core::gate::GateError;
use assess_core::ledger::LedgerError;
use assess_core::model::ContentError;
use assess_core::routing::RoutingError;
use assess_core::snapshot::SnapshotError;
use storage::repository::StorageError;

/// Errors emitted by `AssessmentEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("assessment already completed")]
    Completed,
    #[error("no answer selected")]
    NoSelection,
    #[error("option {0} is not one of the four answers")]
    InvalidOption(usize),
    #[error("no question at level {level}, track {audio}, question {question}")]
    Cursor {
        level: usize,
        audio: usize,
        question: usize,
    },
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Whether the host can prompt for a retry without losing progress.
    ///
    /// Content and routing failures end the assessment.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EngineError::Routing(_)
                | EngineError::Content(_)
                | EngineError::Completed
                | EngineError::Cursor { .. }
        )
    }
}

/// Errors emitted by result export and submission.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExportError {
    #[error("result could not be serialized: {0}")]
    Serialize(String),
    #[error("result submission failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
