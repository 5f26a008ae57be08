use std::sync::Arc;
use tracing::{info, warn};

use assess_core::report::AssessmentReport;
use storage::repository::{ResultRepository, ResultRow};

use crate::error::ExportError;
use crate::export::{ResultSink, export_rows};

/// What happened to a completed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub archive_id: i64,
    /// False when no sink is configured or the sink rejected the rows.
    pub submitted: bool,
}

/// Archives completed reports and forwards them to an optional remote sink.
///
/// The archive is authoritative; sink failures are logged and reported in the
/// outcome but never fail the publish.
#[derive(Clone)]
pub struct ResultPublisher {
    archive: Arc<dyn ResultRepository>,
    sink: Option<Arc<dyn ResultSink>>,
}

impl ResultPublisher {
    #[must_use]
    pub fn new(archive: Arc<dyn ResultRepository>) -> Self {
        Self {
            archive,
            sink: None,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// # Errors
    ///
    /// Returns `ExportError::Storage` if the report cannot be archived.
    pub async fn publish(&self, report: &AssessmentReport) -> Result<PublishOutcome, ExportError> {
        let archive_id = self.archive.append_result(report).await?;
        info!(
            session = %report.session_id,
            archive_id,
            placement = %report.placement,
            "result archived"
        );

        let submitted = match &self.sink {
            None => false,
            Some(sink) => match sink.submit(&export_rows(report)).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(session = %report.session_id, error = %err, "result submission failed");
                    false
                }
            },
        };

        Ok(PublishOutcome {
            archive_id,
            submitted,
        })
    }

    /// # Errors
    ///
    /// Returns `ExportError::Storage` if the archive cannot be read.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ResultRow>, ExportError> {
        Ok(self.archive.list_results(limit).await?)
    }
}
