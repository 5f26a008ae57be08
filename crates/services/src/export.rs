use std::env;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use assess_core::ledger::ResponseRecord;
use assess_core::model::{Audience, LevelId, Placement, TrackId};
use assess_core::report::AssessmentReport;

use crate::error::ExportError;

//
// ─── ROWS ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Correct,
    Incorrect,
    Pass,
}

impl ResponseKind {
    #[must_use]
    pub fn of(record: &ResponseRecord) -> Self {
        if record.skipped {
            ResponseKind::Pass
        } else if record.correct {
            ResponseKind::Correct
        } else {
            ResponseKind::Incorrect
        }
    }
}

/// One flattened response with the final placement stamped on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "CEFR_Level")]
    pub level: LevelId,
    #[serde(rename = "Audio_ID")]
    pub track_id: TrackId,
    /// 1-based.
    #[serde(rename = "Question_Num")]
    pub question_number: usize,
    #[serde(rename = "Response")]
    pub response: ResponseKind,
    #[serde(rename = "Time_Taken_Sec")]
    pub time_taken_sec: f64,
    #[serde(rename = "Replays")]
    pub replays: u32,
    #[serde(rename = "Final_Assessment")]
    pub final_assessment: Placement,
    #[serde(rename = "Audience")]
    pub audience: Audience,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn two_decimals(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

/// Flatten a report into export rows, in response order.
#[must_use]
pub fn export_rows(report: &AssessmentReport) -> Vec<ExportRow> {
    report
        .responses
        .iter()
        .map(|record| ExportRow {
            level: record.level,
            track_id: record.track_id.clone(),
            question_number: record.question_index + 1,
            response: ResponseKind::of(record),
            time_taken_sec: two_decimals(record.elapsed_seconds),
            replays: record.replays(),
            final_assessment: report.placement,
            audience: report.audience,
            timestamp: record.timestamp,
        })
        .collect()
}

/// # Errors
///
/// Returns `ExportError::Serialize` if the rows cannot be encoded.
pub fn rows_to_json(rows: &[ExportRow]) -> Result<String, ExportError> {
    serde_json::to_string_pretty(rows).map_err(|e| ExportError::Serialize(e.to_string()))
}

/// Full report as a JSON document.
///
/// # Errors
///
/// Returns `ExportError::Serialize` if the report cannot be encoded.
pub fn report_to_json(report: &AssessmentReport) -> Result<String, ExportError> {
    serde_json::to_string_pretty(report).map_err(|e| ExportError::Serialize(e.to_string()))
}

//
// ─── SINKS ─────────────────────────────────────────────────────────────────────
//

/// Destination for completed results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// # Errors
    ///
    /// Returns `ExportError` if the rows could not be delivered.
    async fn submit(&self, rows: &[ExportRow]) -> Result<(), ExportError>;
}

#[derive(Clone, Debug)]
pub struct HttpSinkConfig {
    pub url: String,
}

impl HttpSinkConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let url = env::var("ASSESS_RESULTS_URL").ok()?;
        if url.trim().is_empty() {
            return None;
        }
        Some(Self { url })
    }
}

/// Posts the rows as a JSON array.
#[derive(Clone)]
pub struct HttpResultSink {
    client: Client,
    config: HttpSinkConfig,
}

impl HttpResultSink {
    #[must_use]
    pub fn new(config: HttpSinkConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl ResultSink for HttpResultSink {
    async fn submit(&self, rows: &[ExportRow]) -> Result<(), ExportError> {
        let response = self
            .client
            .post(&self.config.url)
            .json(rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExportError::HttpStatus(response.status()));
        }
        Ok(())
    }
}

/// Collects submissions in memory.
#[derive(Clone, Default)]
pub struct InMemoryResultSink {
    batches: Arc<Mutex<Vec<Vec<ExportRow>>>>,
}

impl InMemoryResultSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch submitted so far.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<ExportRow>> {
        self.batches
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn submit(&self, rows: &[ExportRow]) -> Result<(), ExportError> {
        let mut guard = self
            .batches
            .lock()
            .map_err(|e| ExportError::Serialize(e.to_string()))?;
        guard.push(rows.to_vec());
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
