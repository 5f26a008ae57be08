use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{AudioTrack, LevelId, OptionId, TrackId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("track {track_id} has no question {index}")]
    QuestionOutOfRange { track_id: TrackId, index: usize },

    #[error("ledger for {level} is inconsistent: {reason}")]
    Inconsistent { level: LevelId, reason: String },
}

//
// ─── RESPONSE ──────────────────────────────────────────────────────────────────
//

/// What the test-taker submitted for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Selected(OptionId),
    /// "I don't know / Pass". Never scored as correct.
    Pass,
}

impl Response {
    #[must_use]
    pub fn selected(self) -> Option<OptionId> {
        match self {
            Response::Selected(id) => Some(id),
            Response::Pass => None,
        }
    }
}

/// Timing and listen context captured at submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerTiming {
    pub listens: u32,
    pub elapsed_seconds: f64,
    pub answered_at: DateTime<Utc>,
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// One answered or skipped question. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub level: LevelId,
    pub track_id: TrackId,
    pub question_index: usize,
    pub correct: bool,
    pub skipped: bool,
    pub listens: u32,
    pub selected_option: Option<OptionId>,
    pub correct_answer: OptionId,
    pub elapsed_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl ResponseRecord {
    /// Listens beyond the mandatory first one.
    #[must_use]
    pub fn replays(&self) -> u32 {
        self.listens.saturating_sub(1)
    }
}

/// Running aggregates for one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub correct: u32,
    pub total: u32,
    pub total_listens: u32,
    pub total_time: f64,
    pub questions_answered: u32,
}

//
// ─── LEDGER ────────────────────────────────────────────────────────────────────
//

/// Per-level counters plus the ordered response log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringLedger {
    entries: BTreeMap<LevelId, LedgerEntry>,
    log: Vec<ResponseRecord>,
}

impl ScoringLedger {
    /// Ledger with an empty entry for each given level.
    #[must_use]
    pub fn with_levels(levels: impl IntoIterator<Item = LevelId>) -> Self {
        Self {
            entries: levels
                .into_iter()
                .map(|level| (level, LedgerEntry::default()))
                .collect(),
            log: Vec::new(),
        }
    }

    /// Rebuild a ledger from persisted parts, checking the counters agree
    /// with the log.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Inconsistent` on any disagreement.
    pub fn from_parts(
        entries: BTreeMap<LevelId, LedgerEntry>,
        log: Vec<ResponseRecord>,
    ) -> Result<Self, LedgerError> {
        let inconsistent = |level: LevelId, reason: &str| LedgerError::Inconsistent {
            level,
            reason: reason.to_string(),
        };

        for record in &log {
            if !entries.contains_key(&record.level) {
                return Err(inconsistent(record.level, "log entry for a level with no entry"));
            }
            if record.skipped && (record.correct || record.selected_option.is_some()) {
                return Err(inconsistent(record.level, "skipped record carries an answer"));
            }
            if record.correct != (record.selected_option == Some(record.correct_answer)) {
                return Err(inconsistent(record.level, "correct flag disagrees with answer"));
            }
        }

        for (level, entry) in &entries {
            if entry.correct > entry.total {
                return Err(inconsistent(*level, "more correct answers than questions"));
            }
            if entry.questions_answered != entry.total {
                return Err(inconsistent(*level, "answered count differs from total"));
            }
            if !entry.total_time.is_finite() || entry.total_time < 0.0 {
                return Err(inconsistent(*level, "total time is not a valid duration"));
            }

            let records = log.iter().filter(|r| r.level == *level);
            let (logged, logged_correct) =
                records.fold((0_u32, 0_u32), |(n, c), r| (n + 1, c + u32::from(r.correct)));
            if logged != entry.total || logged_correct != entry.correct {
                return Err(inconsistent(*level, "counters do not match the response log"));
            }
        }

        Ok(Self { entries, log })
    }

    /// Create the entry for a level if it does not exist yet.
    pub fn enter_level(&mut self, level: LevelId) {
        self.entries.entry(level).or_default();
    }

    /// Mirror one completed playback into the level's listen total.
    pub fn record_listen(&mut self, level: LevelId) {
        let entry = self.entries.entry(level).or_default();
        entry.total_listens = entry.total_listens.saturating_add(1);
    }

    /// Append a response and update the level's aggregates.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::QuestionOutOfRange` if the track has no such question.
    pub fn record_response(
        &mut self,
        level: LevelId,
        track: &AudioTrack,
        question_index: usize,
        response: Response,
        timing: AnswerTiming,
    ) -> Result<&ResponseRecord, LedgerError> {
        let question =
            track
                .question(question_index)
                .ok_or_else(|| LedgerError::QuestionOutOfRange {
                    track_id: track.id().clone(),
                    index: question_index,
                })?;

        let correct = response
            .selected()
            .is_some_and(|selected| question.is_correct(selected));

        let entry = self.entries.entry(level).or_default();
        entry.total += 1;
        entry.questions_answered += 1;
        if correct {
            entry.correct += 1;
        }
        entry.total_time += timing.elapsed_seconds.max(0.0);

        let position = self.log.len();
        self.log.push(ResponseRecord {
            level,
            track_id: track.id().clone(),
            question_index,
            correct,
            skipped: matches!(response, Response::Pass),
            listens: timing.listens,
            selected_option: response.selected(),
            correct_answer: question.answer(),
            elapsed_seconds: timing.elapsed_seconds.max(0.0),
            timestamp: timing.answered_at,
        });

        Ok(&self.log[position])
    }

    /// A level is passed iff its correct count meets the threshold.
    #[must_use]
    pub fn evaluate_level(&self, level: LevelId, pass_threshold: u32) -> bool {
        self.correct(level) >= pass_threshold
    }

    #[must_use]
    pub fn correct(&self, level: LevelId) -> u32 {
        self.entries.get(&level).map_or(0, |e| e.correct)
    }

    #[must_use]
    pub fn entry(&self, level: LevelId) -> Option<&LedgerEntry> {
        self.entries.get(&level)
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<LevelId, LedgerEntry> {
        &self.entries
    }

    #[must_use]
    pub fn log(&self) -> &[ResponseRecord] {
        &self.log
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.entries.values().map(|e| e.correct).sum()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
