//! Serializable capture of everything needed to resume a session.
//!
//! A snapshot is only applied after [`SessionSnapshot::validate`] has
//! checked it against the loaded catalogue; any mismatch means the host
//! discards it and starts a fresh session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::gate::GateSnapshot;
use crate::ledger::{LedgerEntry, LedgerError, ResponseRecord, ScoringLedger};
use crate::model::{Audience, Catalogue, LevelId, QUESTIONS_PER_TRACK, SessionId, TrackId};
use crate::routing::PolicyKind;

pub const SNAPSHOT_VERSION: u32 = 1;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Resume integrity failures. Always recoverable by starting over.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("snapshot could not be encoded or decoded: {0}")]
    Malformed(String),

    #[error("snapshot version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("snapshot was taken for audience {found}, catalogue is {expected}")]
    AudienceMismatch { found: Audience, expected: Audience },

    #[error("snapshot was taken under the {found} policy, session uses {expected}")]
    PolicyMismatch {
        found: PolicyKind,
        expected: PolicyKind,
    },

    #[error("level index {index} out of range ({len} levels)")]
    LevelOutOfRange { index: usize, len: usize },

    #[error("audio index {index} out of range ({len} tracks)")]
    AudioOutOfRange { index: usize, len: usize },

    #[error("question index {0} out of range")]
    QuestionOutOfRange(usize),

    #[error("gate refers to track {found}, current track is {expected}")]
    GateTrackMismatch { expected: TrackId, found: TrackId },

    #[error("gate is closed but the track already has answered questions")]
    GateClosedMidTrack,

    #[error("ledger refers to level {0} which is not in the catalogue")]
    UnknownLevel(LevelId),

    #[error("current level {0} is not in the administered list")]
    NotAdministered(LevelId),

    #[error("level {level} has {answered} answers but the cursor expects {expected}")]
    CursorMismatch {
        level: LevelId,
        answered: u32,
        expected: usize,
    },

    #[error("administered level {level} has {answered} of {expected} answers")]
    LevelIncomplete {
        level: LevelId,
        answered: u32,
        expected: usize,
    },

    #[error("response {index} does not match the content: {reason}")]
    RecordMismatch { index: usize, reason: &'static str },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: SessionId,
    pub audience: Audience,
    pub policy: PolicyKind,
    pub level_index: usize,
    pub audio_index: usize,
    pub question_index: usize,
    /// Levels entered so far, in the order they were entered.
    pub administered: Vec<LevelId>,
    pub ledger: BTreeMap<LevelId, LedgerEntry>,
    pub gate: GateSnapshot,
    pub response_log: Vec<ResponseRecord>,
    pub started_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// # Errors
    ///
    /// Returns `SnapshotError::Malformed` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(self).map_err(|e| SnapshotError::Malformed(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns `SnapshotError::Malformed` if the bytes are not a snapshot.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, SnapshotError> {
        serde_json::from_slice(raw).map_err(|e| SnapshotError::Malformed(e.to_string()))
    }

    /// Check the snapshot against the catalogue and rebuild its ledger.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` describing the first structural mismatch found.
    pub fn validate(
        &self,
        catalogue: &Catalogue,
        policy: PolicyKind,
    ) -> Result<ScoringLedger, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        if self.audience != catalogue.audience() {
            return Err(SnapshotError::AudienceMismatch {
                found: self.audience,
                expected: catalogue.audience(),
            });
        }
        if self.policy != policy {
            return Err(SnapshotError::PolicyMismatch {
                found: self.policy,
                expected: policy,
            });
        }

        let level = catalogue
            .level(self.level_index)
            .ok_or(SnapshotError::LevelOutOfRange {
                index: self.level_index,
                len: catalogue.levels().len(),
            })?;
        let track = level
            .track(self.audio_index)
            .ok_or(SnapshotError::AudioOutOfRange {
                index: self.audio_index,
                len: level.tracks().len(),
            })?;
        if self.question_index >= QUESTIONS_PER_TRACK {
            return Err(SnapshotError::QuestionOutOfRange(self.question_index));
        }

        if self.gate.track_id != *track.id() {
            return Err(SnapshotError::GateTrackMismatch {
                expected: track.id().clone(),
                found: self.gate.track_id.clone(),
            });
        }
        if self.question_index > 0 && !self.gate.first_listen_complete {
            return Err(SnapshotError::GateClosedMidTrack);
        }

        if let Some(unknown) = self
            .ledger
            .keys()
            .chain(self.administered.iter())
            .find(|id| !catalogue.contains(**id))
        {
            return Err(SnapshotError::UnknownLevel(*unknown));
        }
        let Some((current, earlier_levels)) = self.administered.split_last() else {
            return Err(SnapshotError::NotAdministered(level.id()));
        };
        if *current != level.id() {
            return Err(SnapshotError::NotAdministered(level.id()));
        }

        let ledger = ScoringLedger::from_parts(self.ledger.clone(), self.response_log.clone())?;

        for (index, record) in self.response_log.iter().enumerate() {
            Self::check_record(catalogue, &self.administered, record)
                .map_err(|reason| SnapshotError::RecordMismatch { index, reason })?;
        }
        for earlier in earlier_levels {
            let expected = catalogue
                .index_of(*earlier)
                .and_then(|i| catalogue.level(i))
                .map_or(0, |l| l.question_count());
            let answered = ledger.entry(*earlier).map_or(0, |e| e.questions_answered);
            if usize::try_from(answered).ok() != Some(expected) {
                return Err(SnapshotError::LevelIncomplete {
                    level: *earlier,
                    answered,
                    expected,
                });
            }
        }

        let expected = self.audio_index * QUESTIONS_PER_TRACK + self.question_index;
        let answered = ledger.entry(level.id()).map_or(0, |e| e.questions_answered);
        if usize::try_from(answered).ok() != Some(expected) {
            return Err(SnapshotError::CursorMismatch {
                level: level.id(),
                answered,
                expected,
            });
        }

        Ok(ledger)
    }

    fn check_record(
        catalogue: &Catalogue,
        administered: &[LevelId],
        record: &ResponseRecord,
    ) -> Result<(), &'static str> {
        if !administered.contains(&record.level) {
            return Err("level was never administered");
        }
        let track = catalogue
            .index_of(record.level)
            .and_then(|i| catalogue.level(i))
            .and_then(|l| l.tracks().iter().find(|t| *t.id() == record.track_id))
            .ok_or("track does not belong to the level")?;
        let question = track
            .question(record.question_index)
            .ok_or("question index out of range")?;
        if question.answer() != record.correct_answer {
            return Err("correct answer differs from the catalogue");
        }
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
