use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use assess_core::gate::{GateEvent, ListenGate};
use assess_core::ledger::{AnswerTiming, Response, ResponseRecord, ScoringLedger};
use assess_core::model::{
    Audience, Catalogue, LevelId, OptionId, Placement, QUESTIONS_PER_TRACK, SessionId, TrackId,
};
use assess_core::placement::BELOW_MINIMUM;
use assess_core::report::AssessmentReport;
use assess_core::routing::{NextAction, RoutingError, RoutingPolicy};
use assess_core::snapshot::{SNAPSHOT_VERSION, SessionSnapshot, SnapshotError};
use assess_core::time::elapsed_seconds;
use assess_core::Clock;
use storage::repository::{SessionStore, StorageError};

use super::config::EngineConfig;
use super::progress::{AssessmentProgress, EngineStatus};
use super::view::QuestionView;
use crate::error::EngineError;

//
// ─── INPUT / OUTPUT ────────────────────────────────────────────────────────────
//

/// What the test-taker submitted for the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// Option position, 0..=3 for A..D.
    Option(usize),
    Pass,
}

/// Where the session moved after an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    NextQuestion,
    NextTrack(TrackId),
    NextLevel {
        completed: LevelId,
        passed: Option<bool>,
        next: LevelId,
    },
    Finished(Placement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerResult {
    pub record: ResponseRecord,
    pub outcome: AnswerOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Cursor {
    level: usize,
    audio: usize,
    question: usize,
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Owns one assessment session and every transition on it.
///
/// The engine is advanced only by playback completion and answer submission.
/// Each transition is checkpointed to the `SessionStore`; reaching the
/// terminal state clears the stored snapshot.
pub struct AssessmentEngine {
    session_id: SessionId,
    catalogue: Arc<Catalogue>,
    policy: RoutingPolicy,
    clock: Clock,
    store: Arc<dyn SessionStore>,
    cursor: Cursor,
    gate: ListenGate,
    ledger: ScoringLedger,
    administered: Vec<LevelId>,
    revealed_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    report: Option<AssessmentReport>,
    resumed: bool,
    unsaved: bool,
}

impl AssessmentEngine {
    /// Start a fresh session at the policy's first level and checkpoint it.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Routing` if the policy cannot start on this catalogue.
    pub async fn start(
        catalogue: Arc<Catalogue>,
        config: EngineConfig,
        clock: Clock,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, EngineError> {
        let start = config.policy.start_level(&catalogue)?;
        let level_index = catalogue
            .index_of(start)
            .ok_or(RoutingError::StartLevelMissing(start))?;
        let first_track = catalogue
            .level(level_index)
            .and_then(|level| level.track(0))
            .ok_or(RoutingError::StartLevelMissing(start))?
            .id()
            .clone();

        let mut engine = Self {
            session_id: SessionId::generate(),
            catalogue,
            policy: config.policy,
            clock,
            store,
            cursor: Cursor {
                level: level_index,
                ..Cursor::default()
            },
            gate: ListenGate::new(first_track),
            ledger: ScoringLedger::with_levels([start]),
            administered: vec![start],
            revealed_at: None,
            started_at: clock.now(),
            report: None,
            resumed: false,
            unsaved: false,
        };

        info!(
            session = %engine.session_id,
            audience = %engine.catalogue.audience(),
            policy = %engine.policy.kind(),
            level = %start,
            "assessment started"
        );
        engine.checkpoint().await;
        Ok(engine)
    }

    /// Resume the stored session if it is valid for this catalogue and policy,
    /// otherwise discard it and start fresh.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the store cannot be read or cleared,
    /// and the errors of [`AssessmentEngine::start`].
    pub async fn resume_or_start(
        catalogue: Arc<Catalogue>,
        config: EngineConfig,
        clock: Clock,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, EngineError> {
        let Some(raw) = store.load().await? else {
            return Self::start(catalogue, config, clock, store).await;
        };

        match Self::restore(&raw, Arc::clone(&catalogue), &config, clock, Arc::clone(&store)) {
            Ok(engine) => {
                info!(
                    session = %engine.session_id,
                    level = %engine.current_level_id(),
                    answered = engine.ledger.log().len(),
                    "assessment resumed"
                );
                Ok(engine)
            }
            Err(err) => {
                warn!(error = %err, "discarding session snapshot");
                store.clear().await?;
                Self::start(catalogue, config, clock, store).await
            }
        }
    }

    fn restore(
        raw: &[u8],
        catalogue: Arc<Catalogue>,
        config: &EngineConfig,
        clock: Clock,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, SnapshotError> {
        let snapshot = SessionSnapshot::from_bytes(raw)?;
        let ledger = snapshot.validate(&catalogue, config.policy.kind())?;
        let gate = ListenGate::restore(&snapshot.gate);
        // The question on screen at save time is shown again from now.
        let revealed_at = gate.is_answering_allowed().then(|| clock.now());

        Ok(Self {
            session_id: snapshot.session_id,
            catalogue,
            policy: config.policy.clone(),
            clock,
            store,
            cursor: Cursor {
                level: snapshot.level_index,
                audio: snapshot.audio_index,
                question: snapshot.question_index,
            },
            gate,
            ledger,
            administered: snapshot.administered,
            revealed_at,
            started_at: snapshot.started_at,
            report: None,
            resumed: true,
            unsaved: false,
        })
    }

    //
    // ─── PLAYBACK ──────────────────────────────────────────────────────────────
    //

    /// Start playback of the current track.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Completed` after the terminal state and
    /// `EngineError::Gate` if a playback is already in flight.
    pub fn begin_playback(&mut self) -> Result<TrackId, EngineError> {
        self.ensure_active()?;
        let track_id = self.gate.track_id().clone();
        self.gate.on_playback_started(&track_id)?;
        debug!(track = %track_id, listens = self.gate.listen_count(), "playback started");
        Ok(track_id)
    }

    /// A full, uninterrupted playback of `track_id` finished.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Gate` if `track_id` is not the active track or
    /// no playback was started.
    pub async fn playback_completed(&mut self, track_id: &TrackId) -> Result<GateEvent, EngineError> {
        self.ensure_active()?;
        let event = self.gate.on_playback_completed(track_id)?;
        let level = self.current_level_id();
        self.ledger.record_listen(level);

        if event == GateEvent::Unlocked {
            self.revealed_at = Some(self.clock.now());
            debug!(track = %track_id, "answering unlocked");
        } else {
            debug!(track = %track_id, listens = self.gate.listen_count(), "replay completed");
        }

        self.checkpoint().await;
        Ok(event)
    }

    /// Media failed to load or play. The play control is re-armed and the
    /// gate stays as it was.
    pub fn playback_failed(&mut self, reason: &str) {
        warn!(track = %self.gate.track_id(), reason, "playback failed");
        self.gate.on_playback_failed();
    }

    /// # Errors
    ///
    /// Returns `EngineError::Gate` while a playback is in flight.
    pub fn request_pause(&self) -> Result<(), EngineError> {
        Ok(self.gate.request_pause()?)
    }

    /// # Errors
    ///
    /// Returns `EngineError::Gate` while a playback is in flight.
    pub fn request_seek(&self, position_secs: f64) -> Result<(), EngineError> {
        Ok(self.gate.request_seek(position_secs)?)
    }

    //
    // ─── ANSWERING ─────────────────────────────────────────────────────────────
    //

    /// Record an answer for the current question and advance.
    ///
    /// `None` means nothing was selected. Rejected submissions leave the
    /// ledger untouched.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoSelection`, `EngineError::InvalidOption` or
    /// `EngineError::Gate` for rejected input. Returns `EngineError::Routing`
    /// when level evaluation fails; the session is then terminal with the
    /// `Error` placement.
    pub async fn submit_answer(
        &mut self,
        answer: Option<Answer>,
    ) -> Result<AnswerResult, EngineError> {
        self.ensure_active()?;
        let answer = answer.ok_or(EngineError::NoSelection)?;
        self.gate.ensure_answering_allowed()?;
        let response = match answer {
            Answer::Option(index) => OptionId::from_index(index)
                .map(Response::Selected)
                .ok_or(EngineError::InvalidOption(index))?,
            Answer::Pass => Response::Pass,
        };

        let catalogue = Arc::clone(&self.catalogue);
        let Cursor {
            level: level_index,
            audio,
            question,
        } = self.cursor;
        let (level, track, _) = catalogue.question_at(level_index, audio, question).ok_or(
            EngineError::Cursor {
                level: level_index,
                audio,
                question,
            },
        )?;

        let now = self.clock.now();
        let timing = AnswerTiming {
            listens: self.gate.listen_count(),
            elapsed_seconds: elapsed_seconds(self.revealed_at.unwrap_or(now), now),
            answered_at: now,
        };
        let record = self
            .ledger
            .record_response(level.id(), track, question, response, timing)?
            .clone();
        debug!(
            level = %record.level,
            track = %record.track_id,
            question = record.question_index,
            correct = record.correct,
            skipped = record.skipped,
            "response recorded"
        );

        let outcome = if question + 1 < QUESTIONS_PER_TRACK {
            self.cursor.question += 1;
            self.revealed_at = Some(now);
            Ok(AnswerOutcome::NextQuestion)
        } else if let Some(next_track) = level.track(audio + 1) {
            self.cursor.audio += 1;
            self.cursor.question = 0;
            self.gate.on_track_start(next_track.id().clone());
            self.revealed_at = None;
            Ok(AnswerOutcome::NextTrack(next_track.id().clone()))
        } else {
            self.evaluate_level(level.id(), now)
        };

        self.checkpoint().await;
        outcome.map(|outcome| AnswerResult { record, outcome })
    }

    fn evaluate_level(
        &mut self,
        completed: LevelId,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, EngineError> {
        let passed = self.policy.level_passed(completed, &self.ledger);
        info!(
            level = %completed,
            correct = self.ledger.correct(completed),
            passed = ?passed,
            "level complete"
        );

        let action = self
            .policy
            .next_action(completed, &self.ledger, &self.catalogue, &self.administered)
            .and_then(|action| self.check_target(action))
            .and_then(|action| match action {
                NextAction::Advance(next) => self.enter_level(next).map(|()| action),
                NextAction::Terminate(_) => Ok(action),
            });

        match action {
            Ok(NextAction::Advance(next)) => Ok(AnswerOutcome::NextLevel {
                completed,
                passed,
                next,
            }),
            Ok(NextAction::Terminate(placement)) => {
                self.finish(placement, None, now);
                Ok(AnswerOutcome::Finished(placement))
            }
            Err(err) => {
                error!(level = %completed, error = %err, "routing failed, assessment aborted");
                self.finish(Placement::Error, Some(err.to_string()), now);
                Err(err.into())
            }
        }
    }

    fn check_target(&self, action: NextAction) -> Result<NextAction, RoutingError> {
        match action {
            NextAction::Advance(next) if self.administered.contains(&next) => {
                Err(RoutingError::Revisit(next))
            }
            NextAction::Advance(next) if !self.catalogue.contains(next) => {
                Err(RoutingError::TargetMissing(next))
            }
            other => Ok(other),
        }
    }

    fn enter_level(&mut self, next: LevelId) -> Result<(), RoutingError> {
        let (index, first_track) = self
            .catalogue
            .index_of(next)
            .and_then(|index| {
                let track = self.catalogue.level(index)?.track(0)?;
                Some((index, track.id().clone()))
            })
            .ok_or(RoutingError::TargetMissing(next))?;

        self.cursor = Cursor {
            level: index,
            audio: 0,
            question: 0,
        };
        self.gate.on_track_start(first_track);
        self.ledger.enter_level(next);
        self.administered.push(next);
        self.revealed_at = None;
        info!(level = %next, "entering level");
        Ok(())
    }

    fn finish(&mut self, placement: Placement, failure: Option<String>, now: DateTime<Utc>) {
        let report = AssessmentReport::from_ledger(
            self.session_id,
            self.catalogue.audience(),
            &self.policy,
            placement,
            &self.ledger,
            &self.administered,
            self.started_at,
            now,
            failure,
        );
        info!(
            session = %self.session_id,
            placement = %placement,
            questions = report.total_questions(),
            "assessment complete"
        );
        self.revealed_at = None;
        self.report = Some(report);
    }

    //
    // ─── PERSISTENCE ───────────────────────────────────────────────────────────
    //

    /// Write the current state to the store: the snapshot while in progress,
    /// a cleared slot once terminal.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the store rejects the write.
    pub async fn persist(&mut self) -> Result<(), EngineError> {
        if self.report.is_some() {
            self.store.clear().await?;
        } else {
            let bytes = self
                .snapshot()
                .to_bytes()
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            self.store.save(&bytes).await?;
        }
        self.unsaved = false;
        Ok(())
    }

    async fn checkpoint(&mut self) {
        if let Err(err) = self.persist().await {
            warn!(error = %err, "session checkpoint failed");
            self.unsaved = true;
        }
    }

    /// Capture the state needed to resume at the current question.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            session_id: self.session_id,
            audience: self.catalogue.audience(),
            policy: self.policy.kind(),
            level_index: self.cursor.level,
            audio_index: self.cursor.audio,
            question_index: self.cursor.question,
            administered: self.administered.clone(),
            ledger: self.ledger.entries().clone(),
            gate: self.gate.snapshot(),
            response_log: self.ledger.log().to_vec(),
            started_at: self.started_at,
            saved_at: self.clock.now(),
        }
    }

    /// Whether the last checkpoint failed and has not been retried successfully.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn audience(&self) -> Audience {
        self.catalogue.audience()
    }

    #[must_use]
    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    #[must_use]
    pub fn ledger(&self) -> &ScoringLedger {
        &self.ledger
    }

    #[must_use]
    pub fn gate(&self) -> &ListenGate {
        &self.gate
    }

    /// Levels entered so far, in order.
    #[must_use]
    pub fn administered(&self) -> &[LevelId] {
        &self.administered
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn was_resumed(&self) -> bool {
        self.resumed
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.report.is_some()
    }

    #[must_use]
    pub fn report(&self) -> Option<&AssessmentReport> {
        self.report.as_ref()
    }

    #[must_use]
    pub fn placement(&self) -> Option<Placement> {
        self.report.as_ref().map(|r| r.placement)
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        match &self.report {
            Some(report) => EngineStatus::Complete(report.placement),
            None => EngineStatus::Testing(self.current_level_id()),
        }
    }

    #[must_use]
    pub fn is_answering_allowed(&self) -> bool {
        self.report.is_none() && self.gate.is_answering_allowed()
    }

    /// The current question, or `None` once the session is terminal.
    #[must_use]
    pub fn current_question(&self) -> Option<QuestionView> {
        if self.report.is_some() {
            return None;
        }
        let (level, track, question) =
            self.catalogue
                .question_at(self.cursor.level, self.cursor.audio, self.cursor.question)?;

        Some(QuestionView {
            level: level.id(),
            track_id: track.id().clone(),
            title: track.title().to_string(),
            scenario: track.scenario().to_string(),
            question_number: self.cursor.question + 1,
            prompt: question.prompt().to_string(),
            options: OptionId::ALL
                .iter()
                .map(|&id| (id, question.option(id).to_string()))
                .collect(),
            answering_allowed: self.gate.is_answering_allowed(),
            is_playing: self.gate.is_playing(),
            listen_count: self.gate.listen_count(),
        })
    }

    #[must_use]
    pub fn progress(&self) -> AssessmentProgress {
        let tracks_in_level = self
            .catalogue
            .level(self.cursor.level)
            .map_or(0, |level| level.tracks().len());
        AssessmentProgress {
            level: self.current_level_id(),
            track_number: self.cursor.audio + 1,
            tracks_in_level,
            question_number: self.cursor.question + 1,
            answered_total: self.ledger.log().len(),
            levels_administered: self.administered.len(),
        }
    }

    /// Mutable access to the clock, for hosts and tests that drive time.
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    fn current_level_id(&self) -> LevelId {
        self.catalogue
            .level(self.cursor.level)
            .map_or(BELOW_MINIMUM, |level| level.id())
    }

    fn ensure_active(&self) -> Result<(), EngineError> {
        if self.report.is_some() {
            Err(EngineError::Completed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for AssessmentEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssessmentEngine")
            .field("session_id", &self.session_id)
            .field("policy", &self.policy.kind())
            .field("cursor", &self.cursor)
            .field("gate", &self.gate)
            .field("answered", &self.ledger.log().len())
            .field("administered", &self.administered)
            .field("complete", &self.report.is_some())
            .finish_non_exhaustive()
    }
}
