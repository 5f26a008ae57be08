use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::question::{AudioTrack, Question};
use crate::model::ids::TrackId;
use crate::model::level::LevelId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Content integrity failures. All of them are fatal at load time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("content could not be parsed: {0}")]
    Parse(String),

    #[error("no content version for audience {0}")]
    MissingVersion(Audience),

    #[error("catalogue has no levels")]
    NoLevels,

    #[error("level {0} appears more than once")]
    DuplicateLevel(LevelId),

    #[error("level {0} has no audio tracks")]
    EmptyLevel(LevelId),

    #[error("audio track id cannot be empty (level {0})")]
    EmptyTrackId(LevelId),

    #[error("audio track {0} appears more than once")]
    DuplicateTrack(TrackId),

    #[error("track {track_id} must have exactly 4 questions, found {found}")]
    QuestionCount { track_id: TrackId, found: usize },

    #[error("track {track_id} question {question} must have exactly 4 options, found {found}")]
    OptionCount {
        track_id: TrackId,
        question: usize,
        found: usize,
    },

    #[error("track {track_id} question {question} has invalid answer {raw:?}")]
    InvalidAnswer {
        track_id: TrackId,
        question: usize,
        raw: String,
    },

    #[error("placement rule table is empty")]
    NoRules,

    #[error("placement rule for {0} appears more than once")]
    DuplicateRule(LevelId),

    #[error("placement rules must be listed in ascending level order ({0} is out of place)")]
    RulesOutOfOrder(LevelId),
}

//
// ─── AUDIENCE ──────────────────────────────────────────────────────────────────
//

/// Content version a session is administered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Adult,
    YoungPeople,
}

impl Audience {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::Adult => "adult",
            Audience::YoungPeople => "young_people",
        }
    }

    /// Human-facing name of the version.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Audience::Adult => "Adult",
            Audience::YoungPeople => "Young Learners",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Audience {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "adult" => Ok(Audience::Adult),
            "young_people" | "young-people" => Ok(Audience::YoungPeople),
            other => Err(ContentError::Parse(format!("unknown audience: {other}"))),
        }
    }
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

/// A CEFR level's ordered audio tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    id: LevelId,
    tracks: Vec<AudioTrack>,
}

impl Level {
    /// # Errors
    ///
    /// Returns `ContentError::EmptyLevel` if no tracks are given and
    /// `ContentError::EmptyTrackId` if any track id is blank.
    pub fn new(id: LevelId, tracks: Vec<AudioTrack>) -> Result<Self, ContentError> {
        if tracks.is_empty() {
            return Err(ContentError::EmptyLevel(id));
        }
        if tracks.iter().any(|track| track.id().is_blank()) {
            return Err(ContentError::EmptyTrackId(id));
        }
        Ok(Self { id, tracks })
    }

    #[must_use]
    pub fn id(&self) -> LevelId {
        self.id
    }

    #[must_use]
    pub fn tracks(&self) -> &[AudioTrack] {
        &self.tracks
    }

    #[must_use]
    pub fn track(&self, index: usize) -> Option<&AudioTrack> {
        self.tracks.get(index)
    }

    /// Number of questions administered when this level is tested.
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.tracks.iter().map(|t| t.questions().len()).sum()
    }
}

//
// ─── CATALOGUE ─────────────────────────────────────────────────────────────────
//

/// Immutable content for one audience, levels held in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalogue {
    audience: Audience,
    levels: Vec<Level>,
}

impl Catalogue {
    /// Builds a catalogue, sorting levels into canonical order.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if there are no levels, a level id repeats,
    /// or a track id repeats anywhere in the catalogue.
    pub fn new(audience: Audience, mut levels: Vec<Level>) -> Result<Self, ContentError> {
        if levels.is_empty() {
            return Err(ContentError::NoLevels);
        }

        levels.sort_by_key(Level::id);
        for pair in levels.windows(2) {
            if pair[0].id() == pair[1].id() {
                return Err(ContentError::DuplicateLevel(pair[0].id()));
            }
        }

        let mut seen = HashSet::new();
        for track in levels.iter().flat_map(|l| l.tracks()) {
            if !seen.insert(track.id().clone()) {
                return Err(ContentError::DuplicateTrack(track.id().clone()));
            }
        }

        Ok(Self { audience, levels })
    }

    #[must_use]
    pub fn audience(&self) -> Audience {
        self.audience
    }

    #[must_use]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    #[must_use]
    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    #[must_use]
    pub fn index_of(&self, id: LevelId) -> Option<usize> {
        self.levels.iter().position(|l| l.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: LevelId) -> bool {
        self.index_of(id).is_some()
    }

    #[must_use]
    pub fn level_ids(&self) -> Vec<LevelId> {
        self.levels.iter().map(Level::id).collect()
    }

    /// Resolves a (level, track, question) position.
    #[must_use]
    pub fn question_at(
        &self,
        level_index: usize,
        track_index: usize,
        question_index: usize,
    ) -> Option<(&Level, &AudioTrack, &Question)> {
        let level = self.level(level_index)?;
        let track = level.track(track_index)?;
        let question = track.question(question_index)?;
        Some((level, track, question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::content::question::OptionId;

    fn track(id: &str) -> AudioTrack {
        let q = || {
            Question::new(
                "Q",
                ["A".into(), "B".into(), "C".into(), "D".into()],
                OptionId::A,
            )
        };
        AudioTrack::new(TrackId::new(id), "Title", "Scenario", [q(), q(), q(), q()])
    }

    #[test]
    fn levels_are_sorted_canonically() {
        let catalogue = Catalogue::new(
            Audience::Adult,
            vec![
                Level::new(LevelId::C1, vec![track("c1")]).unwrap(),
                Level::new(LevelId::A1, vec![track("a1")]).unwrap(),
                Level::new(LevelId::B2, vec![track("b2")]).unwrap(),
            ],
        )
        .unwrap();

        assert_eq!(
            catalogue.level_ids(),
            vec![LevelId::A1, LevelId::B2, LevelId::C1]
        );
        assert_eq!(catalogue.index_of(LevelId::B2), Some(1));
        assert!(!catalogue.contains(LevelId::C2));
    }

    #[test]
    fn duplicate_level_is_rejected() {
        let err = Catalogue::new(
            Audience::Adult,
            vec![
                Level::new(LevelId::A1, vec![track("x")]).unwrap(),
                Level::new(LevelId::A1, vec![track("y")]).unwrap(),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ContentError::DuplicateLevel(LevelId::A1));
    }

    #[test]
    fn duplicate_track_is_rejected() {
        let err = Catalogue::new(
            Audience::Adult,
            vec![
                Level::new(LevelId::A1, vec![track("same")]).unwrap(),
                Level::new(LevelId::A2, vec![track("same")]).unwrap(),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ContentError::DuplicateTrack(TrackId::new("same")));
    }

    #[test]
    fn empty_level_is_rejected() {
        let err = Level::new(LevelId::B1, Vec::new()).unwrap_err();
        assert_eq!(err, ContentError::EmptyLevel(LevelId::B1));
    }

    #[test]
    fn question_at_resolves_position() {
        let catalogue = Catalogue::new(
            Audience::YoungPeople,
            vec![Level::new(LevelId::A2, vec![track("a2_1"), track("a2_2")]).unwrap()],
        )
        .unwrap();
        let (level, track, _question) = catalogue.question_at(0, 1, 3).unwrap();
        assert_eq!(level.id(), LevelId::A2);
        assert_eq!(track.id().as_str(), "a2_2");
        assert!(catalogue.question_at(0, 2, 0).is_none());
        assert!(catalogue.question_at(0, 0, 4).is_none());
    }
}
