//! On-disk shape of the question content file.
//!
//! The file carries one version per audience; a session selects one with
//! [`ContentFile::select`], which also enforces the 4-questions / 4-options
//! invariants.

use serde::{Deserialize, Serialize};

use super::catalogue::{Audience, Catalogue, ContentError, Level};
use super::question::{AudioTrack, OptionId, Question};
use crate::model::ids::TrackId;
use crate::model::level::LevelId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFile {
    pub versions: Vec<VersionFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionFile {
    pub audience: Audience,
    pub levels: Vec<LevelFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelFile {
    pub level_id: LevelId,
    pub audios: Vec<AudioFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFile {
    pub track_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scenario: String,
    pub questions: Vec<QuestionFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionFile {
    pub text: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl ContentFile {
    /// # Errors
    ///
    /// Returns `ContentError::Parse` if the JSON is malformed or references an
    /// unknown level id or audience.
    pub fn from_json_str(raw: &str) -> Result<Self, ContentError> {
        serde_json::from_str(raw).map_err(|e| ContentError::Parse(e.to_string()))
    }

    #[must_use]
    pub fn audiences(&self) -> Vec<Audience> {
        self.versions.iter().map(|v| v.audience).collect()
    }

    /// Validate and build the catalogue for one audience.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` for a missing version or any shape violation.
    pub fn select(&self, audience: Audience) -> Result<Catalogue, ContentError> {
        let version = self
            .versions
            .iter()
            .find(|v| v.audience == audience)
            .ok_or(ContentError::MissingVersion(audience))?;

        let levels = version
            .levels
            .iter()
            .map(LevelFile::validate)
            .collect::<Result<Vec<_>, _>>()?;

        Catalogue::new(audience, levels)
    }
}

impl LevelFile {
    fn validate(&self) -> Result<Level, ContentError> {
        let tracks = self
            .audios
            .iter()
            .map(AudioFile::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Level::new(self.level_id, tracks)
    }
}

impl AudioFile {
    fn validate(&self) -> Result<AudioTrack, ContentError> {
        let track_id = TrackId::new(self.track_id.trim());

        let questions = self
            .questions
            .iter()
            .enumerate()
            .map(|(index, q)| q.validate(&track_id, index))
            .collect::<Result<Vec<_>, _>>()?;

        let found = questions.len();
        let questions: [Question; 4] =
            questions
                .try_into()
                .map_err(|_| ContentError::QuestionCount {
                    track_id: track_id.clone(),
                    found,
                })?;

        Ok(AudioTrack::new(
            track_id,
            self.title.clone(),
            self.scenario.clone(),
            questions,
        ))
    }
}

impl QuestionFile {
    fn validate(&self, track_id: &TrackId, index: usize) -> Result<Question, ContentError> {
        let options: [String; 4] =
            self.options
                .clone()
                .try_into()
                .map_err(|_| ContentError::OptionCount {
                    track_id: track_id.clone(),
                    question: index,
                    found: self.options.len(),
                })?;

        let answer: OptionId = self
            .answer
            .parse()
            .map_err(|_| ContentError::InvalidAnswer {
                track_id: track_id.clone(),
                question: index,
                raw: self.answer.clone(),
            })?;

        Ok(Question::new(self.text.clone(), options, answer))
    }
}
