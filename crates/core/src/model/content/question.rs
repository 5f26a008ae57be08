use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::ids::TrackId;

/// Number of questions attached to every audio track.
pub const QUESTIONS_PER_TRACK: usize = 4;

/// Number of answer options offered by every question.
pub const OPTIONS_PER_QUESTION: usize = 4;

//
// ─── OPTION ID ─────────────────────────────────────────────────────────────────
//

/// Answer option label; positions 0-3 map to A-D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionId {
    A,
    B,
    C,
    D,
}

impl OptionId {
    pub const ALL: [OptionId; OPTIONS_PER_QUESTION] =
        [OptionId::A, OptionId::B, OptionId::C, OptionId::D];

    /// Maps an option position (0-3) to its label.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            OptionId::A => 'A',
            OptionId::B => 'B',
            OptionId::C => 'C',
            OptionId::D => 'D',
        }
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Error returned when a string is not a single A-D letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptionError;

impl fmt::Display for ParseOptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("answer option must be one of A, B, C, D")
    }
}

impl std::error::Error for ParseOptionError {}

impl FromStr for OptionId {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let (Some(first), None) = (chars.next(), chars.next()) else {
            return Err(ParseOptionError);
        };
        match first.to_ascii_uppercase() {
            'A' => Ok(OptionId::A),
            'B' => Ok(OptionId::B),
            'C' => Ok(OptionId::C),
            'D' => Ok(OptionId::D),
            _ => Err(ParseOptionError),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Four-option comprehension question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    prompt: String,
    options: [String; OPTIONS_PER_QUESTION],
    answer: OptionId,
}

impl Question {
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        options: [String; OPTIONS_PER_QUESTION],
        answer: OptionId,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            answer,
        }
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String; OPTIONS_PER_QUESTION] {
        &self.options
    }

    #[must_use]
    pub fn option(&self, id: OptionId) -> &str {
        &self.options[id.index()]
    }

    #[must_use]
    pub fn answer(&self) -> OptionId {
        self.answer
    }

    #[must_use]
    pub fn is_correct(&self, selected: OptionId) -> bool {
        self.answer == selected
    }
}

//
// ─── AUDIO TRACK ───────────────────────────────────────────────────────────────
//

/// One listening scenario and the questions asked about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    id: TrackId,
    title: String,
    scenario: String,
    questions: [Question; QUESTIONS_PER_TRACK],
}

impl AudioTrack {
    #[must_use]
    pub fn new(
        id: TrackId,
        title: impl Into<String>,
        scenario: impl Into<String>,
        questions: [Question; QUESTIONS_PER_TRACK],
    ) -> Self {
        Self {
            id,
            title: title.into(),
            scenario: scenario.into(),
            questions,
        }
    }

    #[must_use]
    pub fn id(&self) -> &TrackId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    #[must_use]
    pub fn questions(&self) -> &[Question; QUESTIONS_PER_TRACK] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_ids_map_to_positions() {
        assert_eq!(OptionId::from_index(0), Some(OptionId::A));
        assert_eq!(OptionId::from_index(3), Some(OptionId::D));
        assert_eq!(OptionId::from_index(4), None);
        assert_eq!(OptionId::C.index(), 2);
    }

    #[test]
    fn option_parse_requires_single_letter() {
        assert_eq!("b".parse::<OptionId>().unwrap(), OptionId::B);
        assert_eq!(" D ".parse::<OptionId>().unwrap(), OptionId::D);
        assert!("E".parse::<OptionId>().is_err());
        assert!("AB".parse::<OptionId>().is_err());
        assert!("".parse::<OptionId>().is_err());
    }

    #[test]
    fn question_checks_answer() {
        let q = Question::new(
            "Where is the meeting?",
            [
                "A) Office".to_string(),
                "B) Cafe".to_string(),
                "C) Park".to_string(),
                "D) Online".to_string(),
            ],
            OptionId::B,
        );
        assert!(q.is_correct(OptionId::B));
        assert!(!q.is_correct(OptionId::A));
        assert_eq!(q.option(OptionId::D), "D) Online");
    }
}
