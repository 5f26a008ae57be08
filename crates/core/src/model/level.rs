use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Error returned when a string is not a known CEFR level or placement.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown CEFR level: {raw}")]
pub struct ParseLevelError {
    raw: String,
}

impl ParseLevelError {
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

//
// ─── LEVEL ID ──────────────────────────────────────────────────────────────────
//

/// CEFR proficiency tier.
///
/// Variants are declared in canonical order, so the derived `Ord` gives
/// `PreA1 < A1 < A2 < B1 < B2 < C1 < C2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LevelId {
    PreA1,
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl LevelId {
    /// Every level in canonical order.
    pub const ALL: [LevelId; 7] = [
        LevelId::PreA1,
        LevelId::A1,
        LevelId::A2,
        LevelId::B1,
        LevelId::B2,
        LevelId::C1,
        LevelId::C2,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LevelId::PreA1 => "Pre-A1",
            LevelId::A1 => "A1",
            LevelId::A2 => "A2",
            LevelId::B1 => "B1",
            LevelId::B2 => "B2",
            LevelId::C1 => "C1",
            LevelId::C2 => "C2",
        }
    }

    /// Position in the canonical ordering (0 for Pre-A1).
    #[must_use]
    pub fn rank(self) -> usize {
        self as usize
    }

    /// Descriptive sentence shown alongside a final placement.
    #[must_use]
    pub fn feedback(self) -> &'static str {
        match self {
            LevelId::C2 => {
                "Masterly command; understands virtually everything heard at native speed."
            }
            LevelId::C1 => "Strong understanding of complex professional and academic scenarios.",
            LevelId::B2 => "Understands main ideas of complex text on concrete and abstract topics.",
            LevelId::B1 => "Understands main points of clear standard speech on familiar matters.",
            LevelId::A2 => {
                "Understands phrases and high-frequency vocabulary related to immediate needs."
            }
            LevelId::A1 => "Recognizes familiar words and basic phrases when people speak slowly.",
            LevelId::PreA1 => "Beginner level; recognizes basic words with significant support.",
        }
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LevelId {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LevelId::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseLevelError { raw: s.to_string() })
    }
}

impl TryFrom<String> for LevelId {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, ParseLevelError> {
        value.parse()
    }
}

impl From<LevelId> for String {
    fn from(value: LevelId) -> Self {
        value.as_str().to_string()
    }
}

//
// ─── PLACEMENT ─────────────────────────────────────────────────────────────────
//

/// Final result of an assessment.
///
/// `Error` is the sentinel produced when routing configuration is broken and
/// the session had to be terminated early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Placement {
    Level(LevelId),
    Error,
}

impl Placement {
    const ERROR_LABEL: &'static str = "Error";
    const FALLBACK_FEEDBACK: &'static str = "Thank you for participating.";

    #[must_use]
    pub fn level(self) -> Option<LevelId> {
        match self {
            Placement::Level(level) => Some(level),
            Placement::Error => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Placement::Error)
    }

    #[must_use]
    pub fn feedback(self) -> &'static str {
        match self {
            Placement::Level(level) => level.feedback(),
            Placement::Error => Self::FALLBACK_FEEDBACK,
        }
    }
}

impl From<LevelId> for Placement {
    fn from(value: LevelId) -> Self {
        Placement::Level(value)
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Level(level) => fmt::Display::fmt(level, f),
            Placement::Error => f.pad(Self::ERROR_LABEL),
        }
    }
}

impl FromStr for Placement {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == Self::ERROR_LABEL {
            return Ok(Placement::Error);
        }
        s.parse().map(Placement::Level)
    }
}

impl TryFrom<String> for Placement {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, ParseLevelError> {
        value.parse()
    }
}

impl From<Placement> for String {
    fn from(value: Placement) -> Self {
        value.to_string()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
