pub mod catalogue;
pub mod file;
pub mod question;

pub use catalogue::{Audience, Catalogue, ContentError, Level};
pub use file::{AudioFile, ContentFile, LevelFile, QuestionFile, VersionFile};
pub use question::{
    AudioTrack, OPTIONS_PER_QUESTION, OptionId, ParseOptionError, QUESTIONS_PER_TRACK, Question,
};
