pub mod content;
mod ids;
mod level;

pub use content::{
    Audience, AudioTrack, Catalogue, ContentError, ContentFile, Level, OPTIONS_PER_QUESTION,
    OptionId, QUESTIONS_PER_TRACK, Question,
};
pub use ids::{ParseIdError, SessionId, TrackId};
pub use level::{LevelId, ParseLevelError, Placement};
