use assess_core::model::{LevelId, OptionId, TrackId};

/// Everything a host needs to render the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub level: LevelId,
    pub track_id: TrackId,
    pub title: String,
    pub scenario: String,
    /// 1-based, within the track.
    pub question_number: usize,
    pub prompt: String,
    pub options: Vec<(OptionId, String)>,
    /// When false the host keeps the question hidden and only offers playback.
    pub answering_allowed: bool,
    pub is_playing: bool,
    pub listen_count: u32,
}

impl QuestionView {
    /// Label for the play control.
    #[must_use]
    pub fn play_label(&self) -> &'static str {
        if self.listen_count > 0 {
            "PLAY AGAIN"
        } else {
            "PLAY AUDIO"
        }
    }
}
