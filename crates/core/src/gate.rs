//! Mandatory-first-listen gate for the active audio track.
//!
//! Answering unlocks only after one full, uninterrupted playback of the
//! active track. While a playback is in flight, pause and seek requests are
//! rejected; the only way out of `Playing` is a completion or a playback
//! failure, which re-arms the play control without unlocking anything.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TrackId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    #[error("track {got} is not the active track ({expected})")]
    TrackMismatch { expected: TrackId, got: TrackId },

    #[error("track {0} is already playing")]
    AlreadyPlaying(TrackId),

    #[error("track {0} is not playing")]
    NotPlaying(TrackId),

    #[error("playback of {0} cannot be paused or seeked until it finishes")]
    PlaybackLocked(TrackId),

    #[error("answering is locked until track {0} has been heard in full")]
    AnsweringLocked(TrackId),
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Completed,
}

/// Side effect of a completed playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// First full listen: answering is now unlocked.
    Unlocked,
    /// A repeat listen; the gate was already open.
    Replayed,
}

/// Gate for the single active track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenGate {
    track_id: TrackId,
    state: PlaybackState,
    first_listen_complete: bool,
    listen_count: u32,
}

/// Persisted form of the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub track_id: TrackId,
    pub first_listen_complete: bool,
    pub listen_count: u32,
}

impl ListenGate {
    /// Fresh, closed gate for a newly entered track.
    #[must_use]
    pub fn new(track_id: TrackId) -> Self {
        Self {
            track_id,
            state: PlaybackState::Idle,
            first_listen_complete: false,
            listen_count: 0,
        }
    }

    /// Rebuild a gate from a snapshot. In-flight playback is not restored.
    #[must_use]
    pub fn restore(snapshot: &GateSnapshot) -> Self {
        Self {
            track_id: snapshot.track_id.clone(),
            state: if snapshot.first_listen_complete {
                PlaybackState::Completed
            } else {
                PlaybackState::Idle
            },
            first_listen_complete: snapshot.first_listen_complete,
            listen_count: snapshot.listen_count,
        }
    }

    /// Make `track_id` the active track and close the gate.
    ///
    /// The listen counter survives only when the same track is started again.
    pub fn on_track_start(&mut self, track_id: TrackId) {
        if track_id != self.track_id {
            self.listen_count = 0;
            self.track_id = track_id;
        }
        self.state = PlaybackState::Idle;
        self.first_listen_complete = false;
    }

    /// Begin a playback of the active track.
    ///
    /// # Errors
    ///
    /// Returns `GateError::TrackMismatch` for a different track and
    /// `GateError::AlreadyPlaying` if a playback is in flight.
    pub fn on_playback_started(&mut self, track_id: &TrackId) -> Result<(), GateError> {
        self.ensure_active(track_id)?;
        if self.state == PlaybackState::Playing {
            return Err(GateError::AlreadyPlaying(self.track_id.clone()));
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Record a full, uninterrupted playback.
    ///
    /// # Errors
    ///
    /// Returns `GateError::TrackMismatch` for a different track and
    /// `GateError::NotPlaying` if no playback was started.
    pub fn on_playback_completed(&mut self, track_id: &TrackId) -> Result<GateEvent, GateError> {
        self.ensure_active(track_id)?;
        if self.state != PlaybackState::Playing {
            return Err(GateError::NotPlaying(self.track_id.clone()));
        }

        self.state = PlaybackState::Completed;
        self.listen_count = self.listen_count.saturating_add(1);

        if self.first_listen_complete {
            Ok(GateEvent::Replayed)
        } else {
            self.first_listen_complete = true;
            Ok(GateEvent::Unlocked)
        }
    }

    /// Media failed to load or play: re-arm the play control.
    pub fn on_playback_failed(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = if self.first_listen_complete {
                PlaybackState::Completed
            } else {
                PlaybackState::Idle
            };
        }
    }

    /// # Errors
    ///
    /// Returns `GateError::PlaybackLocked` while a playback is in flight.
    pub fn request_pause(&self) -> Result<(), GateError> {
        self.ensure_not_playing()
    }

    /// # Errors
    ///
    /// Returns `GateError::PlaybackLocked` while a playback is in flight.
    pub fn request_seek(&self, _position_secs: f64) -> Result<(), GateError> {
        self.ensure_not_playing()
    }

    /// # Errors
    ///
    /// Returns `GateError::AnsweringLocked` until the first full listen.
    pub fn ensure_answering_allowed(&self) -> Result<(), GateError> {
        if self.first_listen_complete {
            Ok(())
        } else {
            Err(GateError::AnsweringLocked(self.track_id.clone()))
        }
    }

    #[must_use]
    pub fn is_answering_allowed(&self) -> bool {
        self.first_listen_complete
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    #[must_use]
    pub fn listen_count(&self) -> u32 {
        self.listen_count
    }

    #[must_use]
    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            track_id: self.track_id.clone(),
            first_listen_complete: self.first_listen_complete,
            listen_count: self.listen_count,
        }
    }

    fn ensure_active(&self, track_id: &TrackId) -> Result<(), GateError> {
        if *track_id == self.track_id {
            Ok(())
        } else {
            Err(GateError::TrackMismatch {
                expected: self.track_id.clone(),
                got: track_id.clone(),
            })
        }
    }

    fn ensure_not_playing(&self) -> Result<(), GateError> {
        if self.is_playing() {
            Err(GateError::PlaybackLocked(self.track_id.clone()))
        } else {
            Ok(())
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
