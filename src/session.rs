use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Result, TmtError};
use crate::refill::RefillRequest;

/// Session lengths offered to the user, in seconds.
pub const ALLOWED_DURATIONS: [u32; 4] = [15, 30, 60, 120];
/// Remaining-buffer distance (in characters) at which more text is requested.
pub const DEFAULT_PRELOAD_THRESHOLD: usize = 80;
/// Time deducted from the budget for each backspace in competitive mode.
pub const BACKSPACE_PENALTY_MS: u64 = 500;

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Backspace corrects the previous character.
    #[default]
    Classic,
    /// Backspace never corrects; it costs time instead.
    Competitive,
}

impl Mode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "classic" => Some(Mode::Classic),
            "competitive" => Some(Mode::Competitive),
            _ => None,
        }
    }
}

/// Per-character correctness, index-aligned with the text buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    #[default]
    Untouched,
    Correct,
    Incorrect,
}

/// A keystroke as the scorer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Printable character or space.
    Char(char),
    Backspace,
    /// Anything else; never scored.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub duration_secs: u32,
    pub mode: Mode,
    pub preload_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: 60,
            mode: Mode::Classic,
            preload_threshold: DEFAULT_PRELOAD_THRESHOLD,
        }
    }
}

impl SessionConfig {
    pub fn new(duration_secs: u32, mode: Mode) -> Result<Self> {
        validate_duration(duration_secs)?;
        Ok(Self {
            duration_secs,
            mode,
            ..Self::default()
        })
    }

    pub fn with_preload_threshold(mut self, threshold: usize) -> Self {
        self.preload_threshold = threshold;
        self
    }

    pub fn duration_ms(&self) -> u64 {
        u64::from(self.duration_secs) * 1000
    }
}

pub fn validate_duration(duration_secs: u32) -> Result<u32> {
    if ALLOWED_DURATIONS.contains(&duration_secs) {
        Ok(duration_secs)
    } else {
        Err(TmtError::InvalidDuration(duration_secs))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Next unconsumed buffer index.
    pub cursor: usize,
    pub hits: usize,
    pub errors: usize,
    /// Set once, by the first accepted keystroke.
    pub started_at: Option<Instant>,
    pub penalty_ms: u64,
    pub ended: bool,
    /// Effective elapsed time metrics are frozen at once the session ends.
    pub frozen_elapsed_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Ended,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match (self.ended, self.started_at) {
            (true, _) => Phase::Ended,
            (false, Some(_)) => Phase::Running,
            (false, None) => Phase::Idle,
        }
    }
}

/// What a single keystroke did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Correct,
    Incorrect,
    /// Backspace undid a mark; carries the mark that was cleared.
    Corrected(Mark),
    /// Competitive backspace: time was deducted.
    Penalized,
    Ignored,
}

/// Signals for the presentation and persistence layers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// First accepted keystroke.
    FocusStart,
    Penalty { ms: u64 },
    /// The time budget ran out.
    FocusEnd,
    Completed(SessionResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeystrokeResult {
    pub outcome: KeyOutcome,
    /// Set when the caller should fetch more text and hand it back with the
    /// same generation.
    pub refill: Option<RefillRequest>,
    pub events: Vec<SessionEvent>,
}

impl KeystrokeResult {
    pub fn ignored() -> Self {
        Self {
            outcome: KeyOutcome::Ignored,
            refill: None,
            events: Vec::new(),
        }
    }
}

/// Final numbers handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub wpm: f64,
    pub accuracy: f64,
    pub hits: usize,
    pub errors: usize,
    pub words: usize,
    pub duration: u32,
    pub mode: Mode,
    pub recorded_at: DateTime<Local>,
}
