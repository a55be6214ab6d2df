use std::time::Duration;

use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MIN_COUNT: usize = 1;
pub const MAX_COUNT: usize = 100;
pub const MIN_PAUSE_SECS: f64 = 0.5;
pub const MAX_PAUSE_SECS: f64 = 10.0;
pub const MIN_NUMBER: u32 = 1;
pub const MAX_NUMBER: u32 = 100;

/// Speaking rate of the clips, part of the clip address
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    ValueEnum,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Speed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl Speed {
    pub const ALL: [Speed; 3] = [Speed::Slow, Speed::Normal, Speed::Fast];

    pub fn next(self) -> Self {
        match self {
            Speed::Slow => Speed::Normal,
            Speed::Normal => Speed::Fast,
            Speed::Fast => Speed::Slow,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Speed::Slow => Speed::Fast,
            Speed::Normal => Speed::Slow,
            Speed::Fast => Speed::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Setup,
    Playing,
    Review,
}

/// Settings for one dictation. Construction always clamps into range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub speed: Speed,
    pub count: usize,
    pub pause_secs: f64,
}

impl SessionConfig {
    pub fn new(speed: Speed, count: usize, pause_secs: f64) -> Self {
        Self {
            speed,
            count: clamp_count(count),
            pause_secs: clamp_pause(pause_secs),
        }
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs_f64(self.pause_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Speed::Normal, 20, 1.5)
    }
}

pub fn clamp_count(count: usize) -> usize {
    count.clamp(MIN_COUNT, MAX_COUNT)
}

/// NaN falls back to the minimum pause.
pub fn clamp_pause(pause_secs: f64) -> f64 {
    if pause_secs.is_nan() {
        return MIN_PAUSE_SECS;
    }
    pause_secs.clamp(MIN_PAUSE_SECS, MAX_PAUSE_SECS)
}

/// `count` independent uniform draws from [MIN_NUMBER, MAX_NUMBER], duplicates allowed
pub fn generate_numbers<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<u32> {
    (0..count)
        .map(|_| rng.gen_range(MIN_NUMBER..=MAX_NUMBER))
        .collect()
}

/// Authoritative state of the current dictation, shared between the
/// controller and its playback task.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    pub config: SessionConfig,
    pub numbers: Vec<u32>,
    /// index of the clip being played, only set while playing
    pub cursor: Option<usize>,
    /// clips that reached their natural end
    pub played: usize,
    pub error: Option<String>,
}

impl SessionState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            phase: Phase::Setup,
            config,
            numbers: Vec::new(),
            cursor: None,
            played: 0,
            error: None,
        }
    }

    /// True when the review was reached before every number was heard
    pub fn ended_early(&self) -> bool {
        self.phase == Phase::Review && self.played < self.numbers.len()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
