//! Option structs for the detector and the challenge session.
//!
//! All fields have stated defaults so hosts can start from
//! `..Default::default()` and override what their settings screen
//! exposes. Both structs are serde-derived so a host can persist them.

use serde::{Deserialize, Serialize};

/// Options for [`PitchDetector`](crate::PitchDetector).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// The frequency of A4 in Hz.
    pub a4_hz: f32,
    /// Minimum signal level in dB full scale under which not to operate.
    pub rms_threshold_db: f32,
    /// Amplitude below which a sample counts as a zero crossing when
    /// trimming the analysis frame.
    pub zero_crossing_thresh: f32,
    /// Length of the note-change consensus window, in ticks.
    pub smoothing_factor: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            a4_hz: 440.0,
            rms_threshold_db: -40.0,
            zero_crossing_thresh: 0.2,
            smoothing_factor: 5,
        }
    }
}

/// Options for [`ChallengeSession`](crate::ChallengeSession).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The frequency of A4 in Hz.
    pub a4_hz: f32,
    /// Lowest note index used for interval generation while no voice
    /// range has been calibrated.
    pub min_note_index: i32,
    /// Highest note index used for interval generation while no voice
    /// range has been calibrated.
    pub max_note_index: i32,
    /// How long a single training tone sounds, in seconds.
    pub tone_duration_s: f32,
    /// Gap between the two notes of a played interval, in seconds.
    pub play_gap_s: f32,
    /// Divisor applied to the tick delta (ms) while the sung note
    /// matches; 10 means one second of singing right fills the bar.
    pub accumulate_divisor: f32,
    /// Divisor applied to the tick delta (ms) while the sung note does
    /// not match; larger means slower regression.
    pub decay_divisor: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            a4_hz: 440.0,
            min_note_index: 24,
            max_note_index: 71,
            tone_duration_s: 2.0,
            play_gap_s: 1.0,
            accumulate_divisor: 10.0,
            decay_divisor: 30.0,
        }
    }
}
