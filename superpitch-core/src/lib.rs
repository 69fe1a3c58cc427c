// superpitch-core/src/lib.rs

//! The core logic for the SuperPitch interval trainer.
//! This crate is responsible for real-time pitch detection, randomized
//! interval generation, and the listen/sing challenge state machine.
//! It is completely headless and contains no GUI code; audio input,
//! audio output and range persistence are injected collaborators.

pub mod audio;
pub mod challenge;
pub mod config;
pub mod detector;
pub mod error;
pub mod interval;
pub mod note_math;

pub use challenge::{ChallengeSession, RangeStore, SessionMode, TickUpdate, ToneSink};
pub use config::{DetectorConfig, SessionConfig};
pub use detector::{FrameSource, PitchDetector};
pub use error::ChallengeError;
pub use interval::{ChallengeKind, Direction, Interval, VoiceRange};
pub use note_math::{IntervalQuality, IntervalType};

/// Represents the result of a single pitch detection tick.
// Recreated on every tick; holders must not assume it is updated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Signal level of the analyzed frame in dB full scale.
    pub rms_db: f32,
    /// The detected fundamental frequency in Hz.
    /// `None` when the frame is below the RMS gate.
    pub frequency: Option<f32>,
    /// Semitone index of the reported note (45 = A4).
    /// `None` together with `frequency`, or while the note-change
    /// consensus window is still filling after a reset.
    pub note_index: Option<i32>,
    /// Detuning from the reported note's core frequency, in cents.
    pub detuning_cents: Option<i32>,
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self {
            rms_db: f32::NEG_INFINITY,
            frequency: None,
            note_index: None,
            detuning_cents: None,
        }
    }
}
