//! Error types for the interval trainer core.
//!
//! Every variant is a synchronous precondition failure; nothing here is
//! retried internally. Absence of a detectable pitch is *not* an error,
//! it is a normal [`DetectionResult`](crate::DetectionResult) with
//! `frequency` absent.

use thiserror::Error;

/// Precondition failures reported by the detector, the interval
/// generator and the challenge state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    /// The audio source has not granted capture yet.
    #[error("audio source is not ready to capture")]
    NotReady,

    /// `start` was called while detection (or calibration) is already
    /// running.
    #[error("already detecting, start may only be called once at a time")]
    AlreadyDetecting,

    /// A challenge kind string the trainer does not know.
    #[error("invalid challenge kind `{0}`, expected `listen` or `sing`")]
    InvalidChallengeKind(String),

    /// A direction string outside `up`, `down` and `random`.
    #[error("invalid interval direction `{0}`")]
    InvalidDirection(String),

    /// The operation needs a generated interval that does not exist for
    /// the current mode.
    #[error("no active interval for this operation")]
    NoActiveInterval,

    /// Interval generation was asked to draw from an empty semitone set.
    #[error("no semitone counts to choose from")]
    EmptySemitoneSet,

    /// A semitone count outside the 1..=12 interval table.
    #[error("semitone count {0} is outside 1..=12")]
    InvalidSemitones(u8),

    /// Voice range calibration has not produced a usable range yet, or
    /// a commit/cancel was requested without an active calibration.
    #[error("voice range calibration has not produced a usable range")]
    RangeNotCalibrated,

    /// An interval was requested while voice range calibration is
    /// running; commit or cancel the calibration first.
    #[error("voice range calibration is in progress")]
    CalibrationInProgress,
}

pub type Result<T> = std::result::Result<T, ChallengeError>;
