//! # Interval Generation Module
//!
//! Randomized musical intervals constrained by a note-index range and a
//! direction policy. The semitone-to-class mapping comes from the fixed
//! table in [`note_math`]; this module only draws and bounds the notes.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ChallengeError, Result};
use crate::note_math::{self, IntervalQuality, IntervalType};

/// All twelve semitone counts; the default draw set.
pub const ALL_SEMITONES: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

/// The two kinds of training challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Listen,
    Sing,
}

impl FromStr for ChallengeKind {
    type Err = ChallengeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "listen" => Ok(ChallengeKind::Listen),
            "sing" => Ok(ChallengeKind::Sing),
            other => Err(ChallengeError::InvalidChallengeKind(other.to_string())),
        }
    }
}

/// Direction policy for interval generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    /// Resolved to `Up` or `Down` uniformly at generation time.
    Random,
}

impl FromStr for Direction {
    type Err = ChallengeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "random" => Ok(Direction::Random),
            other => Err(ChallengeError::InvalidDirection(other.to_string())),
        }
    }
}

/// The calibrated [lowest, highest] note index a user can comfortably
/// sing. Invariant once finalized: `min < max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceRange {
    pub min: i32,
    pub max: i32,
}

/// A generated interval: two note indices plus the categorical label.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    /// Distance between the two notes, 1..=12.
    pub semitones: u8,
    pub itype: IntervalType,
    pub quality: IntervalQuality,
    /// Start and end note index, both within the generation range.
    pub notes: [i32; 2],
    /// Index of the next note to sing; meaningful for sing challenges
    /// only.
    pub next_note: usize,
}

impl Interval {
    /// Whether every note of the interval has been sung.
    pub fn is_complete(&self) -> bool {
        self.next_note >= self.notes.len()
    }
}

/// Generates a random interval within `range`.
///
/// The start note is drawn uniformly from `[range.min, range.max)`;
/// the upper bound itself is never drawn as a start. If the computed
/// end note falls outside the range, the interval is shifted onto the
/// violated bound. For ranges spanning at least the drawn semitone
/// count this keeps both notes within `[range.min, range.max]`
/// inclusive; a narrower range instead pushes the recomputed start
/// past the opposite bound.
///
/// `allowed_semitones` defaults to all of `1..=12` when `None`; an
/// empty set or a count outside the table fails explicitly.
pub fn generate<R: Rng>(
    kind: ChallengeKind,
    range: VoiceRange,
    allowed_semitones: Option<&[u8]>,
    direction: Direction,
    rng: &mut R,
) -> Result<Interval> {
    let direction = match direction {
        Direction::Random => {
            if rng.gen_bool(0.5) {
                Direction::Up
            } else {
                Direction::Down
            }
        }
        resolved => resolved,
    };

    let allowed = allowed_semitones.unwrap_or(&ALL_SEMITONES);
    if allowed.is_empty() {
        return Err(ChallengeError::EmptySemitoneSet);
    }
    let semitones = allowed[rng.gen_range(0..allowed.len())];
    let info =
        note_math::interval_class(semitones).ok_or(ChallengeError::InvalidSemitones(semitones))?;

    let start = rng.gen_range(range.min..range.max);
    let step = semitones as i32;
    let mut notes = match direction {
        Direction::Up => [start, start + step],
        Direction::Down => [start, start - step],
        Direction::Random => unreachable!("direction was resolved above"),
    };

    // Boundary correction: shift the whole interval onto the violated
    // bound instead of redrawing.
    match direction {
        Direction::Up if notes[1] > range.max => notes = [range.max - step, range.max],
        Direction::Down if notes[1] < range.min => notes = [range.min + step, range.min],
        _ => {}
    }

    log::debug!(
        "generated {kind:?} interval: {} ({:?} {:?}), notes {:?}",
        info.display_text,
        info.quality,
        info.itype,
        notes
    );

    Ok(Interval {
        semitones,
        itype: info.itype,
        quality: info.quality,
        notes,
        next_note: 0,
    })
}
