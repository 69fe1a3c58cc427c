//! # Note Math Module
//!
//! Pure conversions between frequency, note index, note name and cents
//! detuning, based on equal temperament around a configurable A4.
//!
//! A note index is the semitone distance from C1; index 45 is the
//! reference pitch (A4 when `a4 = 440`). The module also carries the
//! fixed semitone-to-interval table that both interval generation and
//! listen-answer checking are built on.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// The twelve chromatic note names, leaving out the flat spellings
/// as they are all enharmonic.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Static map for quick note name to chromatic position lookups.
static NOTE_POSITIONS: Lazy<BTreeMap<&'static str, i32>> = Lazy::new(|| {
    NOTE_NAMES
        .iter()
        .enumerate()
        .map(|(i, &name)| (name, i as i32))
        .collect()
});

/// Identifies the note index closest to a frequency.
///
/// # Arguments
/// * `freq` - Input frequency in Hz
/// * `a4` - The frequency of A4 in Hz (usually 440)
///
/// # Returns
/// * The note index, without detuning from its core frequency
pub fn note_index_from_frequency(freq: f32, a4: f32) -> i32 {
    (12.0 * (freq / a4).log2()).round() as i32 + 45
}

/// Calculates the core frequency of a note index in equal temperament.
pub fn frequency_from_note_index(note_index: i32, a4: f32) -> f32 {
    a4 * 2.0_f32.powf((note_index - 45) as f32 / 12.0)
}

/// Calculates the detuning of a frequency from a note's core frequency.
///
/// Cents are a logarithmic unit of pitch measurement where 100 cents
/// equal one semitone. The result is floored, matching the rest of the
/// detection pipeline.
pub fn detuning_cents(freq: f32, note_index: i32, a4: f32) -> i32 {
    (1200.0 * (freq / frequency_from_note_index(note_index, a4)).log2()).floor() as i32
}

/// Converts an amplitude between 0 and 1 into dB full scale.
///
/// An amplitude of zero maps to negative infinity, which any finite
/// RMS gate rejects.
pub fn db_fs(amplitude: f32) -> f32 {
    20.0 * amplitude.abs().log10()
}

/// A note resolved from its index: octave number, name and core frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub octave: i32,
    pub name: &'static str,
    pub frequency: f32,
}

/// Resolves a note index into octave, name and core frequency.
///
/// Index 0 is C1; the octave increments at every C.
pub fn note_from_note_index(note_index: i32, a4: f32) -> Note {
    Note {
        octave: note_index.div_euclid(12) + 1,
        name: NOTE_NAMES[note_index.rem_euclid(12) as usize],
        frequency: frequency_from_note_index(note_index, a4),
    }
}

/// Identifies the note index from an octave number and a note name.
///
/// Returns `None` for names outside [`NOTE_NAMES`] (flat spellings
/// included).
pub fn note_index_from_note(octave: i32, name: &str) -> Option<i32> {
    NOTE_POSITIONS
        .get(name)
        .map(|position| 12 * (octave - 1) + position)
}

/// The categorical type of a musical interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalType {
    Second,
    Third,
    Fourth,
    Tritone,
    Fifth,
    Sixth,
    Seventh,
    Octave,
}

/// The quality of a musical interval.
///
/// The tritone is the degenerate case: it has no minor/major split and
/// is classified as perfect here, as are the fourth, fifth and octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalQuality {
    Minor,
    Major,
    Perfect,
}

/// One row of the semitone-to-interval table.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalInfo {
    pub semitones: u8,
    pub itype: IntervalType,
    pub quality: IntervalQuality,
    pub display_text: &'static str,
}

/// The fixed table mapping 1..=12 semitones to interval type and quality.
///
/// This is the single source of truth for both interval generation and
/// listen-answer checking.
pub static INTERVAL_TABLE: Lazy<Vec<IntervalInfo>> = Lazy::new(|| {
    use IntervalQuality::*;
    use IntervalType::*;
    vec![
        (1, Second, Minor, "Minor second"),
        (2, Second, Major, "Major second"),
        (3, Third, Minor, "Minor third"),
        (4, Third, Major, "Major third"),
        (5, Fourth, Perfect, "Fourth"),
        (6, Tritone, Perfect, "Tritone"),
        (7, Fifth, Perfect, "Fifth"),
        (8, Sixth, Minor, "Minor sixth"),
        (9, Sixth, Major, "Major sixth"),
        (10, Seventh, Minor, "Minor seventh"),
        (11, Seventh, Major, "Major seventh"),
        (12, Octave, Perfect, "Octave"),
    ]
    .into_iter()
    .map(|(semitones, itype, quality, display_text)| IntervalInfo {
        semitones,
        itype,
        quality,
        display_text,
    })
    .collect()
});

/// Looks up the interval type and quality for a semitone count.
///
/// Returns `None` outside `1..=12`.
pub fn interval_class(semitones: u8) -> Option<&'static IntervalInfo> {
    if (1..=12).contains(&semitones) {
        Some(&INTERVAL_TABLE[semitones as usize - 1])
    } else {
        None
    }
}
