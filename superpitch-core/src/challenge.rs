//! # Challenge Session Module
//!
//! The state machine driving a training session. A session owns the
//! active interval and the per-note singing progress; the pitch
//! detector, the tone sink and the range store are collaborators the
//! host injects.
//!
//! State transitions:
//!
//! ```text
//! Idle ──new_listen_interval──▶ ListenReady ──play_interval──▶ ListenPlayed
//!      ◀────────── check_listen_answer (correct or not) ──────────┘
//! Idle ──new_sing_interval──▶ SingAwaitingRoot ──play_root_note──▶ SingDetecting
//!      ◀────────────── all interval notes sung ────────────────────┘
//! Idle ──start_voice_range_calibration──▶ CalibratingVoiceRange
//!      ◀────────── commit_voice_range / cancel ────────────────────┘
//! ```
//!
//! There is no terminal state; the machine is re-entered per interval
//! and driven externally by [`ChallengeSession::on_tick`].

use rand::Rng;

use crate::config::SessionConfig;
use crate::detector::{FrameSource, PitchDetector};
use crate::error::{ChallengeError, Result};
use crate::interval::{self, ChallengeKind, Direction, Interval, VoiceRange};
use crate::note_math::{frequency_from_note_index, IntervalQuality, IntervalType};
use crate::DetectionResult;

/// The audio output collaborator.
///
/// The core only depends on being able to schedule a tone and on
/// knowing its total span; envelopes (0.01 s fade-in, 1 s fade-out by
/// default) and synthesis are the sink's business.
pub trait ToneSink {
    /// Schedules a tone of `duration_s` seconds starting `start_s`
    /// seconds from now.
    fn play_tone(&mut self, frequency: f32, start_s: f32, duration_s: f32) -> anyhow::Result<()>;
}

/// The voice-range persistence collaborator.
///
/// The session only reports a newly committed range; it never reads
/// challenge logic back from the store. Failures are logged and
/// otherwise opaque to the core.
pub trait RangeStore {
    fn store_range(&mut self, range: &VoiceRange) -> anyhow::Result<()>;
}

/// The mode a [`ChallengeSession`] is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Ready for the next interval or a calibration.
    Idle,
    /// A listen interval is generated but has not sounded yet.
    ListenReady,
    /// The listen interval has sounded; an answer may be checked.
    ListenPlayed,
    /// A sing interval is generated; the root note has not sounded yet.
    SingAwaitingRoot,
    /// The per-tick progress loop is judging the user's singing.
    SingDetecting,
    /// Per-tick detection is widening the running voice range.
    CalibratingVoiceRange,
}

/// What a single session tick produced, for the host to render.
#[derive(Debug, Clone)]
pub struct TickUpdate {
    /// The detection result computed this tick.
    pub detection: DetectionResult,
    /// A note index that just reached full progress, if any.
    pub completed_note: Option<i32>,
    /// True on the tick that completed the whole sing interval.
    pub challenge_complete: bool,
}

/// A training session for one challenge screen.
///
/// Created per screen activation and destroyed when the user exits;
/// the pitch detector outlives it and is passed into each tick.
pub struct ChallengeSession {
    config: SessionConfig,
    mode: SessionMode,
    /// Active interval, replaced wholesale on regeneration.
    interval: Option<Interval>,
    kind: Option<ChallengeKind>,
    /// Whether the active listen interval has sounded at least once;
    /// answers stay checkable against it until a new interval replaces
    /// it, so a wrong guess may be retried.
    interval_played: bool,
    /// Effective generation range; seeded from the config bounds until
    /// a calibration commit or a restored range replaces it.
    voice_range: VoiceRange,
    range_is_calibrated: bool,
    /// Running (min, max) while calibrating; `None` until the first
    /// detection seeds it.
    running_range: Option<(i32, i32)>,
    /// Per-note progress accumulators in [0, 100].
    progress: [f32; 2],
    sung_notes: Vec<i32>,
    /// Set while a synthesized tone is sounding so scoring never
    /// credits the engine's own output.
    is_output_playing: bool,
    output_playing_until_ms: Option<f64>,
    last_tick_ms: Option<f64>,
}

impl ChallengeSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            voice_range: VoiceRange {
                min: config.min_note_index,
                max: config.max_note_index,
            },
            config,
            mode: SessionMode::Idle,
            interval: None,
            kind: None,
            interval_played: false,
            range_is_calibrated: false,
            running_range: None,
            progress: [0.0, 0.0],
            sung_notes: Vec::new(),
            is_output_playing: false,
            output_playing_until_ms: None,
            last_tick_ms: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// The active interval, if one has been generated.
    pub fn interval(&self) -> Option<&Interval> {
        self.interval.as_ref()
    }

    /// Per-note progress accumulators in [0, 100].
    pub fn progress(&self) -> [f32; 2] {
        self.progress
    }

    /// Notes sung to completion for the active sing interval, in order.
    pub fn sung_notes(&self) -> &[i32] {
        &self.sung_notes
    }

    /// The range interval generation currently draws from.
    pub fn voice_range(&self) -> VoiceRange {
        self.voice_range
    }

    /// Whether the range came from a calibration or a restored value
    /// rather than the config defaults.
    pub fn range_is_calibrated(&self) -> bool {
        self.range_is_calibrated
    }

    /// Running (min, max) of the current calibration, once seeded.
    pub fn running_range(&self) -> Option<(i32, i32)> {
        self.running_range
    }

    pub fn is_output_playing(&self) -> bool {
        self.is_output_playing
    }

    /// Whether the per-tick loop is currently consuming detections.
    pub fn is_detecting(&self) -> bool {
        matches!(
            self.mode,
            SessionMode::SingDetecting | SessionMode::CalibratingVoiceRange
        )
    }

    /// Restores a previously persisted voice range (e.g. from the
    /// account backend). The invariant `min < max` is enforced here so
    /// generation never sees an empty range.
    pub fn set_voice_range(&mut self, range: VoiceRange) -> Result<()> {
        if range.min >= range.max {
            return Err(ChallengeError::RangeNotCalibrated);
        }
        self.voice_range = range;
        self.range_is_calibrated = true;
        Ok(())
    }

    /// Generates and stores a new listen interval.
    pub fn new_listen_interval<R: Rng>(
        &mut self,
        rng: &mut R,
        allowed_semitones: Option<&[u8]>,
        direction: Direction,
    ) -> Result<&Interval> {
        self.new_interval(ChallengeKind::Listen, rng, allowed_semitones, direction)
    }

    /// Generates and stores a new sing interval and resets the progress
    /// accumulators and the sung-note record.
    pub fn new_sing_interval<R: Rng>(
        &mut self,
        rng: &mut R,
        allowed_semitones: Option<&[u8]>,
        direction: Direction,
    ) -> Result<&Interval> {
        self.new_interval(ChallengeKind::Sing, rng, allowed_semitones, direction)
    }

    fn new_interval<R: Rng>(
        &mut self,
        kind: ChallengeKind,
        rng: &mut R,
        allowed_semitones: Option<&[u8]>,
        direction: Direction,
    ) -> Result<&Interval> {
        if self.mode == SessionMode::CalibratingVoiceRange {
            return Err(ChallengeError::CalibrationInProgress);
        }
        let interval = interval::generate(kind, self.voice_range, allowed_semitones, direction, rng)?;
        self.kind = Some(kind);
        self.interval_played = false;
        self.progress = [0.0, 0.0];
        self.sung_notes.clear();
        self.mode = match kind {
            ChallengeKind::Listen => SessionMode::ListenReady,
            ChallengeKind::Sing => SessionMode::SingAwaitingRoot,
        };
        Ok(self.interval.insert(interval))
    }

    /// Plays both notes of the listen interval sequentially.
    ///
    /// `is_output_playing` stays set for the full playback span so the
    /// engine never scores its own tones. `now_ms` must come from the
    /// same host clock that drives [`on_tick`](Self::on_tick).
    pub fn play_interval(&mut self, sink: &mut dyn ToneSink, now_ms: f64) -> Result<()> {
        if self.mode == SessionMode::CalibratingVoiceRange {
            return Err(ChallengeError::CalibrationInProgress);
        }
        if self.kind != Some(ChallengeKind::Listen) {
            return Err(ChallengeError::NoActiveInterval);
        }
        let interval = self.interval.as_ref().ok_or(ChallengeError::NoActiveInterval)?;

        for (i, &note) in interval.notes.iter().enumerate() {
            let freq = frequency_from_note_index(note, self.config.a4_hz);
            sink.play_tone(
                freq,
                i as f32 * self.config.play_gap_s,
                self.config.tone_duration_s,
            )
            .map_err(|err| {
                log::warn!("tone sink rejected note {note}: {err}");
                ChallengeError::NotReady
            })?;
        }

        let span_s = interval.notes.len() as f32 * self.config.play_gap_s
            + self.config.tone_duration_s;
        self.begin_output_span(now_ms, span_s);
        self.interval_played = true;
        self.mode = SessionMode::ListenPlayed;
        Ok(())
    }

    /// Checks an answer against the stored listen interval.
    ///
    /// Only the categorical labels are compared, never the semitone
    /// count. The session returns to [`SessionMode::Idle`] regardless
    /// of the outcome, but the interval stays answerable until a new
    /// one is generated, so a wrong guess may be retried.
    pub fn check_listen_answer(
        &mut self,
        answer_type: IntervalType,
        answer_quality: IntervalQuality,
    ) -> Result<bool> {
        if self.mode == SessionMode::CalibratingVoiceRange {
            return Err(ChallengeError::CalibrationInProgress);
        }
        if self.kind != Some(ChallengeKind::Listen) || !self.interval_played {
            return Err(ChallengeError::NoActiveInterval);
        }
        let interval = self.interval.as_ref().ok_or(ChallengeError::NoActiveInterval)?;
        let correct = interval.itype == answer_type && interval.quality == answer_quality;
        self.mode = SessionMode::Idle;
        Ok(correct)
    }

    /// Plays only the sing interval's first note and starts the per-tick
    /// progress loop.
    pub fn play_root_note(&mut self, sink: &mut dyn ToneSink, now_ms: f64) -> Result<()> {
        if self.kind != Some(ChallengeKind::Sing)
            || !matches!(
                self.mode,
                SessionMode::SingAwaitingRoot | SessionMode::SingDetecting
            )
        {
            return Err(ChallengeError::NoActiveInterval);
        }
        let interval = self.interval.as_ref().ok_or(ChallengeError::NoActiveInterval)?;

        let freq = frequency_from_note_index(interval.notes[0], self.config.a4_hz);
        sink.play_tone(freq, 0.0, self.config.tone_duration_s)
            .map_err(|err| {
                log::warn!("tone sink rejected root note: {err}");
                ChallengeError::NotReady
            })?;

        self.begin_output_span(now_ms, self.config.tone_duration_s);
        self.mode = SessionMode::SingDetecting;
        Ok(())
    }

    /// Starts voice range calibration: per tick, the running min/max of
    /// the detected note index widens monotonically.
    pub fn start_voice_range_calibration(&mut self) -> Result<()> {
        if self.mode == SessionMode::CalibratingVoiceRange {
            return Err(ChallengeError::AlreadyDetecting);
        }
        self.running_range = None;
        self.mode = SessionMode::CalibratingVoiceRange;
        Ok(())
    }

    /// Finalizes the running min/max into the session's voice range and
    /// reports it to the optional persistence collaborator.
    pub fn commit_voice_range(
        &mut self,
        store: Option<&mut dyn RangeStore>,
    ) -> Result<VoiceRange> {
        if self.mode != SessionMode::CalibratingVoiceRange {
            return Err(ChallengeError::RangeNotCalibrated);
        }
        let (min, max) = self.running_range.ok_or(ChallengeError::RangeNotCalibrated)?;
        if min >= max {
            // A single detected note is not a range.
            return Err(ChallengeError::RangeNotCalibrated);
        }
        let range = VoiceRange { min, max };
        self.voice_range = range;
        self.range_is_calibrated = true;
        self.running_range = None;
        self.mode = SessionMode::Idle;
        if let Some(store) = store {
            // Persistence failures are the collaborator's problem; the
            // committed range stays in effect either way.
            if let Err(err) = store.store_range(&range) {
                log::warn!("failed to persist voice range: {err}");
            }
        }
        log::info!("voice range committed: {} to {}", range.min, range.max);
        Ok(range)
    }

    /// Discards the running calibration. Idempotent.
    pub fn cancel_voice_range_calibration(&mut self) {
        if self.mode == SessionMode::CalibratingVoiceRange {
            self.mode = SessionMode::Idle;
        }
        self.running_range = None;
    }

    /// One scheduling tick.
    ///
    /// Pulls a detection from `detector`, expires the output-playing
    /// span, and updates singing progress or the calibration range
    /// depending on the mode. `now_ms` comes from the host clock; the
    /// first tick after a mode change only seeds the delta time.
    pub fn on_tick<S: FrameSource>(
        &mut self,
        detector: &mut PitchDetector<S>,
        now_ms: f64,
    ) -> TickUpdate {
        let delta_ms = self
            .last_tick_ms
            .replace(now_ms)
            .map_or(0.0, |last| (now_ms - last).max(0.0));

        if let Some(until) = self.output_playing_until_ms {
            if now_ms >= until {
                self.is_output_playing = false;
                self.output_playing_until_ms = None;
            }
        }

        let detection = detector.detect_from_current_buffer();
        let mut update = TickUpdate {
            detection,
            completed_note: None,
            challenge_complete: false,
        };

        match self.mode {
            SessionMode::SingDetecting => self.update_sing_progress(delta_ms, &mut update),
            SessionMode::CalibratingVoiceRange => {
                if let Some(idx) = update.detection.note_index {
                    self.running_range = Some(match self.running_range {
                        None => (idx, idx),
                        Some((min, max)) => (min.min(idx), max.max(idx)),
                    });
                }
            }
            _ => {}
        }

        update
    }

    /// Progress rule for the current target note: accumulate while the
    /// detected note matches and no tone is sounding, decay otherwise.
    /// Indices other than the target never move.
    fn update_sing_progress(&mut self, delta_ms: f64, update: &mut TickUpdate) {
        let Some(interval) = self.interval.as_mut() else {
            return;
        };
        let target = interval.next_note;
        if target >= interval.notes.len() {
            return;
        }
        let expected = interval.notes[target];

        let matches =
            !self.is_output_playing && update.detection.note_index == Some(expected);
        if matches {
            let gained = delta_ms as f32 / self.config.accumulate_divisor;
            self.progress[target] = (self.progress[target] + gained).min(100.0);
            if self.progress[target] >= 100.0 {
                self.sung_notes.push(expected);
                interval.next_note += 1;
                update.completed_note = Some(expected);
                if interval.is_complete() {
                    self.mode = SessionMode::Idle;
                    update.challenge_complete = true;
                }
            }
        } else if self.progress[target] > 0.0 {
            let lost = delta_ms as f32 / self.config.decay_divisor;
            self.progress[target] = (self.progress[target] - lost).max(0.0);
        }
    }

    fn begin_output_span(&mut self, now_ms: f64, span_s: f32) {
        self.is_output_playing = true;
        self.output_playing_until_ms = Some(now_ms + span_s as f64 * 1000.0);
    }
}
