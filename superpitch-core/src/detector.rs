//! # Pitch Detection Module
//!
//! Time-domain autocorrelation pitch detection with an RMS silence gate
//! and consensus-window hysteresis on the reported note.
//!
//! The detector is tick-driven: the host scheduler (timer, render loop
//! or test harness) calls [`PitchDetector::on_tick`] or pulls results
//! via [`PitchDetector::detect_from_current_buffer`]. No scheduling
//! primitive is assumed by the core.

use crate::config::DetectorConfig;
use crate::error::{ChallengeError, Result};
use crate::note_math;
use crate::DetectionResult;

/// The audio input collaborator: supplies fixed-size mono float PCM
/// frames at a known sample rate.
///
/// The environment either grants capture or it does not; device
/// enumeration and permission flows live entirely on the other side of
/// this trait.
pub trait FrameSource {
    /// Whether the source has granted capture and is producing frames.
    fn is_ready(&self) -> bool;
    /// Sample rate of the supplied frames in Hz.
    fn sample_rate(&self) -> u32;
    /// Copies the most recent frame into `out`. Called once per tick.
    fn latest_frame(&mut self, out: &mut [f32]);
}

/// Callback invoked once per tick while continuous detection runs.
///
/// Receives the fresh result, the current timestamp and the previous
/// tick's timestamp (both in milliseconds on the host clock) so the
/// caller can compute its own delta time.
pub type TickCallback = Box<dyn FnMut(&DetectionResult, f64, Option<f64>)>;

/// Autocorrelation pitch detector over a fixed-size analysis frame.
///
/// Constructed once per audio source and kept for the life of the
/// process; `start`/`stop` only toggle the continuous callback mode.
pub struct PitchDetector<S: FrameSource> {
    source: S,
    config: DetectorConfig,
    frame: Vec<f32>,
    /// Sliding window recording "note differed from the accepted note"
    /// per tick. Starts all-true so the very first detection is adopted
    /// immediately.
    note_change: Vec<bool>,
    accepted_note: Option<i32>,
    is_detecting: bool,
    callback: Option<TickCallback>,
    last_tick_ms: Option<f64>,
    last_result: DetectionResult,
}

impl<S: FrameSource> PitchDetector<S> {
    /// Creates a detector reading `frame_size`-sample frames from `source`.
    pub fn new(source: S, frame_size: usize, config: DetectorConfig) -> Self {
        Self {
            source,
            frame: vec![0.0; frame_size],
            note_change: vec![true; config.smoothing_factor.max(1)],
            config,
            accepted_note: None,
            is_detecting: false,
            callback: None,
            last_tick_ms: None,
            last_result: DetectionResult::default(),
        }
    }

    /// Activates continuous detection.
    ///
    /// Each subsequent [`on_tick`](Self::on_tick) computes a fresh
    /// result and hands it to `callback` together with the current and
    /// previous tick timestamps.
    ///
    /// Fails with [`ChallengeError::NotReady`] when the source has not
    /// granted capture and with [`ChallengeError::AlreadyDetecting`] on
    /// a double start.
    pub fn start(&mut self, callback: TickCallback) -> Result<()> {
        if !self.source.is_ready() {
            return Err(ChallengeError::NotReady);
        }
        if self.is_detecting {
            return Err(ChallengeError::AlreadyDetecting);
        }
        self.is_detecting = true;
        self.callback = Some(callback);
        self.last_tick_ms = None;
        log::debug!("continuous pitch detection started");
        Ok(())
    }

    /// Stops continuous detection. Idempotent.
    ///
    /// Clears the active flag and resets the hysteresis state, so the
    /// next detection run must re-accumulate consensus for its note.
    pub fn stop(&mut self) {
        if self.is_detecting {
            log::debug!("continuous pitch detection stopped");
        }
        self.is_detecting = false;
        self.callback = None;
        self.last_tick_ms = None;
        self.reset_smoothing(true);
    }

    /// Whether continuous detection is currently active.
    pub fn is_detecting(&self) -> bool {
        self.is_detecting
    }

    /// Adjusts the RMS gate live.
    pub fn set_rms_threshold_db(&mut self, value: f32) {
        log::debug!("rms threshold set to {value} dBFS");
        self.config.rms_threshold_db = value;
    }

    /// The most recent detection result.
    pub fn detected(&self) -> &DetectionResult {
        &self.last_result
    }

    /// Shared access to the frame source collaborator.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Exclusive access to the frame source collaborator.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// One scheduling tick of continuous detection.
    ///
    /// No-op unless [`start`](Self::start) is active; no tick runs
    /// after [`stop`](Self::stop) completes.
    pub fn on_tick(&mut self, now_ms: f64) {
        if !self.is_detecting {
            return;
        }
        let result = self.detect_from_current_buffer();
        let previous_ms = self.last_tick_ms.replace(now_ms);
        // Taken out so the callback cannot observe a half-updated detector.
        if let Some(mut callback) = self.callback.take() {
            callback(&result, now_ms, previous_ms);
            if self.callback.is_none() {
                self.callback = Some(callback);
            }
        }
    }

    /// Pull-based synchronous detection over the latest audio frame.
    ///
    /// Used by the challenge session's own tick loop instead of the
    /// push callbacks; does not require `start` to be driving it.
    pub fn detect_from_current_buffer(&mut self) -> DetectionResult {
        self.source.latest_frame(&mut self.frame);
        let sample_rate = self.source.sample_rate();
        let (rms_db, frequency) = autocorrelate(
            &self.frame,
            sample_rate,
            self.config.rms_threshold_db,
            self.config.zero_crossing_thresh,
        );

        let result = match frequency {
            None => {
                // Silence: a new note must re-accumulate consensus once
                // signal returns.
                self.note_change.fill(false);
                DetectionResult {
                    rms_db,
                    ..DetectionResult::default()
                }
            }
            Some(freq) => {
                let reported = self.smooth(note_math::note_index_from_frequency(
                    freq,
                    self.config.a4_hz,
                ));
                DetectionResult {
                    rms_db,
                    frequency: Some(freq),
                    note_index: reported,
                    detuning_cents: reported
                        .map(|idx| note_math::detuning_cents(freq, idx, self.config.a4_hz)),
                }
            }
        };
        self.last_result = result.clone();
        result
    }

    /// Note-change hysteresis: only adopt a changed note index once the
    /// whole consensus window agrees; otherwise keep reporting the
    /// previously accepted note.
    fn smooth(&mut self, note_index: i32) -> Option<i32> {
        if self.accepted_note == Some(note_index) {
            return self.accepted_note;
        }
        let len = self.note_change.len();
        self.note_change.rotate_left(1);
        self.note_change[len - 1] = true;
        if self.note_change.iter().all(|&changed| changed) {
            self.note_change.fill(false);
            self.accepted_note = Some(note_index);
        }
        self.accepted_note
    }

    fn reset_smoothing(&mut self, erase_accepted_note: bool) {
        self.note_change.fill(false);
        if erase_accepted_note {
            self.accepted_note = None;
        }
    }
}

/// Estimates the fundamental frequency of `frame` by time-domain
/// autocorrelation.
///
/// Returns the frame's RMS level in dBFS and, when the frame passes the
/// gate and yields a plausible period, the frequency in Hz.
fn autocorrelate(
    frame: &[f32],
    sample_rate: u32,
    rms_threshold_db: f32,
    zero_crossing_thresh: f32,
) -> (f32, Option<f32>) {
    let len = frame.len();
    if len == 0 {
        return (f32::NEG_INFINITY, None);
    }

    // Check for signal first.
    let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / len as f32).sqrt();
    let rms_db = note_math::db_fs(rms);
    if rms_db < rms_threshold_db {
        return (rms_db, None);
    }

    // Trim leading and trailing high-amplitude stretches so the
    // correlation starts near a zero crossing.
    let mut r1 = 0;
    for (i, &sample) in frame.iter().take(len / 2).enumerate() {
        if sample.abs() < zero_crossing_thresh {
            r1 = i;
            break;
        }
    }
    let mut r2 = len - 1;
    for i in 1..len / 2 {
        if frame[len - i].abs() < zero_crossing_thresh {
            r2 = len - i;
            break;
        }
    }

    let buffer = &frame[r1..r2];
    let n = buffer.len();
    if n < 3 {
        return (rms_db, None);
    }

    // O(n^2) over the trimmed length; the frame is one FFT window's
    // worth of samples, small enough for a per-tick pass.
    let mut corr = vec![0.0f32; n];
    for (lag, sum) in corr.iter_mut().enumerate() {
        for j in 0..n - lag {
            *sum += buffer[j] * buffer[j + lag];
        }
    }

    // Walk past the initial downslope, then take the strongest lag
    // after it as the period estimate.
    let mut d = 0;
    while d + 1 < n && corr[d] > corr[d + 1] {
        d += 1;
    }
    if d + 1 >= n {
        return (rms_db, None);
    }
    let mut max_pos = d;
    for i in d..n {
        if corr[i] > corr[max_pos] {
            max_pos = i;
        }
    }
    let mut t0 = max_pos as f32;

    // Parabolic interpolation around the peak lag for sub-sample
    // accuracy; skipped when the quadratic coefficient vanishes.
    if max_pos >= 1 && max_pos + 1 < n {
        let x1 = corr[max_pos - 1];
        let x2 = corr[max_pos];
        let x3 = corr[max_pos + 1];
        let a = (x1 + x3 - 2.0 * x2) / 2.0;
        let b = (x3 - x1) / 2.0;
        if a != 0.0 {
            t0 -= b / (2.0 * a);
        }
    }

    let frequency = sample_rate as f32 / t0;
    // Final guard: only report valid, audible frequencies.
    if frequency.is_finite() && frequency > 20.0 {
        (rms_db, Some(frequency))
    } else {
        (rms_db, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::f32::consts::TAU;
    use std::rc::Rc;

    const FRAME_SIZE: usize = 2048;
    const SAMPLE_RATE: u32 = 44100;

    /// Test stand-in for the audio input collaborator.
    struct TestSource {
        frame: Vec<f32>,
        ready: bool,
    }

    impl TestSource {
        fn silent() -> Self {
            Self {
                frame: vec![0.0; FRAME_SIZE],
                ready: true,
            }
        }

        fn sine(freq: f32) -> Self {
            let mut source = Self::silent();
            source.set_sine(freq);
            source
        }

        fn set_sine(&mut self, freq: f32) {
            for (i, sample) in self.frame.iter_mut().enumerate() {
                *sample = (TAU * freq * i as f32 / SAMPLE_RATE as f32).sin() * 0.8;
            }
        }
    }

    impl FrameSource for TestSource {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn sample_rate(&self) -> u32 {
            SAMPLE_RATE
        }

        fn latest_frame(&mut self, out: &mut [f32]) {
            out.copy_from_slice(&self.frame);
        }
    }

    fn detector(source: TestSource) -> PitchDetector<TestSource> {
        PitchDetector::new(source, FRAME_SIZE, DetectorConfig::default())
    }

    #[test]
    fn detects_440_hz_as_a4() {
        let mut det = detector(TestSource::sine(440.0));
        let result = det.detect_from_current_buffer();
        let freq = result.frequency.expect("tone should be detected");
        assert!((freq - 440.0).abs() / 440.0 < 0.01, "freq was {freq}");
        assert_eq!(result.note_index, Some(45));
        assert!(result.detuning_cents.is_some());
        assert!(result.rms_db > -40.0);
    }

    #[test]
    fn silent_frame_yields_no_frequency() {
        let mut det = detector(TestSource::silent());
        let result = det.detect_from_current_buffer();
        assert_eq!(result.frequency, None);
        assert_eq!(result.note_index, None);
        assert_eq!(result.detuning_cents, None);
        assert_eq!(result.rms_db, f32::NEG_INFINITY);
    }

    #[test]
    fn first_detection_is_adopted_immediately() {
        let mut det = detector(TestSource::sine(261.63)); // C4
        let result = det.detect_from_current_buffer();
        assert_eq!(result.note_index, Some(36));
    }

    #[test]
    fn hysteresis_holds_until_consensus() {
        let smoothing = DetectorConfig::default().smoothing_factor;
        let mut det = detector(TestSource::sine(440.0));
        assert_eq!(det.detect_from_current_buffer().note_index, Some(45));

        // Switch to C5, three semitones up.
        det.source.set_sine(523.25);
        for _ in 0..smoothing - 1 {
            let result = det.detect_from_current_buffer();
            assert_eq!(result.note_index, Some(45), "held note must not change yet");
        }
        let result = det.detect_from_current_buffer();
        assert_eq!(result.note_index, Some(48), "consensus reached, note adopted");
    }

    #[test]
    fn detuning_is_measured_against_the_held_note() {
        let mut det = detector(TestSource::sine(440.0));
        assert_eq!(det.detect_from_current_buffer().note_index, Some(45));

        // One frame of a different note: the index is held at 45, so the
        // detuning is the full distance to the new frequency.
        det.source.set_sine(523.25);
        let result = det.detect_from_current_buffer();
        assert_eq!(result.note_index, Some(45));
        let cents = result.detuning_cents.unwrap();
        assert!((280..=320).contains(&cents), "got {cents}");
    }

    #[test]
    fn silence_resets_consensus() {
        let smoothing = DetectorConfig::default().smoothing_factor;
        let mut det = detector(TestSource::sine(440.0));
        assert_eq!(det.detect_from_current_buffer().note_index, Some(45));

        det.source.set_sine(523.25);
        for _ in 0..smoothing - 1 {
            det.detect_from_current_buffer();
        }
        // Silence wipes the partially filled window...
        det.source.frame.fill(0.0);
        det.detect_from_current_buffer();
        // ...so the new note needs a full window again.
        det.source.set_sine(523.25);
        for _ in 0..smoothing - 1 {
            assert_eq!(det.detect_from_current_buffer().note_index, Some(45));
        }
        assert_eq!(det.detect_from_current_buffer().note_index, Some(48));
    }

    #[test]
    fn start_fails_when_source_not_ready() {
        let mut source = TestSource::silent();
        source.ready = false;
        let mut det = detector(source);
        let err = det.start(Box::new(|_, _, _| {})).unwrap_err();
        assert_eq!(err, ChallengeError::NotReady);
        assert!(!det.is_detecting());
    }

    #[test]
    fn double_start_fails() {
        let mut det = detector(TestSource::sine(440.0));
        det.start(Box::new(|_, _, _| {})).unwrap();
        let err = det.start(Box::new(|_, _, _| {})).unwrap_err();
        assert_eq!(err, ChallengeError::AlreadyDetecting);
        assert!(det.is_detecting());
    }

    #[test]
    fn stop_is_idempotent_and_allows_restart() {
        let mut det = detector(TestSource::sine(440.0));
        det.start(Box::new(|_, _, _| {})).unwrap();
        det.stop();
        det.stop();
        assert!(!det.is_detecting());
        det.start(Box::new(|_, _, _| {})).unwrap();
    }

    #[test]
    fn on_tick_invokes_callback_with_timestamps() {
        let seen = Rc::new(Cell::new((0usize, None::<f64>)));
        let seen_in_cb = Rc::clone(&seen);
        let mut det = detector(TestSource::sine(440.0));
        det.start(Box::new(move |result, _now, previous| {
            assert!(result.frequency.is_some());
            let (count, _) = seen_in_cb.get();
            seen_in_cb.set((count + 1, previous));
        }))
        .unwrap();

        det.on_tick(16.0);
        assert_eq!(seen.get(), (1, None));
        det.on_tick(32.0);
        assert_eq!(seen.get(), (2, Some(16.0)));
    }

    #[test]
    fn no_tick_runs_after_stop() {
        let count = Rc::new(Cell::new(0usize));
        let count_in_cb = Rc::clone(&count);
        let mut det = detector(TestSource::sine(440.0));
        det.start(Box::new(move |_, _, _| count_in_cb.set(count_in_cb.get() + 1)))
            .unwrap();
        det.on_tick(16.0);
        det.stop();
        det.on_tick(32.0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn stop_forgets_the_accepted_note() {
        let smoothing = DetectorConfig::default().smoothing_factor;
        let mut det = detector(TestSource::sine(440.0));
        assert_eq!(det.detect_from_current_buffer().note_index, Some(45));
        det.stop();
        // With the accepted note erased and the window cleared, the same
        // tone reports no note index until consensus rebuilds.
        for _ in 0..smoothing - 1 {
            assert_eq!(det.detect_from_current_buffer().note_index, None);
        }
        assert_eq!(det.detect_from_current_buffer().note_index, Some(45));
    }

    #[test]
    fn raising_the_gate_mutes_a_quiet_tone() {
        let mut det = detector(TestSource::sine(440.0));
        for sample in det.source.frame.iter_mut() {
            *sample *= 0.02; // roughly -37 dBFS RMS
        }
        assert!(det.detect_from_current_buffer().frequency.is_some());
        det.set_rms_threshold_db(-20.0);
        assert!(det.detect_from_current_buffer().frequency.is_none());
    }
}
