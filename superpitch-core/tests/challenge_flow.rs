//! End-to-end challenge flows over the public API, with synthetic
//! audio standing in for the microphone and the speaker.

use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::SeedableRng;

use superpitch_core::note_math::frequency_from_note_index;
use superpitch_core::{
    ChallengeSession, DetectorConfig, Direction, FrameSource, IntervalQuality, IntervalType,
    PitchDetector, SessionConfig, SessionMode, ToneSink, VoiceRange,
};

const FRAME_SIZE: usize = 2048;
const SAMPLE_RATE: u32 = 44100;

/// A microphone that sings whatever note the test tells it to.
struct SyntheticVoice {
    frame: Vec<f32>,
}

impl SyntheticVoice {
    fn new() -> Self {
        Self {
            frame: vec![0.0; FRAME_SIZE],
        }
    }

    fn sing(&mut self, note_index: i32) {
        let freq = frequency_from_note_index(note_index, 440.0);
        for (i, sample) in self.frame.iter_mut().enumerate() {
            *sample = (TAU * freq * i as f32 / SAMPLE_RATE as f32).sin() * 0.7;
        }
    }
}

impl FrameSource for SyntheticVoice {
    fn is_ready(&self) -> bool {
        true
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn latest_frame(&mut self, out: &mut [f32]) {
        out.copy_from_slice(&self.frame);
    }
}

/// A speaker that only counts what it was asked to play.
#[derive(Default)]
struct CountingSink {
    tones: Vec<(f32, f32, f32)>,
}

impl ToneSink for CountingSink {
    fn play_tone(&mut self, frequency: f32, start_s: f32, duration_s: f32) -> anyhow::Result<()> {
        self.tones.push((frequency, start_s, duration_s));
        Ok(())
    }
}

#[test]
fn full_sing_round_completes_both_notes() {
    let mut session = ChallengeSession::new(SessionConfig::default());
    let mut detector = PitchDetector::new(SyntheticVoice::new(), FRAME_SIZE, DetectorConfig::default());
    let mut sink = CountingSink::default();
    let mut rng = StdRng::seed_from_u64(1);

    let interval = session
        .new_sing_interval(&mut rng, Some(&[7]), Direction::Up)
        .unwrap()
        .clone();
    assert_eq!(interval.notes[1] - interval.notes[0], 7);
    assert_eq!(session.mode(), SessionMode::SingAwaitingRoot);

    session.play_root_note(&mut sink, 0.0).unwrap();
    assert_eq!(sink.tones.len(), 1);
    assert_eq!(session.mode(), SessionMode::SingDetecting);

    // Start singing the root once the played tone has died down.
    detector.source_mut().sing(interval.notes[0]);

    let mut completed = false;
    let mut now_ms = 2000.0;
    for _ in 0..400 {
        let update = session.on_tick(&mut detector, now_ms);
        now_ms += 100.0;

        if update.completed_note == Some(interval.notes[0]) {
            // First note done, move on to the second.
            detector.source_mut().sing(interval.notes[1]);
        }
        if update.challenge_complete {
            completed = true;
            break;
        }
    }

    assert!(completed, "sing challenge never completed");
    assert_eq!(session.sung_notes(), &interval.notes);
    assert_eq!(session.mode(), SessionMode::Idle);
    assert_eq!(session.progress(), [100.0, 100.0]);
}

#[test]
fn full_listen_round_from_generation_to_answer() {
    let mut session = ChallengeSession::new(SessionConfig::default());
    let mut sink = CountingSink::default();
    let mut rng = StdRng::seed_from_u64(2);

    // A minor third, up or down: the categorical answer is the same.
    session
        .new_listen_interval(&mut rng, Some(&[3]), Direction::Random)
        .unwrap();
    session.play_interval(&mut sink, 0.0).unwrap();

    // Two tones, one play-gap apart, two seconds each.
    assert_eq!(sink.tones.len(), 2);
    assert_eq!(sink.tones[0].1, 0.0);
    assert_eq!(sink.tones[1].1, 1.0);
    assert!(sink.tones.iter().all(|&(_, _, dur)| dur == 2.0));
    assert!(session.is_output_playing());

    assert_eq!(
        session.check_listen_answer(IntervalType::Third, IntervalQuality::Minor),
        Ok(true)
    );
    assert_eq!(session.mode(), SessionMode::Idle);
}

#[test]
fn wrong_guess_can_be_retried_until_a_new_interval() {
    let mut session = ChallengeSession::new(SessionConfig::default());
    let mut sink = CountingSink::default();
    let mut rng = StdRng::seed_from_u64(3);

    session
        .new_listen_interval(&mut rng, Some(&[3]), Direction::Up)
        .unwrap();
    session.play_interval(&mut sink, 0.0).unwrap();

    // Wrong quality first, then the corrected guess on the same
    // interval; it may also be replayed in between.
    assert_eq!(
        session.check_listen_answer(IntervalType::Third, IntervalQuality::Major),
        Ok(false)
    );
    session.play_interval(&mut sink, 5_000.0).unwrap();
    assert_eq!(
        session.check_listen_answer(IntervalType::Third, IntervalQuality::Minor),
        Ok(true)
    );

    // Generating the next interval retires the old answer.
    session
        .new_listen_interval(&mut rng, Some(&[8]), Direction::Down)
        .unwrap();
    assert!(session
        .check_listen_answer(IntervalType::Third, IntervalQuality::Minor)
        .is_err());
}

#[test]
fn push_mode_detection_feeds_a_host_callback() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let mut detector =
        PitchDetector::new(SyntheticVoice::new(), FRAME_SIZE, DetectorConfig::default());
    detector.source_mut().sing(45);

    let notes: Rc<RefCell<Vec<Option<i32>>>> = Rc::default();
    let notes_in_cb = Rc::clone(&notes);
    detector
        .start(Box::new(move |result, _, _| {
            notes_in_cb.borrow_mut().push(result.note_index);
        }))
        .unwrap();

    for tick in 0..5 {
        detector.on_tick(16.0 * tick as f64);
    }
    detector.stop();
    detector.on_tick(1000.0);

    assert_eq!(&*notes.borrow(), &vec![Some(45); 5]);
}

#[test]
fn calibration_then_generation_stays_inside_the_sung_range() {
    let mut session = ChallengeSession::new(SessionConfig::default());
    let mut detector =
        PitchDetector::new(SyntheticVoice::new(), FRAME_SIZE, DetectorConfig::default());

    session.start_voice_range_calibration().unwrap();

    let mut now_ms = 0.0;
    for note in [38, 31, 51, 44] {
        detector.source_mut().sing(note);
        // Hold each note past the consensus window.
        for _ in 0..8 {
            session.on_tick(&mut detector, now_ms);
            now_ms += 100.0;
        }
    }

    let range = session.commit_voice_range(None).unwrap();
    assert_eq!(range, VoiceRange { min: 31, max: 51 });

    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..100 {
        let interval = session
            .new_sing_interval(&mut rng, None, Direction::Random)
            .unwrap();
        for note in interval.notes {
            assert!((31..=51).contains(&note), "note {note} outside sung range");
        }
    }
}
