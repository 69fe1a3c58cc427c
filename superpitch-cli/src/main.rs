// superpitch-cli/src/main.rs

//! Terminal host for the SuperPitch interval trainer.
//!
//! Wires the cpal capture source and tone output into the core's tick
//! loop. Two modes:
//!
//!   superpitch-cli monitor   live pitch readout from the microphone
//!   superpitch-cli sing      one sing-challenge round in the terminal

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use superpitch_core::audio::{CaptureSource, ToneOutput, FRAME_SIZE};
use superpitch_core::note_math::note_from_note_index;
use superpitch_core::{
    ChallengeSession, DetectorConfig, Direction, PitchDetector, SessionConfig,
};

/// Host tick interval. The detector only needs a fresh frame per tick,
/// so anything near the display refresh rate is plenty.
const TICK: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    env_logger::init();

    let mode = std::env::args().nth(1);
    match mode.as_deref() {
        Some("monitor") | None => run_monitor(),
        Some("sing") => run_sing_round(),
        Some(other) => bail!("unknown mode `{other}`, expected `monitor` or `sing`"),
    }
}

/// Prints the detected note, detuning and signal level until killed.
fn run_monitor() -> Result<()> {
    let source = CaptureSource::start()?;
    let mut detector = PitchDetector::new(source, FRAME_SIZE, DetectorConfig::default());

    detector.start(Box::new(|result, _, _| {
        let mut out = std::io::stdout().lock();
        let line = match (result.frequency, result.note_index, result.detuning_cents) {
            (Some(freq), Some(index), Some(cents)) => {
                let note = note_from_note_index(index, 440.0);
                format!(
                    "{:>7.2} Hz  {}{} {:+} cents  ({:.1} dBFS)",
                    freq, note.name, note.octave, cents, result.rms_db
                )
            }
            _ => format!("       --              ({:.1} dBFS)", result.rms_db),
        };
        let _ = write!(out, "\r{line:<48}");
        let _ = out.flush();
    }))?;

    println!("Listening; sing or play into the microphone. Ctrl-C to quit.");
    let epoch = Instant::now();
    loop {
        detector.on_tick(epoch.elapsed().as_secs_f64() * 1000.0);
        thread::sleep(TICK);
    }
}

/// Runs a single sing challenge: play the root, sing both notes.
fn run_sing_round() -> Result<()> {
    let source = CaptureSource::start()?;
    let mut output = ToneOutput::start()?;
    let mut detector = PitchDetector::new(source, FRAME_SIZE, DetectorConfig::default());
    let mut session = ChallengeSession::new(SessionConfig::default());
    let mut rng = StdRng::from_entropy();

    let interval = session
        .new_sing_interval(&mut rng, None, Direction::Random)?
        .clone();
    let root = note_from_note_index(interval.notes[0], 440.0);
    let target = note_from_note_index(interval.notes[1], 440.0);
    let arrow = if interval.notes[1] > interval.notes[0] { "up" } else { "down" };

    println!(
        "Sing a {} {arrow} from {}{}: first match the root, then find {}{}.",
        interval_label(interval.semitones),
        root.name,
        root.octave,
        target.name,
        target.octave,
    );

    session.play_root_note(&mut output, 0.0)?;

    let epoch = Instant::now();
    loop {
        let now_ms = epoch.elapsed().as_secs_f64() * 1000.0;
        let update = session.on_tick(&mut detector, now_ms);

        let [first, second] = session.progress();
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{}  {}", bar(first), bar(second));
        let _ = out.flush();

        if let Some(note) = update.completed_note {
            let done = note_from_note_index(note, 440.0);
            let _ = writeln!(out, "\n{}{} locked in.", done.name, done.octave);
        }
        if update.challenge_complete {
            println!("Interval complete, well sung.");
            return Ok(());
        }

        thread::sleep(TICK);
    }
}

fn interval_label(semitones: u8) -> &'static str {
    superpitch_core::note_math::interval_class(semitones)
        .map(|info| info.display_text)
        .unwrap_or("interval")
}

/// Ten-segment progress bar over a 0..=100 value.
fn bar(progress: f32) -> String {
    let filled = (progress / 10.0).round() as usize;
    format!("[{}{}]", "#".repeat(filled.min(10)), "-".repeat(10 - filled.min(10)))
}
