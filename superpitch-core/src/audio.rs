//! # Audio Collaborators Module
//!
//! cpal-backed implementations of the audio collaborators: a capture
//! source that streams fixed-size mono frames through a channel, and a
//! tone output that synthesizes the training tones.
//!
//! The capture callback runs on cpal's audio thread; everything crosses
//! into the tick loop through a bounded crossbeam channel, so the
//! detector stays the sole writer of detection state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{bounded, Receiver};

use crate::challenge::ToneSink;
use crate::detector::FrameSource;

/// Audio buffer size for detection frames.
///
/// One FFT-window's worth of samples: enough lag range for low voices,
/// small enough for the per-tick O(n²) autocorrelation.
pub const FRAME_SIZE: usize = 2048;

/// Preferred capture/playback sample rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Fade-in of the synthesized tone envelope, in seconds.
pub const FADE_IN_S: f32 = 0.01;
/// Fade-out of the synthesized tone envelope, in seconds.
pub const FADE_OUT_S: f32 = 1.0;

// Voicing of the training tone: a sine carrier with a quiet, slightly
// detuned sawtooth layered on top, under a fixed master gain.
const MASTER_GAIN: f32 = 0.5;
const SAW_MIX: f32 = 0.1;
const SAW_DETUNE_CENTS: f32 = 5.0;

/// Microphone capture wired up as a [`FrameSource`].
///
/// Owns the cpal input stream; dropping the source stops capture.
pub struct CaptureSource {
    _stream: cpal::Stream,
    receiver: Receiver<Vec<f32>>,
    sample_rate: u32,
    frame: Vec<f32>,
}

impl CaptureSource {
    /// Starts audio capture from the default input device.
    ///
    /// Selects a mono f32 configuration as close to 44.1 kHz as the
    /// device supports and accumulates the callback's buffers into
    /// [`FRAME_SIZE`]-sample frames.
    pub fn start() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        log::info!("using audio input device: {}", device.name()?);

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
            .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

        let rate = TARGET_SAMPLE_RATE.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        );
        let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
        let sample_rate = config.sample_rate().0;
        let config: cpal::StreamConfig = config.into();

        log::info!("selected capture sample rate: {sample_rate} Hz");

        let (sender, receiver) = bounded::<Vec<f32>>(8);
        let err_fn = |err| log::error!("error on the capture stream: {err}");

        // This buffer accumulates audio data from the callback.
        let mut audio_buffer = Vec::with_capacity(FRAME_SIZE * 2);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                audio_buffer.extend_from_slice(data);

                // While we have enough data for a full frame, ship it.
                while audio_buffer.len() >= FRAME_SIZE {
                    let frame = audio_buffer[..FRAME_SIZE].to_vec();
                    // Ignore errors when the tick loop is behind; only
                    // the latest frame matters for detection.
                    let _ = sender.try_send(frame);
                    audio_buffer.drain(..FRAME_SIZE);
                }
            },
            err_fn,
            None,
        )?;

        stream.play()?;

        Ok(Self {
            _stream: stream,
            receiver,
            sample_rate,
            frame: vec![0.0; FRAME_SIZE],
        })
    }
}

impl FrameSource for CaptureSource {
    fn is_ready(&self) -> bool {
        // Construction fails when capture is denied, so a live value
        // always has a granted, playing stream behind it.
        true
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn latest_frame(&mut self, out: &mut [f32]) {
        // Drain the channel and keep only the newest frame; before the
        // first frame arrives the buffer stays silent.
        while let Ok(frame) = self.receiver.try_recv() {
            self.frame.copy_from_slice(&frame);
        }
        out.copy_from_slice(&self.frame);
    }
}

/// Finds the best supported input configuration for the target rate:
/// mono, f32, closest sample rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i32 - target_rate as i32).abs();
            let max_diff = (c.max_sample_rate().0 as i32 - target_rate as i32).abs();
            min_diff.min(max_diff)
        })
}

/// One scheduled tone inside the output callback.
struct Voice {
    frequency: f32,
    /// First and one-past-last sample index on the stream clock.
    start: u64,
    end: u64,
    phase: f32,
    saw_phase: f32,
}

impl Voice {
    /// Next sample of this voice at stream position `pos`, or `None`
    /// once the voice has finished.
    fn sample(&mut self, pos: u64, sample_rate: f32) -> Option<f32> {
        if pos >= self.end {
            return None;
        }
        if pos < self.start {
            return Some(0.0);
        }

        let elapsed = (pos - self.start) as f32 / sample_rate;
        let total = (self.end - self.start) as f32 / sample_rate;
        let fade_in = (elapsed / FADE_IN_S).min(1.0);
        let fade_out = ((total - elapsed) / FADE_OUT_S).clamp(0.0, 1.0);

        let sine = (self.phase * std::f32::consts::TAU).sin();
        let saw = 2.0 * self.saw_phase - 1.0;

        self.phase = (self.phase + self.frequency / sample_rate).fract();
        let saw_freq = self.frequency * 2.0_f32.powf(SAW_DETUNE_CENTS / 1200.0);
        self.saw_phase = (self.saw_phase + saw_freq / sample_rate).fract();

        Some((sine + SAW_MIX * saw) * fade_in * fade_out * MASTER_GAIN)
    }
}

/// Sine-plus-sawtooth tone synthesis wired up as a [`ToneSink`].
///
/// Owns the cpal output stream; tones are scheduled on the stream's
/// own sample clock, so `start_s` offsets stay accurate regardless of
/// callback buffer sizes.
pub struct ToneOutput {
    _stream: cpal::Stream,
    sample_rate: u32,
    cursor: Arc<AtomicU64>,
    voices: Arc<Mutex<Vec<Voice>>>,
}

impl ToneOutput {
    /// Starts tone output on the default output device.
    pub fn start() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;

        log::info!("using audio output device: {}", device.name()?);

        let config = device.default_output_config()?;
        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(anyhow!("No f32 output format available"));
        }
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let config: cpal::StreamConfig = config.into();

        let cursor = Arc::new(AtomicU64::new(0));
        let voices: Arc<Mutex<Vec<Voice>>> = Arc::new(Mutex::new(Vec::new()));

        let cursor_in_cb = Arc::clone(&cursor);
        let voices_in_cb = Arc::clone(&voices);
        let err_fn = |err| log::error!("error on the output stream: {err}");

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = cursor_in_cb.load(Ordering::Relaxed);
                let mut voices = match voices_in_cb.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                for frame in data.chunks_mut(channels) {
                    let mut mix = 0.0;
                    voices.retain_mut(|voice| match voice.sample(pos, sample_rate as f32) {
                        Some(sample) => {
                            mix += sample;
                            true
                        }
                        None => false,
                    });
                    for out in frame.iter_mut() {
                        *out = mix;
                    }
                    pos += 1;
                }
                cursor_in_cb.store(pos, Ordering::Relaxed);
            },
            err_fn,
            None,
        )?;

        stream.play()?;

        Ok(Self {
            _stream: stream,
            sample_rate,
            cursor,
            voices,
        })
    }
}

impl ToneSink for ToneOutput {
    fn play_tone(&mut self, frequency: f32, start_s: f32, duration_s: f32) -> Result<()> {
        let now = self.cursor.load(Ordering::Relaxed);
        let start = now + (start_s.max(0.0) * self.sample_rate as f32) as u64;
        let end = start + (duration_s.max(0.0) * self.sample_rate as f32) as u64;
        let mut voices = self
            .voices
            .lock()
            .map_err(|_| anyhow!("output voice list poisoned"))?;
        voices.push(Voice {
            frequency,
            start,
            end,
            phase: 0.0,
            saw_phase: 0.0,
        });
        Ok(())
    }
}
