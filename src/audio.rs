//! Audio output boundary.  The engine only ever calls [`SoundBackend::trigger`],
//! which pushes a voice and returns; rendering happens on the device thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use log::{info, warn};

use crate::error::{Result, StrumError};
use crate::instrument::{ChordVoicing, Mixer, SoundMode};
use crate::pattern::StrokeType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Stroke(StrokeType),
    /// Metronome pulse, never rendered by the stroke instrument.
    Click { accent: bool },
}

pub trait SoundBackend {
    /// Unlock/open the output.  Idempotent once it has succeeded.
    fn ensure_started(&mut self) -> Result<()>;
    fn is_started(&self) -> bool;
    /// Fire-and-forget.  Must not block on rendering.
    fn trigger(&mut self, trigger: Trigger);
    fn set_sound_mode(&mut self, mode: SoundMode);
    fn sound_mode(&self) -> SoundMode;
}

// ── cpal output ───────────────────────────────────────────────────────────────

/// Default output device rendering a shared [`Mixer`].
///
/// The stream is opened lazily by `ensure_started`, so constructing an engine
/// never touches the audio device.
pub struct AudioOutput {
    mixer: Arc<Mutex<Mixer>>,
    stream: Option<cpal::Stream>,
}

fn lock(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    // The mixer holds no invariants a panic could break; keep rendering.
    mixer.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AudioOutput {
    pub fn new() -> Self {
        Self::with_mode(SoundMode::default(), ChordVoicing::default())
    }

    pub fn with_mode(mode: SoundMode, voicing: ChordVoicing) -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer::new(44_100.0, mode, voicing))),
            stream: None,
        }
    }

    pub fn set_voicing(&mut self, voicing: ChordVoicing) {
        lock(&self.mixer).set_voicing(voicing);
    }

    pub fn voicing(&self) -> ChordVoicing {
        lock(&self.mixer).voicing()
    }

    pub fn set_volume(&mut self, volume: f32) {
        lock(&self.mixer).set_volume(volume);
    }

    pub fn active_voices(&self) -> usize {
        lock(&self.mixer).active_voices()
    }

    fn open_stream(&self) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| StrumError::AudioUnavailable("no default output device".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| StrumError::AudioUnavailable(e.to_string()))?;

        let sample_rate = config.sample_rate().0 as f32;
        lock(&self.mixer).sample_rate = sample_rate;
        info!(
            "opening output '{}' at {} Hz, {} ch, {:?}",
            device.name().unwrap_or_default(),
            sample_rate,
            config.channels(),
            config.sample_format()
        );

        let mixer = Arc::clone(&self.mixer);
        match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), mixer),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), mixer),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), mixer),
            other => Err(StrumError::AudioUnavailable(format!("unsupported sample format {other:?}"))),
        }
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut mixer = lock(&mixer);
                for frame in data.chunks_mut(channels) {
                    let sample = T::from_sample(mixer.next_sample());
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| warn!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| StrumError::AudioUnavailable(e.to_string()))?;
    stream.play().map_err(|e| StrumError::AudioUnavailable(e.to_string()))?;
    Ok(stream)
}

impl SoundBackend for AudioOutput {
    fn ensure_started(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.stream = Some(self.open_stream()?);
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.stream.is_some()
    }

    fn trigger(&mut self, trigger: Trigger) {
        lock(&self.mixer).trigger(trigger);
    }

    fn set_sound_mode(&mut self, mode: SoundMode) {
        lock(&self.mixer).set_mode(mode);
    }

    fn sound_mode(&self) -> SoundMode {
        lock(&self.mixer).mode()
    }
}

// ── Recording backend ─────────────────────────────────────────────────────────

/// Silent backend that remembers every trigger with the mode it sounded in.
/// Used for headless runs and tests; `failing()` models a device that never
/// unlocks.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub triggers: Vec<(SoundMode, Trigger)>,
    mode: SoundMode,
    started: bool,
    fail_start: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail_start: true, ..Self::default() }
    }

    pub fn strokes(&self) -> impl Iterator<Item = StrokeType> + '_ {
        self.triggers.iter().filter_map(|(_, t)| match t {
            Trigger::Stroke(s) => Some(*s),
            Trigger::Click { .. } => None,
        })
    }

    pub fn clicks(&self) -> usize {
        self.triggers.iter().filter(|(_, t)| matches!(t, Trigger::Click { .. })).count()
    }
}

impl SoundBackend for RecordingBackend {
    fn ensure_started(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(StrumError::AudioUnavailable("output locked".to_string()));
        }
        self.started = true;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn trigger(&mut self, trigger: Trigger) {
        self.triggers.push((self.mode, trigger));
    }

    fn set_sound_mode(&mut self, mode: SoundMode) {
        self.mode = mode;
    }

    fn sound_mode(&self) -> SoundMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_backend_start() {
        let mut b = RecordingBackend::new();
        assert!(!b.is_started());
        b.ensure_started().unwrap();
        b.ensure_started().unwrap();
        assert!(b.is_started());

        let mut f = RecordingBackend::failing();
        assert!(matches!(f.ensure_started(), Err(StrumError::AudioUnavailable(_))));
        assert!(!f.is_started());
    }

    #[test]
    fn test_audio_output_is_lazy() {
        let mut out = AudioOutput::new();
        assert!(!out.is_started());
        out.set_sound_mode(SoundMode::Guitar);
        assert_eq!(out.sound_mode(), SoundMode::Guitar);
        out.trigger(Trigger::Stroke(StrokeType::Down));
        assert!(out.active_voices() > 0);
    }

    #[test]
    fn test_voicing_change_reaches_mixer() {
        let mut out = AudioOutput::with_mode(SoundMode::Guitar, ChordVoicing::EMinor);
        out.set_voicing(ChordVoicing::C);
        assert_eq!(out.voicing(), ChordVoicing::C);
    }
}
