//! Sound rendering: the two interchangeable stroke instruments, the metronome
//! click, and the polyphonic mixer the audio callback pulls samples from.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::audio::Trigger;
use crate::dsp::{next_seed, note_to_freq, xorshift, Biquad};
use crate::pattern::StrokeType;

const MAX_VOICES: usize = 64;

// ── Sound mode ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundMode {
    Guitar,
    #[default]
    Percussion,
}

impl SoundMode {
    pub fn next(self) -> Self {
        match self {
            Self::Guitar     => Self::Percussion,
            Self::Percussion => Self::Guitar,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Guitar     => "Guitar",
            Self::Percussion => "Percussion",
        }
    }
}

// ── Chord voicing ─────────────────────────────────────────────────────────────

/// Open-position chord the guitar strum rings out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordVoicing {
    #[default]
    EMinor,
    E,
    G,
    C,
    D,
    AMinor,
}

impl ChordVoicing {
    pub const ALL: [ChordVoicing; 6] = [
        ChordVoicing::EMinor,
        ChordVoicing::E,
        ChordVoicing::G,
        ChordVoicing::C,
        ChordVoicing::D,
        ChordVoicing::AMinor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::EMinor => "Em",
            Self::E      => "E",
            Self::G      => "G",
            Self::C      => "C",
            Self::D      => "D",
            Self::AMinor => "Am",
        }
    }

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|&v| v == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    /// MIDI note per string, low E first.  `None` is a muted string.
    pub fn strings(self) -> [Option<u8>; 6] {
        match self {
            Self::EMinor => [Some(40), Some(47), Some(52), Some(55), Some(59), Some(64)],
            Self::E      => [Some(40), Some(47), Some(52), Some(56), Some(59), Some(64)],
            Self::G      => [Some(43), Some(47), Some(50), Some(55), Some(59), Some(67)],
            Self::C      => [None,     Some(48), Some(52), Some(55), Some(60), Some(64)],
            Self::D      => [None,     None,     Some(50), Some(57), Some(62), Some(66)],
            Self::AMinor => [None,     Some(45), Some(52), Some(57), Some(60), Some(64)],
        }
    }
}

// ── Voices ────────────────────────────────────────────────────────────────────

/// One plucked string (Karplus-Strong).  The delay line is seeded with
/// filtered noise; darker seed = fuller, warmer string.
pub struct PluckVoice {
    line: Vec<f32>,
    idx: usize,
    decay: f32,
    gain: f32,
    delay: u64,
    pos: u64,
    end: u64,
}

impl PluckVoice {
    #[allow(clippy::too_many_arguments)]
    fn new(freq: f32, sample_rate: f32, seed: u32, excite_cutoff: f32, decay: f32,
           gain: f32, delay_s: f32, dur_s: f32) -> Self {
        let len = (sample_rate / freq).round().max(2.0) as usize;
        let mut noise = seed | 1; // xorshift must never be 0
        let mut lp = Biquad::low_pass(sample_rate, excite_cutoff);
        let mut line: Vec<f32> = (0..len).map(|_| lp.process(xorshift(&mut noise))).collect();
        // Equal excitation energy per string; loudness comes from `gain` only.
        let rms = (line.iter().map(|s| s * s).sum::<f32>() / len as f32).sqrt();
        if rms > f32::EPSILON {
            line.iter_mut().for_each(|s| *s *= 0.5 / rms);
        }
        let delay = (delay_s * sample_rate) as u64;
        Self {
            line,
            idx: 0,
            decay,
            gain,
            delay,
            pos: 0,
            end: delay + (dur_s * sample_rate) as u64,
        }
    }

    fn next_sample(&mut self) -> f32 {
        let pos = self.pos;
        self.pos += 1;
        if pos < self.delay || pos >= self.end {
            return 0.0;
        }
        let len = self.line.len();
        let next = (self.idx + 1) % len;
        let out = self.line[self.idx];
        self.line[self.idx] = self.decay * 0.5 * (out + self.line[next]);
        self.idx = next;
        // Short fade at the tail avoids a click when the voice is dropped.
        let remaining = (self.end - pos) as f32;
        let fade = (remaining / 256.0).min(1.0);
        out * self.gain * fade
    }
}

/// Band-passed noise burst: the pick scraping across the strings.
pub struct ScrapeVoice {
    filter: Biquad,
    noise: u32,
    gain: f32,
    sample_rate: f32,
    pos: u64,
    end: u64,
    decay_rate: f32,
}

impl ScrapeVoice {
    fn new(sample_rate: f32, seed: u32, center: f32, gain: f32, dur_s: f32) -> Self {
        Self {
            filter: Biquad::band_pass(sample_rate, center, 1.2),
            noise: seed | 1,
            gain,
            sample_rate,
            pos: 0,
            end: (dur_s * sample_rate) as u64,
            decay_rate: 5.0 / dur_s,
        }
    }

    fn next_sample(&mut self) -> f32 {
        if self.pos >= self.end {
            return 0.0;
        }
        let t = self.pos as f32 / self.sample_rate;
        self.pos += 1;
        self.filter.process(xorshift(&mut self.noise)) * self.gain * (-t * self.decay_rate).exp()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrumKind { Kick, Snare }

impl DrumKind {
    /// Maximum duration (seconds) – the voice is dropped after this.
    fn duration(self) -> f32 {
        match self {
            Self::Kick  => 0.50,
            Self::Snare => 0.20,
        }
    }
}

/// One triggered drum hit.  Generates samples until it naturally decays.
pub struct DrumVoice {
    kind: DrumKind,
    sample_pos: u64,
    dur_samples: u64,
    /// Phase accumulator for tonal components (0..1 normalised).
    phase: f32,
    noise: u32,
    sample_rate: f32,
    volume: f32,
}

impl DrumVoice {
    fn new(kind: DrumKind, sample_rate: f32, seed: u32, volume: f32) -> Self {
        Self {
            kind,
            sample_pos: 0,
            dur_samples: (kind.duration() * sample_rate).ceil() as u64,
            phase: 0.0,
            noise: seed | 1,
            sample_rate,
            volume,
        }
    }

    fn next_sample(&mut self) -> f32 {
        if self.sample_pos >= self.dur_samples {
            return 0.0;
        }
        let t = self.sample_pos as f32 / self.sample_rate;
        let raw = match self.kind {
            DrumKind::Kick  => self.kick(t),
            DrumKind::Snare => self.snare(t),
        };
        self.sample_pos += 1;
        (raw * self.volume).clamp(-1.0, 1.0)
    }

    #[inline]
    fn sine(&mut self, freq: f32) -> f32 {
        self.phase += freq / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        (self.phase * 2.0 * PI).sin()
    }

    fn kick(&mut self, t: f32) -> f32 {
        // Exponential pitch sweep 150 → 50 Hz, fast transient click
        let freq = 50.0 + 100.0 * (-t * 32.0_f32).exp();
        let tone = self.sine(freq);
        let amp  = (-t * 11.0_f32).exp();
        let click = if t < 0.004 { xorshift(&mut self.noise) * 0.38 } else { 0.0 };
        (tone * 0.88 + click) * amp
    }

    fn snare(&mut self, t: f32) -> f32 {
        let noise = xorshift(&mut self.noise);
        let tone  = self.sine(195.0);
        let amp   = (-t * 24.0_f32).exp();
        (noise * 0.72 + tone * 0.28) * amp
    }
}

/// Metronome tick: a short decaying sine burst, higher on the downbeat.
pub struct ClickVoice {
    freq: f32,
    gain: f32,
    sample_rate: f32,
    pos: u64,
    end: u64,
}

impl ClickVoice {
    fn new(sample_rate: f32, accent: bool) -> Self {
        let (freq, dur, gain) = if accent { (1_500.0, 0.030, 0.7) } else { (1_000.0, 0.025, 0.45) };
        Self { freq, gain, sample_rate, pos: 0, end: (dur * sample_rate) as u64 }
    }

    fn next_sample(&mut self) -> f32 {
        if self.pos >= self.end {
            return 0.0;
        }
        let t = self.pos as f32 / self.sample_rate;
        self.pos += 1;
        (t * self.freq * 2.0 * PI).sin() * (-t * 150.0).exp() * self.gain
    }
}

pub enum Voice {
    Pluck(PluckVoice),
    Scrape(ScrapeVoice),
    Drum(DrumVoice),
    Click(ClickVoice),
}

impl Voice {
    pub fn next_sample(&mut self) -> f32 {
        match self {
            Self::Pluck(v)  => v.next_sample(),
            Self::Scrape(v) => v.next_sample(),
            Self::Drum(v)   => v.next_sample(),
            Self::Click(v)  => v.next_sample(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Self::Pluck(v)  => v.pos >= v.end,
            Self::Scrape(v) => v.pos >= v.end,
            Self::Drum(v)   => v.sample_pos >= v.dur_samples,
            Self::Click(v)  => v.pos >= v.end,
        }
    }
}

// ── Instruments ───────────────────────────────────────────────────────────────

/// Turns a stroke into the voices that sound it.
///
/// Must be `Send` so it can live behind the mixer mutex shared with the
/// audio thread.
pub trait Instrument: Send {
    fn mode(&self) -> SoundMode;
    fn strike(&mut self, stroke: StrokeType, sample_rate: f32, seed: u32) -> Vec<Voice>;
}

/// Simulated pick stroke across an open chord.
pub struct GuitarStrum {
    pub voicing: ChordVoicing,
}

impl GuitarStrum {
    pub fn new(voicing: ChordVoicing) -> Self {
        Self { voicing }
    }
}

impl Instrument for GuitarStrum {
    fn mode(&self) -> SoundMode {
        SoundMode::Guitar
    }

    fn strike(&mut self, stroke: StrokeType, sample_rate: f32, seed: u32) -> Vec<Voice> {
        let notes: Vec<u8> = self.voicing.strings().iter().flatten().copied().collect();
        // Downstrokes hit every string low→high with a warm, long ring;
        // upstrokes catch the top strings high→low, brighter and shorter.
        let (notes, stagger, cutoff, decay, dur): (Vec<u8>, f32, f32, f32, f32) = match stroke {
            StrokeType::Down => (notes, 0.009, 2_400.0, 0.996, 1.1),
            StrokeType::Up   => {
                let top: Vec<u8> = notes.iter().rev().take(4).copied().collect();
                (top, 0.006, 5_500.0, 0.993, 0.6)
            }
        };
        let gain = stroke.accent() * 0.5 / (notes.len().max(1) as f32).sqrt();

        let mut seed = seed;
        let mut voices: Vec<Voice> = notes
            .iter()
            .enumerate()
            .map(|(i, &note)| {
                seed = next_seed(seed);
                Voice::Pluck(PluckVoice::new(
                    note_to_freq(note), sample_rate, seed, cutoff, decay, gain,
                    i as f32 * stagger, dur,
                ))
            })
            .collect();
        let scrape_center = if stroke == StrokeType::Down { 2_000.0 } else { 3_500.0 };
        voices.push(Voice::Scrape(ScrapeVoice::new(
            sample_rate, next_seed(seed), scrape_center, 0.25 * stroke.accent(),
            stagger * notes.len() as f32 + 0.02,
        )));
        voices
    }
}

/// Kick on the downstroke, snare on the upstroke.
pub struct PercussionKit {
    pub volume: f32,
}

impl PercussionKit {
    pub fn new() -> Self {
        Self { volume: 0.85 }
    }
}

impl Default for PercussionKit {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for PercussionKit {
    fn mode(&self) -> SoundMode {
        SoundMode::Percussion
    }

    fn strike(&mut self, stroke: StrokeType, sample_rate: f32, seed: u32) -> Vec<Voice> {
        let kind = match stroke {
            StrokeType::Down => DrumKind::Kick,
            StrokeType::Up   => DrumKind::Snare,
        };
        vec![Voice::Drum(DrumVoice::new(kind, sample_rate, seed, self.volume * stroke.accent()))]
    }
}

pub fn instrument_for(mode: SoundMode, voicing: ChordVoicing) -> Box<dyn Instrument> {
    match mode {
        SoundMode::Guitar     => Box::new(GuitarStrum::new(voicing)),
        SoundMode::Percussion => Box::new(PercussionKit::new()),
    }
}

// ── Mixer ─────────────────────────────────────────────────────────────────────

/// Polyphonic voice pool fed by triggers and drained by the audio callback.
///
/// Swapping the instrument only changes what the *next* trigger produces;
/// voices already ringing play out untouched.
pub struct Mixer {
    pub sample_rate: f32,
    pub volume: f32,
    instrument: Box<dyn Instrument>,
    voicing: ChordVoicing,
    voices: Vec<Voice>,
    /// Advanced before each trigger so every hit has a distinct noise flavour.
    seed: u32,
}

impl Mixer {
    pub fn new(sample_rate: f32, mode: SoundMode, voicing: ChordVoicing) -> Self {
        Self {
            sample_rate,
            volume: 0.8,
            instrument: instrument_for(mode, voicing),
            voicing,
            voices: Vec::with_capacity(MAX_VOICES),
            seed: 0xBEEF_CAFE,
        }
    }

    pub fn mode(&self) -> SoundMode {
        self.instrument.mode()
    }

    pub fn set_mode(&mut self, mode: SoundMode) {
        if mode != self.mode() {
            self.instrument = instrument_for(mode, self.voicing);
        }
    }

    pub fn voicing(&self) -> ChordVoicing {
        self.voicing
    }

    pub fn set_voicing(&mut self, voicing: ChordVoicing) {
        self.voicing = voicing;
        if self.mode() == SoundMode::Guitar {
            self.instrument = instrument_for(SoundMode::Guitar, voicing);
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn trigger(&mut self, trigger: Trigger) {
        self.seed = next_seed(self.seed);
        let new_voices = match trigger {
            Trigger::Stroke(stroke) => self.instrument.strike(stroke, self.sample_rate, self.seed),
            Trigger::Click { accent } => vec![Voice::Click(ClickVoice::new(self.sample_rate, accent))],
        };
        self.voices.extend(new_voices);
        if self.voices.len() > MAX_VOICES {
            let excess = self.voices.len() - MAX_VOICES;
            self.voices.drain(..excess);
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn silence(&mut self) {
        self.voices.clear();
    }

    /// Mix one output sample.  Called from the audio thread.
    pub fn next_sample(&mut self) -> f32 {
        let mut mix = 0.0f32;
        for v in &mut self.voices {
            mix += v.next_sample();
        }
        self.voices.retain(|v| !v.is_finished());
        (mix * self.volume).tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44_100.0;

    fn render(mixer: &mut Mixer, n: usize) -> Vec<f32> {
        (0..n).map(|_| mixer.next_sample()).collect()
    }

    fn energy(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_downstroke_is_fuller_than_upstroke() {
        let mut guitar = GuitarStrum::new(ChordVoicing::EMinor);
        let down = guitar.strike(StrokeType::Down, SR, 1);
        let up = guitar.strike(StrokeType::Up, SR, 1);
        assert!(down.len() > up.len());

        let mut mixer = Mixer::new(SR, SoundMode::Guitar, ChordVoicing::EMinor);
        mixer.trigger(Trigger::Stroke(StrokeType::Down));
        let d = energy(&render(&mut mixer, 8_000));
        mixer.silence();
        mixer.trigger(Trigger::Stroke(StrokeType::Up));
        let u = energy(&render(&mut mixer, 8_000));
        assert!(d > u, "down {d} should be louder than up {u}");
    }

    #[test]
    fn test_percussion_maps_down_to_kick_and_up_to_snare() {
        let mut kit = PercussionKit::new();
        let down = kit.strike(StrokeType::Down, SR, 7);
        let up = kit.strike(StrokeType::Up, SR, 7);
        assert!(matches!(&down[..], [Voice::Drum(DrumVoice { kind: DrumKind::Kick, .. })]));
        assert!(matches!(&up[..], [Voice::Drum(DrumVoice { kind: DrumKind::Snare, .. })]));
    }

    #[test]
    fn test_voices_finish_and_are_dropped() {
        let mut mixer = Mixer::new(SR, SoundMode::Percussion, ChordVoicing::G);
        mixer.trigger(Trigger::Click { accent: true });
        mixer.trigger(Trigger::Stroke(StrokeType::Up));
        assert_eq!(mixer.active_voices(), 2);
        render(&mut mixer, SR as usize);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_mode_switch_keeps_ringing_voices() {
        let mut mixer = Mixer::new(SR, SoundMode::Percussion, ChordVoicing::C);
        mixer.trigger(Trigger::Stroke(StrokeType::Down));
        mixer.set_mode(SoundMode::Guitar);
        assert_eq!(mixer.mode(), SoundMode::Guitar);
        assert_eq!(mixer.active_voices(), 1);
        mixer.trigger(Trigger::Stroke(StrokeType::Down));
        // C voicing: five strings plus the pick scrape
        assert_eq!(mixer.active_voices(), 1 + 6);
    }

    #[test]
    fn test_output_is_bounded() {
        let mut mixer = Mixer::new(SR, SoundMode::Guitar, ChordVoicing::E);
        mixer.set_volume(1.0);
        for _ in 0..8 { mixer.trigger(Trigger::Stroke(StrokeType::Down)); }
        assert!(render(&mut mixer, 4_000).iter().all(|s| s.abs() <= 1.0));
    }
}
