//! # Playback Engine
//!
//! Turns a pattern (or a run of patterns) plus a tempo into armed timers, and
//! fires them from [`StrumEngine::poll`] on the caller's thread.
//!
//! ## Lifecycle
//! ```text
//! Idle --play--> Scheduled{measure} --MeasureEnd--> Completed{looping}
//!                     ^                                   |
//!                     +------- continues (arm next) ------+
//!                                                         |
//! Idle <------------------- ends / stop() ----------------+
//! ```
//! `Completed` only exists while a measure-end timer is being handled inside
//! `poll`; callers observe `Scheduled` or `Idle`.
//!
//! ## Timing
//! Every measure is armed relative to the *ideal* instant the previous one
//! ended (`start + measure`), never relative to when `poll` happened to run.
//! A late poll fires the overdue events in order with their ideal timestamps,
//! so N measures always span exactly N measure durations.
//!
//! ## Cancellation
//! A session owns the ids of every timer it armed, including the measure-end
//! timer that drives continuation.  `stop()` cancels them all before it
//! returns; nothing from a stopped session can fire afterwards.
//!
//! ## Ownership
//! Each engine owns its backend outright.  Several players on one screen each
//! build their own engine; no scheduling state is shared between them.

use std::time::Duration;

use log::{debug, info, warn};

use crate::audio::{AudioOutput, SoundBackend, Trigger};
use crate::clock::{Clock, MonotonicClock};
use crate::error::{Result, StrumError};
use crate::instrument::SoundMode;
use crate::pattern::{StrokeType, StrumPattern};
use crate::schedule::{EventKind, Tempo, Timeline};
use crate::timer::{TimerId, TimerQueue};

/// Identity of one `play_*` call.  Increases monotonically per engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

// ── Arrangement ───────────────────────────────────────────────────────────────

/// Patterns played back to back, one measure each.
#[derive(Clone, Debug, PartialEq)]
pub struct Arrangement {
    measures: Vec<StrumPattern>,
}

impl Arrangement {
    /// Every pattern is validated; an empty arrangement is rejected.
    pub fn new(measures: Vec<StrumPattern>) -> Result<Self> {
        if measures.is_empty() {
            return Err(StrumError::pattern("arrangement", "needs at least one measure"));
        }
        for pattern in &measures {
            pattern.validate()?;
        }
        Ok(Self { measures })
    }

    pub fn single(pattern: StrumPattern) -> Result<Self> {
        Self::new(vec![pattern])
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StrumPattern> {
        self.measures.get(index)
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlaybackEventKind {
    /// `pattern_index` is the measure's slot in the arrangement,
    /// `stroke_index` the stroke's index in that pattern's `strokes`.
    StrokeStarted { pattern_index: usize, stroke_index: usize, stroke_type: StrokeType },
    Click { beat: u32, accent: bool },
    MeasureCompleted { continues: bool },
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackEvent {
    pub session: SessionId,
    /// Measures played so far in this session, starting at 0.
    pub measure: u64,
    /// Scheduled (ideal) time on the engine clock.
    pub at: Duration,
    pub kind: PlaybackEventKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Scheduled { session: SessionId, measure: u64 },
    Completed { looping: bool },
}

// ── Session ───────────────────────────────────────────────────────────────────

struct Session {
    id: SessionId,
    arrangement: Arrangement,
    tempo: Tempo,
    metronome: bool,
    measure: u64,
    pattern_index: usize,
    /// Ideal start of the current measure.
    start: Duration,
    handles: Vec<TimerId>,
}

type Payload = (SessionId, EventKind);

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct StrumEngine<B: SoundBackend = AudioOutput, C: Clock = MonotonicClock> {
    backend: B,
    clock: C,
    timers: TimerQueue<Payload>,
    session: Option<Session>,
    state: EngineState,
    looping: bool,
    pending_tempo: Option<Tempo>,
    next_session: u64,
    /// Events produced outside `poll` (stop), delivered by the next `poll`.
    outbox: Vec<PlaybackEvent>,
}

impl StrumEngine {
    /// Engine bound to a fresh default audio output.
    pub fn new() -> Self {
        Self::with_parts(AudioOutput::new(), MonotonicClock::new())
    }
}

impl Default for StrumEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: SoundBackend, C: Clock> StrumEngine<B, C> {
    pub fn with_parts(backend: B, clock: C) -> Self {
        Self {
            backend,
            clock,
            timers: TimerQueue::new(),
            session: None,
            state: EngineState::Idle,
            looping: true,
            pending_tempo: None,
            next_session: 0,
            outbox: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Current tempo of the running session, if any.
    pub fn tempo(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.tempo.bpm())
    }

    /// Number of timers still armed.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    // ── Sound ─────────────────────────────────────────────────────────────

    /// Applies from the next triggered stroke; ringing sounds are untouched.
    pub fn set_sound_mode(&mut self, mode: SoundMode) {
        if mode != self.backend.sound_mode() {
            info!("sound mode -> {}", mode.name());
        }
        self.backend.set_sound_mode(mode);
    }

    pub fn sound_mode(&self) -> SoundMode {
        self.backend.sound_mode()
    }

    /// Open the audio output.  Must succeed once before the first `play_*`.
    pub fn ensure_started(&mut self) -> Result<()> {
        if self.backend.is_started() {
            return Ok(());
        }
        self.backend.ensure_started()?;
        info!("audio output started");
        Ok(())
    }

    // ── Transport ─────────────────────────────────────────────────────────

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Play one pattern.  Any running session is stopped first.
    pub fn play_pattern(&mut self, pattern: &StrumPattern, bpm: f64, metronome: bool) -> Result<SessionId> {
        let tempo = Tempo::new(bpm)?;
        self.start_session(Arrangement::single(pattern.clone())?, tempo, metronome)
    }

    /// Play patterns back to back, one measure each.  With looping on the
    /// arrangement wraps to its first measure.
    pub fn play_arrangement(&mut self, arrangement: Arrangement, bpm: f64, metronome: bool) -> Result<SessionId> {
        let tempo = Tempo::new(bpm)?;
        self.start_session(arrangement, tempo, metronome)
    }

    /// Change tempo from the next measure boundary.  The running measure keeps
    /// its schedule.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        let tempo = Tempo::new(bpm)?;
        if self.session.is_some() {
            self.pending_tempo = Some(tempo);
        }
        Ok(())
    }

    /// Metronome on/off from the next measure boundary.
    pub fn set_metronome(&mut self, metronome: bool) {
        if let Some(session) = self.session.as_mut() {
            session.metronome = metronome;
        }
    }

    /// Cancel every armed timer of the running session.  No-op when idle.
    pub fn stop(&mut self) {
        self.pending_tempo = None;
        self.state = EngineState::Idle;
        let Some(session) = self.session.take() else { return };

        let cancelled = session.handles.iter().filter(|&&h| self.timers.cancel(h)).count();
        debug!("session {:?} stopped, {} timers cancelled", session.id, cancelled);
        self.outbox.push(PlaybackEvent {
            session: session.id,
            measure: session.measure,
            at: self.clock.now(),
            kind: PlaybackEventKind::Stopped,
        });
    }

    /// Earliest armed deadline on the engine clock.
    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// How long a driver may sleep before the next `poll` is needed.
    pub fn time_until_next(&mut self) -> Option<Duration> {
        let now = self.clock.now();
        self.next_deadline().map(|d| d.saturating_sub(now))
    }

    /// Fire every due timer in deadline order: trigger sound, return the
    /// events for UI consumers.
    pub fn poll(&mut self) -> Vec<PlaybackEvent> {
        let now = self.clock.now();
        let mut events = std::mem::take(&mut self.outbox);

        while let Some((at, (id, kind))) = self.timers.pop_due(now) {
            let Some(session) = self.session.as_ref() else { continue };
            if session.id != id {
                continue;
            }
            let measure = session.measure;
            let kind = match kind {
                EventKind::Click { beat, accent } => {
                    self.backend.trigger(Trigger::Click { accent });
                    PlaybackEventKind::Click { beat, accent }
                }
                EventKind::Stroke { index, stroke_type } => {
                    self.backend.trigger(Trigger::Stroke(stroke_type));
                    PlaybackEventKind::StrokeStarted {
                        pattern_index: session.pattern_index,
                        stroke_index: index,
                        stroke_type,
                    }
                }
                EventKind::MeasureEnd => {
                    let continues = self.complete_measure(at);
                    PlaybackEventKind::MeasureCompleted { continues }
                }
            };
            events.push(PlaybackEvent { session: id, measure, at, kind });
        }
        events
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn start_session(&mut self, arrangement: Arrangement, tempo: Tempo, metronome: bool) -> Result<SessionId> {
        if !self.backend.is_started() {
            warn!("play requested before ensure_started");
            return Err(StrumError::NotStarted);
        }
        // Restarting while playing is stop-then-start, never two sessions.
        self.stop();

        let id = SessionId(self.next_session);
        self.next_session += 1;
        self.session = Some(Session {
            id,
            arrangement,
            tempo,
            metronome,
            measure: 0,
            pattern_index: 0,
            start: self.clock.now(),
            handles: Vec::new(),
        });
        if let Err(e) = self.arm_measure() {
            self.session = None;
            self.state = EngineState::Idle;
            return Err(e);
        }
        debug!("session {:?} started at {} bpm", id, tempo.bpm());
        Ok(id)
    }

    /// Arm the current measure of the session at its ideal start.
    fn arm_measure(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else { return Ok(()) };
        let pattern = session
            .arrangement
            .get(session.pattern_index)
            .ok_or_else(|| StrumError::pattern("arrangement", "measure index out of range"))?;
        let timeline = Timeline::build(pattern, session.tempo, session.metronome)?;

        session.handles.clear();
        for event in &timeline.events {
            let handle = self.timers.arm(session.start + event.offset, (session.id, event.kind));
            session.handles.push(handle);
        }
        self.state = EngineState::Scheduled { session: session.id, measure: session.measure };
        Ok(())
    }

    /// Handle a measure-end timer that was due at `end`.  Returns whether
    /// another measure was armed.
    fn complete_measure(&mut self, end: Duration) -> bool {
        self.state = EngineState::Completed { looping: self.looping };
        let looping = self.looping;
        let pending_tempo = self.pending_tempo.take();

        let Some(session) = self.session.as_mut() else { return false };
        let next = session.pattern_index + 1;
        let next = if next < session.arrangement.len() {
            next
        } else if looping {
            0
        } else {
            debug!("session {:?} finished after {} measures", session.id, session.measure + 1);
            self.session = None;
            self.state = EngineState::Idle;
            return false;
        };

        session.pattern_index = next;
        session.measure += 1;
        session.start = end;
        if let Some(tempo) = pending_tempo {
            session.tempo = tempo;
        }
        match self.arm_measure() {
            Ok(()) => true,
            Err(e) => {
                warn!("could not arm next measure: {e}");
                self.session = None;
                self.state = EngineState::Idle;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingBackend;
    use crate::clock::ManualClock;
    use crate::pattern::Stroke;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn engine() -> (StrumEngine<RecordingBackend, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let mut engine = StrumEngine::with_parts(RecordingBackend::new(), clock.clone());
        engine.ensure_started().unwrap();
        (engine, clock)
    }

    fn two_beats() -> StrumPattern {
        StrumPattern::new("p", "P", 2).with_strokes([Stroke::down(0.0), Stroke::up(1.5)])
    }

    #[test]
    fn test_play_before_start_is_rejected() {
        let mut engine = StrumEngine::with_parts(RecordingBackend::new(), ManualClock::new());
        assert!(matches!(engine.play_pattern(&two_beats(), 120.0, false), Err(StrumError::NotStarted)));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_failed_start_surfaces_error() {
        let mut engine = StrumEngine::with_parts(RecordingBackend::failing(), ManualClock::new());
        assert!(engine.ensure_started().is_err());
        assert!(engine.play_pattern(&two_beats(), 120.0, false).is_err());
    }

    #[test]
    fn test_bad_tempo_arms_nothing() {
        let (mut engine, _) = engine();
        assert!(matches!(engine.play_pattern(&two_beats(), 0.0, false), Err(StrumError::InvalidTempo(_))));
        assert!(engine.play_pattern(&two_beats(), f64::NAN, true).is_err());
        // positive but too slow for a measure to fit a Duration
        assert!(matches!(engine.play_pattern(&two_beats(), 1e-20, false), Err(StrumError::InvalidTempo(_))));
        assert!(engine.set_tempo(1e-20).is_err());
        assert_eq!(engine.pending_timers(), 0);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_restart_replaces_session() {
        let (mut engine, clock) = engine();
        let first = engine.play_pattern(&two_beats(), 60.0, false).unwrap();
        clock.advance(ms(500));
        let second = engine.play_pattern(&two_beats(), 60.0, false).unwrap();
        assert_ne!(first, second);
        assert_eq!(engine.current_session(), Some(second));
        // two strokes + measure end, only from the second session
        assert_eq!(engine.pending_timers(), 3);

        let events = engine.poll();
        assert_eq!(events[0].kind, PlaybackEventKind::Stopped);
        assert_eq!(events[0].session, first);
        assert!(events[1..].iter().all(|e| e.session == second));
    }

    #[test]
    fn test_non_looping_session_ends_idle() {
        let (mut engine, clock) = engine();
        assert!(engine.is_looping());
        engine.set_loop(false);
        assert!(!engine.is_looping());
        engine.play_pattern(&two_beats(), 60.0, false).unwrap();
        clock.advance(ms(2_000));
        let events = engine.poll();
        assert_eq!(events.last().unwrap().kind, PlaybackEventKind::MeasureCompleted { continues: false });
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.pending_timers(), 0);
        assert_eq!(engine.current_session(), None);
    }

    #[test]
    fn test_tempo_change_applies_at_next_measure() {
        let (mut engine, clock) = engine();
        engine.play_pattern(&two_beats(), 60.0, false).unwrap();
        engine.set_tempo(120.0).unwrap();
        clock.advance(ms(1_600));
        let events = engine.poll();
        // second stroke still at the old tempo: 1.5 beats @ 60 bpm
        assert_eq!(events[1].at, ms(1_500));

        clock.set(ms(2_000 + 750));
        let events = engine.poll();
        let times: Vec<Duration> = events.iter().map(|e| e.at).collect();
        // measure end @2000, then the next measure at 120 bpm
        assert_eq!(times, vec![ms(2_000), ms(2_000), ms(2_750)]);
        assert_eq!(engine.tempo(), Some(120.0));
    }

    #[test]
    fn test_arrangement_walks_measures_then_wraps() {
        let (mut engine, clock) = engine();
        let a = StrumPattern::new("a", "A", 1).with_strokes([Stroke::down(0.0)]);
        let b = StrumPattern::new("b", "B", 1).with_strokes([Stroke::up(0.5)]);
        engine.play_arrangement(Arrangement::new(vec![a, b]).unwrap(), 60.0, false).unwrap();
        clock.set(ms(2_100));
        let slots: Vec<usize> = engine
            .poll()
            .iter()
            .filter_map(|e| match e.kind {
                PlaybackEventKind::StrokeStarted { pattern_index, .. } => Some(pattern_index),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0]);
    }

    #[test]
    fn test_sound_mode_switch_applies_to_next_trigger() {
        let (mut engine, clock) = engine();
        engine.set_sound_mode(SoundMode::Percussion);
        engine.play_pattern(&two_beats(), 60.0, false).unwrap();
        engine.poll();
        engine.set_sound_mode(SoundMode::Guitar);
        clock.set(ms(1_500));
        engine.poll();
        let modes: Vec<SoundMode> = engine.backend().triggers.iter().map(|(m, _)| *m).collect();
        assert_eq!(modes, vec![SoundMode::Percussion, SoundMode::Guitar]);
    }

    #[test]
    fn test_metronome_toggle_waits_for_boundary() {
        let (mut engine, clock) = engine();
        engine.play_pattern(&two_beats(), 60.0, false).unwrap();
        engine.set_metronome(true);
        clock.set(ms(1_900));
        engine.poll();
        assert_eq!(engine.backend().clicks(), 0);
        clock.set(ms(3_000));
        engine.poll();
        // beats 0 and 1 of the second measure
        assert_eq!(engine.backend().clicks(), 2);
    }

    #[test]
    fn test_empty_arrangement_rejected() {
        assert!(Arrangement::new(Vec::new()).is_err());
    }
}
