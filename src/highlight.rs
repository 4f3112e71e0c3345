//! UI-side synchronisation: which stroke is lit right now, and where it sits
//! on a given grid layout.
//!
//! The tracker only consumes [`PlaybackEvent`]s; it never talks to the engine.
//! Several views can render the same pattern with different layouts, each with
//! its own tracker.

use std::time::Duration;

use crate::engine::{PlaybackEvent, PlaybackEventKind, SessionId};
use crate::pattern::{count_label, StrumPattern, TIME_EPSILON};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    /// Between a completed measure and the first event of the next one.
    Looping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveStroke {
    pub measure: u64,
    pub pattern_index: usize,
    pub stroke_index: usize,
}

// ── Tracker ───────────────────────────────────────────────────────────────────

/// Follows one session's events and keeps "active stroke or none".
///
/// Every measure completion clears the highlight, and `visible_stroke` keeps
/// it dark for `downbeat_gap` after the measure boundary so each repetition
/// shows a short off-beat before its downbeat lights up.
#[derive(Clone, Debug)]
pub struct HighlightTracker {
    session: Option<SessionId>,
    state: PlayerState,
    active: Option<ActiveStroke>,
    measure: u64,
    pulse: Option<u32>,
    downbeat_gap: Duration,
    gap_until: Option<Duration>,
}

impl HighlightTracker {
    pub fn new(downbeat_gap: Duration) -> Self {
        Self {
            session: None,
            state: PlayerState::Idle,
            active: None,
            measure: 0,
            pulse: None,
            downbeat_gap,
            gap_until: None,
        }
    }

    /// Follow `session` from its first measure.
    pub fn begin(&mut self, session: SessionId) {
        self.stop();
        self.session = Some(session);
        self.state = PlayerState::Playing;
    }

    /// Force `Idle` from any state.
    pub fn stop(&mut self) {
        self.session = None;
        self.state = PlayerState::Idle;
        self.active = None;
        self.measure = 0;
        self.pulse = None;
        self.gap_until = None;
    }

    /// Feed one engine event.  Events of other sessions are ignored.
    /// Returns true if the visible state changed.
    pub fn apply(&mut self, event: &PlaybackEvent) -> bool {
        if self.session != Some(event.session) {
            return false;
        }
        if self.state == PlayerState::Looping && event.measure >= self.measure {
            self.state = PlayerState::Playing;
        }
        match event.kind {
            PlaybackEventKind::StrokeStarted { pattern_index, stroke_index, .. } => {
                self.active = Some(ActiveStroke { measure: event.measure, pattern_index, stroke_index });
                self.measure = event.measure;
            }
            PlaybackEventKind::Click { beat, .. } => {
                self.pulse = Some(beat);
                self.measure = event.measure;
            }
            PlaybackEventKind::MeasureCompleted { continues } => {
                self.active = None;
                self.pulse = None;
                self.gap_until = Some(event.at + self.downbeat_gap);
                if continues {
                    self.measure = event.measure + 1;
                    self.state = PlayerState::Looping;
                } else {
                    self.state = PlayerState::Idle;
                    self.session = None;
                }
            }
            PlaybackEventKind::Stopped => self.stop(),
        }
        true
    }

    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a PlaybackEvent>) -> bool {
        events.into_iter().fold(false, |changed, e| self.apply(e) | changed)
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn is_active(&self) -> bool {
        self.state != PlayerState::Idle
    }

    /// Measure currently (or next) playing.
    pub fn measure(&self) -> u64 {
        self.measure
    }

    /// Last metronome beat heard in this measure.
    pub fn pulse(&self) -> Option<u32> {
        self.pulse
    }

    /// The stroke most recently started, in lockstep with audio.
    pub fn active_stroke(&self) -> Option<ActiveStroke> {
        self.active
    }

    /// What to draw at `now` (engine clock).
    pub fn visible_stroke(&self, now: Duration) -> Option<ActiveStroke> {
        match self.gap_until {
            Some(until) if now < until => None,
            _ => self.active,
        }
    }
}

// ── Layouts ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridCell {
    pub cell: Cell,
    pub time: f64,
    pub label: String,
}

/// Maps a stroke's beat position to a drawn cell.  The beat position is the
/// identity key: no two strokes of a pattern share one.
pub trait GridLayout {
    fn rows(&self) -> usize;
    fn cells(&self) -> Vec<GridCell>;
    fn cell_for(&self, time: f64) -> Option<Cell>;
}

/// Index of `time` on a grid with `subdivisions` per beat, if it sits on one.
pub fn grid_index(time: f64, subdivisions: u32) -> Option<usize> {
    let scaled = time * subdivisions as f64;
    let idx = scaled.round();
    if idx < 0.0 || (scaled - idx).abs() > TIME_EPSILON * subdivisions as f64 {
        return None;
    }
    Some(idx as usize)
}

/// One row, two cells per beat: `1 & 2 & 3 & 4 &`.
#[derive(Clone, Copy, Debug)]
pub struct EighthGrid {
    pub beats: u32,
}

impl GridLayout for EighthGrid {
    fn rows(&self) -> usize {
        1
    }

    fn cells(&self) -> Vec<GridCell> {
        (0..self.beats as usize * 2)
            .map(|i| {
                let time = i as f64 * 0.5;
                GridCell { cell: Cell { row: 0, col: i }, time, label: count_label(time) }
            })
            .collect()
    }

    fn cell_for(&self, time: f64) -> Option<Cell> {
        let idx = grid_index(time, 2)?;
        (idx < self.beats as usize * 2).then_some(Cell { row: 0, col: idx })
    }
}

/// Sixteenths folded onto two rows (the narrow-screen layout): the first half
/// of the measure on top, the second half below.
#[derive(Clone, Copy, Debug)]
pub struct SixteenthGrid {
    pub beats: u32,
}

impl SixteenthGrid {
    fn per_row(&self) -> usize {
        (self.beats as usize * 4).div_ceil(2)
    }
}

impl GridLayout for SixteenthGrid {
    fn rows(&self) -> usize {
        2
    }

    fn cells(&self) -> Vec<GridCell> {
        let per_row = self.per_row().max(1);
        (0..self.beats as usize * 4)
            .map(|i| {
                let time = i as f64 * 0.25;
                GridCell { cell: Cell { row: i / per_row, col: i % per_row }, time, label: count_label(time) }
            })
            .collect()
    }

    fn cell_for(&self, time: f64) -> Option<Cell> {
        let idx = grid_index(time, 4)?;
        if idx >= self.beats as usize * 4 {
            return None;
        }
        let per_row = self.per_row().max(1);
        Some(Cell { row: idx / per_row, col: idx % per_row })
    }
}

/// Layout suited to `pattern`'s resolution.
pub fn layout_for(pattern: &StrumPattern) -> Box<dyn GridLayout> {
    match pattern.resolution() {
        crate::pattern::Resolution::Eighth    => Box::new(EighthGrid { beats: pattern.beats_per_measure }),
        crate::pattern::Resolution::Sixteenth => Box::new(SixteenthGrid { beats: pattern.beats_per_measure }),
    }
}

/// Cell to light for `active` when drawing `pattern` with `layout`.
pub fn highlighted_cell(layout: &dyn GridLayout, pattern: &StrumPattern, active: Option<ActiveStroke>) -> Option<Cell> {
    let stroke = pattern.strokes.get(active?.stroke_index)?;
    layout.cell_for(stroke.time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingBackend;
    use crate::clock::ManualClock;
    use crate::engine::StrumEngine;
    use crate::pattern::Stroke;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn pattern() -> StrumPattern {
        StrumPattern::new("p", "P", 1).with_strokes([Stroke::down(0.0), Stroke::up(0.5)])
    }

    #[test]
    fn test_tracks_strokes_and_resets_each_measure() {
        let clock = ManualClock::new();
        let mut engine = StrumEngine::with_parts(RecordingBackend::new(), clock.clone());
        engine.ensure_started().unwrap();
        let mut tracker = HighlightTracker::new(ms(40));

        let id = engine.play_pattern(&pattern(), 60.0, false).unwrap();
        tracker.begin(id);
        tracker.apply_all(&engine.poll());
        assert_eq!(tracker.active_stroke().map(|a| a.stroke_index), Some(0));

        clock.set(ms(500));
        tracker.apply_all(&engine.poll());
        assert_eq!(tracker.active_stroke().map(|a| a.stroke_index), Some(1));

        // measure end at 1000 and the next downbeat at 1000
        clock.set(ms(1_000));
        tracker.apply_all(&engine.poll());
        assert_eq!(tracker.state(), PlayerState::Playing);
        assert_eq!(tracker.measure(), 1);
        assert_eq!(tracker.active_stroke().map(|a| a.stroke_index), Some(0));
        assert_eq!(tracker.visible_stroke(ms(1_010)), None);
        assert!(tracker.visible_stroke(ms(1_040)).is_some());

        engine.stop();
        tracker.apply_all(&engine.poll());
        assert_eq!(tracker.state(), PlayerState::Idle);
        assert_eq!(tracker.active_stroke(), None);
    }

    #[test]
    fn test_looping_state_between_measures() {
        let mut tracker = HighlightTracker::new(Duration::ZERO);
        let clock = ManualClock::new();
        let mut engine = StrumEngine::with_parts(RecordingBackend::new(), clock.clone());
        engine.ensure_started().unwrap();
        // strokes only on beat 2, so the boundary is followed by silence
        let p = StrumPattern::new("p", "P", 2).with_strokes([Stroke::down(1.0)]);
        tracker.begin(engine.play_pattern(&p, 60.0, false).unwrap());
        clock.set(ms(2_000));
        tracker.apply_all(&engine.poll());
        assert_eq!(tracker.state(), PlayerState::Looping);
        assert_eq!(tracker.active_stroke(), None);
        clock.set(ms(3_000));
        tracker.apply_all(&engine.poll());
        assert_eq!(tracker.state(), PlayerState::Playing);
    }

    #[test]
    fn test_ignores_other_sessions() {
        let clock = ManualClock::new();
        let mut engine = StrumEngine::with_parts(RecordingBackend::new(), clock.clone());
        engine.ensure_started().unwrap();
        let mut tracker = HighlightTracker::new(Duration::ZERO);
        let old = engine.play_pattern(&pattern(), 60.0, false).unwrap();
        tracker.begin(old);
        let new = engine.play_pattern(&pattern(), 60.0, false).unwrap();
        let events = engine.poll();
        assert!(events.iter().any(|e| e.session == new));
        // the old session's Stopped event still reaches this tracker
        tracker.apply_all(&events);
        assert_eq!(tracker.state(), PlayerState::Idle);
        assert_eq!(tracker.active_stroke(), None);
    }

    #[test]
    fn test_eighth_grid_cells() {
        let grid = EighthGrid { beats: 4 };
        assert_eq!(grid.cells().len(), 8);
        assert_eq!(grid.cell_for(1.5), Some(Cell { row: 0, col: 3 }));
        assert_eq!(grid.cell_for(0.25), None);
        assert_eq!(grid.cell_for(4.0), None);
        assert_eq!(grid.cells()[3].label, "&");
    }

    #[test]
    fn test_sixteenth_grid_folds_onto_two_rows() {
        let grid = SixteenthGrid { beats: 4 };
        assert_eq!(grid.cells().len(), 16);
        assert_eq!(grid.cell_for(0.25), Some(Cell { row: 0, col: 1 }));
        assert_eq!(grid.cell_for(2.0), Some(Cell { row: 1, col: 0 }));
        assert_eq!(grid.cell_for(3.75), Some(Cell { row: 1, col: 7 }));
    }

    #[test]
    fn test_highlighted_cell_uses_stroke_time() {
        let p = StrumPattern::new("p", "P", 4).with_strokes([Stroke::up(2.5), Stroke::down(0.0)]);
        let layout = layout_for(&p);
        let active = ActiveStroke { measure: 0, pattern_index: 0, stroke_index: 0 };
        assert_eq!(highlighted_cell(layout.as_ref(), &p, Some(active)), Some(Cell { row: 0, col: 5 }));
        assert_eq!(highlighted_cell(layout.as_ref(), &p, None), None);
    }
}
