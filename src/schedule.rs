//! Pure timeline math: pattern + tempo -> offsets from measure start.
//!
//! Nothing here touches a clock.  The engine arms timers from a [`Timeline`],
//! which keeps the arithmetic testable on its own.

use std::time::Duration;

use crate::error::{Result, StrumError};
use crate::pattern::{StrokeType, StrumPattern};

/// Lower tempo bound.  Slower tempos give measure lengths a `Duration`
/// cannot hold.
pub const MIN_BPM: f64 = 1.0;

/// Upper tempo bound.  Keeps every measure long enough for the engine's
/// catch-up loop to make progress.
pub const MAX_BPM: f64 = 1000.0;

/// A validated tempo in quarter-note beats per minute.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tempo(f64);

impl Tempo {
    pub fn new(bpm: f64) -> Result<Self> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(StrumError::InvalidTempo(bpm));
        }
        Ok(Self(bpm))
    }

    pub fn bpm(self) -> f64 {
        self.0
    }

    /// `60000 / bpm` milliseconds.
    pub fn beat_duration(self) -> Duration {
        self.beats(1.0)
    }

    /// Wall-clock length of `beats` beats.
    pub fn beats(self, beats: f64) -> Duration {
        Duration::from_secs_f64(60.0 * beats / self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventKind {
    /// Metronome pulse on an integer beat.
    Click { beat: u32, accent: bool },
    /// `index` is the stroke's position in `StrumPattern::strokes`.
    Stroke { index: usize, stroke_type: StrokeType },
    MeasureEnd,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub offset: Duration,
    pub kind: EventKind,
}

/// One measure of events, sorted by offset.
#[derive(Clone, Debug)]
pub struct Timeline {
    pub events: Vec<ScheduledEvent>,
    pub measure: Duration,
}

impl Timeline {
    /// Validate `pattern` and lay out its measure at `tempo`.
    ///
    /// Coinciding clicks and strokes are both kept; the click comes first.
    /// `MeasureEnd` is always the final event.
    pub fn build(pattern: &StrumPattern, tempo: Tempo, metronome: bool) -> Result<Self> {
        pattern.validate()?;

        let measure = pattern.measure_duration(tempo);
        let mut events = Vec::with_capacity(pattern.strokes.len() + pattern.beats_per_measure as usize + 1);

        if metronome {
            for beat in 0..pattern.beats_per_measure {
                events.push(ScheduledEvent {
                    offset: tempo.beats(beat as f64),
                    kind: EventKind::Click { beat, accent: beat == 0 },
                });
            }
        }
        for (index, stroke) in pattern.sorted_strokes() {
            events.push(ScheduledEvent {
                offset: tempo.beats(stroke.time),
                kind: EventKind::Stroke { index, stroke_type: stroke.stroke_type },
            });
        }
        // Stable sort keeps clicks ahead of strokes at equal offsets.
        events.sort_by_key(|e| e.offset);
        events.push(ScheduledEvent { offset: measure, kind: EventKind::MeasureEnd });

        Ok(Self { events, measure })
    }

    pub fn strokes(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.events.iter().filter(|e| matches!(e.kind, EventKind::Stroke { .. }))
    }

    pub fn clicks(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.events.iter().filter(|e| matches!(e.kind, EventKind::Click { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Stroke;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_tempo_rejects_bad_bpm() {
        for bpm in [0.0, -60.0, f64::NAN, f64::INFINITY, 5_000.0, 1e-20, 0.5] {
            assert!(matches!(Tempo::new(bpm), Err(StrumError::InvalidTempo(_))), "{bpm} accepted");
        }
        assert_eq!(Tempo::new(120.0).unwrap().beat_duration(), ms(500));
    }

    #[test]
    fn test_slowest_tempo_still_schedules() {
        let p = StrumPattern::new("p", "P", 12).with_strokes([Stroke::down(11.5)]);
        let t = Timeline::build(&p, Tempo::new(MIN_BPM).unwrap(), true).unwrap();
        assert_eq!(t.measure, Duration::from_secs(12 * 60));
        assert_eq!(t.strokes().next().unwrap().offset, Duration::from_secs(690));
    }

    #[test]
    fn test_stroke_offsets_at_120() {
        let p = StrumPattern::new("p", "P", 4)
            .with_strokes([Stroke::down(0.0), Stroke::up(0.5), Stroke::down(1.0), Stroke::up(1.5)]);
        let t = Timeline::build(&p, Tempo::new(120.0).unwrap(), false).unwrap();
        let offsets: Vec<Duration> = t.strokes().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![ms(0), ms(250), ms(500), ms(750)]);
        assert_eq!(t.measure, ms(2000));
        assert_eq!(t.events.last().unwrap().kind, EventKind::MeasureEnd);
    }

    #[test]
    fn test_unsorted_strokes_are_scheduled_in_time_order() {
        let p = StrumPattern::new("p", "P", 2).with_strokes([Stroke::up(1.5), Stroke::down(0.0)]);
        let t = Timeline::build(&p, Tempo::new(60.0).unwrap(), false).unwrap();
        let kinds: Vec<EventKind> = t.strokes().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![
            EventKind::Stroke { index: 1, stroke_type: StrokeType::Down },
            EventKind::Stroke { index: 0, stroke_type: StrokeType::Up },
        ]);
    }

    #[test]
    fn test_metronome_clicks_every_beat_and_precede_strokes() {
        let p = StrumPattern::new("p", "P", 3).with_strokes([Stroke::down(0.0)]);
        let t = Timeline::build(&p, Tempo::new(60.0).unwrap(), true).unwrap();
        let clicks: Vec<Duration> = t.clicks().map(|e| e.offset).collect();
        assert_eq!(clicks, vec![ms(0), ms(1000), ms(2000)]);
        assert_eq!(t.events[0].kind, EventKind::Click { beat: 0, accent: true });
        assert!(matches!(t.events[1].kind, EventKind::Stroke { .. }));
    }

    #[test]
    fn test_invalid_pattern_is_rejected_before_scheduling() {
        let p = StrumPattern::new("p", "P", 4).with_strokes([Stroke::down(5.0)]);
        assert!(Timeline::build(&p, Tempo::new(100.0).unwrap(), false).is_err());
    }
}
