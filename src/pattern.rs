//! Rhythm pattern model: one measure of down/up strokes at fractional beats.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrumError};
use crate::schedule::Tempo;

/// Two stroke times closer than this (in beats) occupy the same grid cell.
pub const TIME_EPSILON: f64 = 1e-6;

// ── Stroke direction ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeType {
    Down,
    Up,
}

impl StrokeType {
    pub fn glyph(self) -> char {
        match self {
            Self::Down => 'D',
            Self::Up   => 'U',
        }
    }

    /// Relative loudness.  Downstrokes carry the pulse, upstrokes are lighter.
    pub fn accent(self) -> f32 {
        match self {
            Self::Down => 1.0,
            Self::Up   => 0.65,
        }
    }
}

// ── Stroke ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(rename = "type")]
    pub stroke_type: StrokeType,
    /// Beat offset from the start of the measure, `[0, beats_per_measure)`.
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Stroke {
    pub fn new(stroke_type: StrokeType, time: f64) -> Self {
        Self { stroke_type, time, label: None }
    }

    pub fn down(time: f64) -> Self { Self::new(StrokeType::Down, time) }
    pub fn up(time: f64) -> Self { Self::new(StrokeType::Up, time) }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The explicit label if present, otherwise the derived count.
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| count_label(self.time))
    }
}

// ── Grid resolution ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Eighth,
    Sixteenth,
}

impl Resolution {
    pub fn subdivisions(self) -> u32 {
        match self {
            Self::Eighth    => 2,
            Self::Sixteenth => 4,
        }
    }

    pub fn step(self) -> f64 {
        1.0 / self.subdivisions() as f64
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Eighth    => "8th",
            Self::Sixteenth => "16th",
        }
    }
}

fn is_multiple_of(time: f64, step: f64) -> bool {
    let q = time / step;
    (q - q.round()).abs() < TIME_EPSILON / step
}

/// Spoken count for a beat position: `"1"`, `"e"`, `"&"`, `"a"`.
/// Positions off the sixteenth grid get an empty label.
pub fn count_label(time: f64) -> String {
    if !time.is_finite() || time < 0.0 {
        return String::new();
    }
    let beat = time.floor();
    let frac = time - beat;
    let sub = (frac * 4.0).round();
    if (frac * 4.0 - sub).abs() > 1e-4 {
        return String::new();
    }
    match sub as u32 {
        0 => format!("{}", beat as u64 + 1),
        1 => "e".to_string(),
        2 => "&".to_string(),
        3 => "a".to_string(),
        // frac rounded up to the next beat
        _ => format!("{}", beat as u64 + 2),
    }
}

// ── Pattern ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrumPattern {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub beats_per_measure: u32,
    #[serde(default)]
    pub strokes: Vec<Stroke>,
}

impl StrumPattern {
    pub fn new(id: impl Into<String>, name: impl Into<String>, beats_per_measure: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            beats_per_measure,
            strokes: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_strokes(mut self, strokes: impl IntoIterator<Item = Stroke>) -> Self {
        self.strokes.extend(strokes);
        self
    }

    /// Check every scheduling precondition.  Zero strokes is legal (a silent
    /// measure, useful with the metronome on).
    pub fn validate(&self) -> Result<()> {
        if self.beats_per_measure == 0 {
            return Err(StrumError::pattern(&self.id, "beatsPerMeasure must be at least 1"));
        }
        let beats = self.beats_per_measure as f64;
        for stroke in &self.strokes {
            if !stroke.time.is_finite() {
                return Err(StrumError::pattern(&self.id, format!("stroke time {} is not finite", stroke.time)));
            }
            if stroke.time < 0.0 || stroke.time >= beats {
                return Err(StrumError::pattern(
                    &self.id,
                    format!("stroke time {} outside [0, {})", stroke.time, self.beats_per_measure),
                ));
            }
        }
        let sorted = self.sorted_strokes();
        for pair in sorted.windows(2) {
            if (pair[1].1.time - pair[0].1.time).abs() < TIME_EPSILON {
                return Err(StrumError::pattern(
                    &self.id,
                    format!("two strokes share time {}", pair[0].1.time),
                ));
            }
        }
        Ok(())
    }

    /// Strokes in time order, each paired with its index in `self.strokes`.
    pub fn sorted_strokes(&self) -> Vec<(usize, &Stroke)> {
        let mut sorted: Vec<(usize, &Stroke)> = self.strokes.iter().enumerate().collect();
        sorted.sort_by(|a, b| a.1.time.total_cmp(&b.1.time));
        sorted
    }

    /// Finest grid that holds every stroke.
    pub fn resolution(&self) -> Resolution {
        if self.strokes.iter().all(|s| is_multiple_of(s.time, 0.5)) {
            Resolution::Eighth
        } else {
            Resolution::Sixteenth
        }
    }

    pub fn measure_duration(&self, tempo: Tempo) -> Duration {
        tempo.beats(self.beats_per_measure as f64)
    }

    /// Index of the stroke sitting on `time`, if any.
    pub fn stroke_at(&self, time: f64) -> Option<usize> {
        self.strokes.iter().position(|s| (s.time - time).abs() < TIME_EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eighths() -> StrumPattern {
        StrumPattern::new("du", "Down Up", 4).with_strokes(
            (0..8).map(|i| if i % 2 == 0 { Stroke::down(i as f64 * 0.5) } else { Stroke::up(i as f64 * 0.5) }),
        )
    }

    #[test]
    fn test_valid_pattern_passes() {
        assert!(eighths().validate().is_ok());
        assert!(StrumPattern::new("empty", "Empty", 4).validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_time() {
        let p = StrumPattern::new("p", "P", 4).with_strokes([Stroke::down(4.0)]);
        assert!(matches!(p.validate(), Err(StrumError::InvalidPattern { .. })));
        let p = StrumPattern::new("p", "P", 4).with_strokes([Stroke::down(-0.5)]);
        assert!(p.validate().is_err());
        let p = StrumPattern::new("p", "P", 4).with_strokes([Stroke::down(f64::NAN)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_times() {
        let p = StrumPattern::new("p", "P", 4).with_strokes([Stroke::down(1.0), Stroke::up(1.0)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_beats() {
        assert!(StrumPattern::new("p", "P", 0).validate().is_err());
    }

    #[test]
    fn test_sorted_keeps_original_index() {
        let p = StrumPattern::new("p", "P", 4).with_strokes([Stroke::up(1.5), Stroke::down(0.0)]);
        let sorted = p.sorted_strokes();
        assert_eq!(sorted[0].0, 1);
        assert_eq!(sorted[1].0, 0);
    }

    #[test]
    fn test_resolution_inference() {
        assert_eq!(eighths().resolution(), Resolution::Eighth);
        let p = StrumPattern::new("p", "P", 4).with_strokes([Stroke::down(0.0), Stroke::up(0.25)]);
        assert_eq!(p.resolution(), Resolution::Sixteenth);
    }

    #[test]
    fn test_count_labels() {
        assert_eq!(count_label(0.0), "1");
        assert_eq!(count_label(0.25), "e");
        assert_eq!(count_label(2.5), "&");
        assert_eq!(count_label(3.75), "a");
        assert_eq!(Stroke::down(1.0).display_label(), "2");
        assert_eq!(Stroke::down(1.0).with_label("two").display_label(), "two");
    }

    #[test]
    fn test_serde_uses_site_field_names() {
        let json = r#"{"id":"x","name":"X","beatsPerMeasure":4,
                       "strokes":[{"type":"down","time":0},{"type":"up","time":0.5,"label":"&"}]}"#;
        let p: StrumPattern = serde_json::from_str(json).unwrap();
        assert_eq!(p.beats_per_measure, 4);
        assert_eq!(p.strokes[1].stroke_type, StrokeType::Up);
        assert_eq!(p.strokes[1].label.as_deref(), Some("&"));
    }
}
