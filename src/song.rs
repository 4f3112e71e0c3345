//! Multi-section songs: verse/chorus style sequences of patterns, flattened
//! into an [`Arrangement`] for the engine and into a timeline for display.

use serde::{Deserialize, Serialize};

use crate::engine::Arrangement;
use crate::error::{Result, StrumError};
use crate::highlight::{grid_index, ActiveStroke};
use crate::pattern::{count_label, StrokeType, StrumPattern};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongSection {
    pub name: String,
    pub pattern: StrumPattern,
    /// How many times the pattern repeats in this section.
    pub measures: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongStructure {
    pub title: String,
    pub sections: Vec<SongSection>,
}

impl SongSection {
    pub fn new(name: impl Into<String>, pattern: StrumPattern, measures: u32) -> Self {
        Self { name: name.into(), pattern, measures }
    }
}

impl SongStructure {
    pub fn new(title: impl Into<String>, sections: Vec<SongSection>) -> Self {
        Self { title: title.into(), sections }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sections.is_empty() {
            return Err(StrumError::pattern(&self.title, "song has no sections"));
        }
        for section in &self.sections {
            if section.measures == 0 {
                return Err(StrumError::pattern(
                    &section.pattern.id,
                    format!("section '{}' has zero measures", section.name),
                ));
            }
            section.pattern.validate()?;
        }
        Ok(())
    }

    pub fn total_measures(&self) -> u64 {
        self.sections.iter().map(|s| s.measures as u64).sum()
    }

    /// One arrangement slot per measure, in song order.
    pub fn to_arrangement(&self) -> Result<Arrangement> {
        self.validate()?;
        let measures = self
            .sections
            .iter()
            .flat_map(|s| std::iter::repeat(&s.pattern).take(s.measures as usize))
            .cloned()
            .collect();
        Arrangement::new(measures)
    }

    /// `(section index, measure within section)` for a song measure.
    pub fn section_at(&self, measure: u64) -> Option<(usize, u32)> {
        let mut first = 0u64;
        for (i, section) in self.sections.iter().enumerate() {
            let end = first + section.measures as u64;
            if measure < end {
                return Some((i, (measure - first) as u32));
            }
            first = end;
        }
        None
    }
}

// ── Timeline ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct TimelineCell {
    /// Song measure (arrangement slot).
    pub measure: usize,
    pub section: usize,
    pub time: f64,
    pub label: String,
    pub stroke: Option<StrokeType>,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    first_cell: usize,
    subdivisions: u32,
    cells: usize,
}

/// Every grid position of every measure laid end to end, so a whole song can
/// be drawn as one strip and highlighted measure by measure.
#[derive(Clone, Debug)]
pub struct SongTimeline {
    cells: Vec<TimelineCell>,
    slots: Vec<Slot>,
}

impl SongTimeline {
    pub fn new(song: &SongStructure) -> Self {
        let mut cells = Vec::new();
        let mut slots = Vec::new();
        for (section_index, section) in song.sections.iter().enumerate() {
            let pattern = &section.pattern;
            let subdivisions = pattern.resolution().subdivisions();
            let count = (pattern.beats_per_measure * subdivisions) as usize;
            for _ in 0..section.measures {
                let measure = slots.len();
                slots.push(Slot { first_cell: cells.len(), subdivisions, cells: count });
                for i in 0..count {
                    let time = i as f64 / subdivisions as f64;
                    cells.push(TimelineCell {
                        measure,
                        section: section_index,
                        time,
                        label: count_label(time),
                        stroke: pattern.stroke_at(time).map(|s| pattern.strokes[s].stroke_type),
                    });
                }
            }
        }
        Self { cells, slots }
    }

    pub fn cells(&self) -> &[TimelineCell] {
        &self.cells
    }

    pub fn measures(&self) -> usize {
        self.slots.len()
    }

    /// Cell index for a stroke at `time` in song measure `measure`.  Measures
    /// past the end wrap, matching a looping arrangement.
    pub fn cell_for(&self, measure: usize, time: f64) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        let slot = self.slots[measure % self.slots.len()];
        let idx = grid_index(time, slot.subdivisions)?;
        (idx < slot.cells).then_some(slot.first_cell + idx)
    }

    /// Cell to light for an active stroke of a session playing this song's
    /// arrangement.
    pub fn highlighted(&self, song: &SongStructure, active: Option<ActiveStroke>) -> Option<usize> {
        let active = active?;
        let (section, _) = song.section_at(active.pattern_index as u64)?;
        let stroke = song.sections[section].pattern.strokes.get(active.stroke_index)?;
        self.cell_for(active.pattern_index, stroke.time)
    }

    /// Cells belonging to one measure.
    pub fn measure_cells(&self, measure: usize) -> &[TimelineCell] {
        match self.slots.get(measure) {
            Some(slot) => &self.cells[slot.first_cell..slot.first_cell + slot.cells],
            None => &[],
        }
    }
}
