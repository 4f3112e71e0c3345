//! Pattern authoring grid.
//!
//! A strum's direction follows the hand: the hand moves down on every
//! on-beat subdivision and up on every off-beat one, whether or not the
//! strings are hit.  The grid therefore never stores a direction; it stores
//! which cells are struck and derives the direction from the position.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::Result;
use crate::highlight::grid_index;
use crate::pattern::{count_label, Resolution, Stroke, StrokeType, StrumPattern};

/// Direction for subdivision `subdivision` (counted from the start of the
/// measure) on a `resolution` grid.
///
/// Eighths alternate `D U`, sixteenths `D U D U` within each beat.
pub fn stroke_type_at(resolution: Resolution, subdivision: usize) -> StrokeType {
    let within_beat = subdivision % resolution.subdivisions() as usize;
    if within_beat % 2 == 0 {
        StrokeType::Down
    } else {
        StrokeType::Up
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PatternGrid {
    resolution: Resolution,
    beats: u32,
    active: Vec<bool>,
}

impl PatternGrid {
    pub fn new(resolution: Resolution, beats: u32) -> Self {
        let beats = beats.max(1);
        Self { resolution, beats, active: vec![false; (beats * resolution.subdivisions()) as usize] }
    }

    /// Grid holding `pattern`'s strokes.  Stored directions are ignored and
    /// re-derived from position.
    pub fn from_pattern(pattern: &StrumPattern) -> Self {
        let mut grid = Self::new(pattern.resolution(), pattern.beats_per_measure);
        for stroke in &pattern.strokes {
            match grid.cell_at_time(stroke.time) {
                Some(cell) => grid.active[cell] = true,
                None => debug!("'{}': stroke at {} is off the grid, dropped", pattern.id, stroke.time),
            }
        }
        grid
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn beats(&self) -> u32 {
        self.beats
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_active(&self, cell: usize) -> bool {
        self.active.get(cell).copied().unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&on| on).count()
    }

    /// Flip a cell.  Returns the stroke now sitting there, if any.
    pub fn toggle(&mut self, cell: usize) -> Option<StrokeType> {
        let on = !self.is_active(cell);
        self.set(cell, on);
        (on && cell < self.len()).then(|| self.stroke_type(cell))
    }

    /// Out-of-range cells are ignored.
    pub fn set(&mut self, cell: usize, on: bool) {
        if let Some(slot) = self.active.get_mut(cell) {
            *slot = on;
        }
    }

    pub fn clear(&mut self) {
        self.active.iter_mut().for_each(|c| *c = false);
    }

    pub fn stroke_type(&self, cell: usize) -> StrokeType {
        stroke_type_at(self.resolution, cell)
    }

    pub fn time_of(&self, cell: usize) -> f64 {
        cell as f64 * self.resolution.step()
    }

    pub fn cell_at_time(&self, time: f64) -> Option<usize> {
        let idx = grid_index(time, self.resolution.subdivisions())?;
        (idx < self.len()).then_some(idx)
    }

    /// Switch resolution, keeping every struck cell that exists on the new
    /// grid.  Returns how many were dropped.
    pub fn set_resolution(&mut self, resolution: Resolution) -> usize {
        if resolution == self.resolution {
            return 0;
        }
        let times: Vec<f64> = self.struck_times().collect();
        *self = Self::new(resolution, self.beats);
        let mut dropped = 0;
        for time in times {
            match self.cell_at_time(time) {
                Some(cell) => self.active[cell] = true,
                None => dropped += 1,
            }
        }
        dropped
    }

    /// Change measure length, dropping strokes past the new end.
    pub fn set_beats(&mut self, beats: u32) {
        let times: Vec<f64> = self.struck_times().collect();
        *self = Self::new(self.resolution, beats);
        for time in times {
            if let Some(cell) = self.cell_at_time(time) {
                self.active[cell] = true;
            }
        }
    }

    fn struck_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.active.iter().enumerate().filter(|&(_, &on)| on).map(|(i, _)| self.time_of(i))
    }

    pub fn to_pattern(&self, id: impl Into<String>, name: impl Into<String>) -> StrumPattern {
        let strokes = self
            .active
            .iter()
            .enumerate()
            .filter(|&(_, &on)| on)
            .map(|(i, _)| Stroke::new(self.stroke_type(i), self.time_of(i)));
        StrumPattern::new(id, name, self.beats)
            .with_description(format!("{} beats, {} grid", self.beats, self.resolution.name()))
            .with_strokes(strokes)
    }

    // ── Raster export ─────────────────────────────────────────────────────

    /// Draw the grid: count labels on top, one box per cell below.  Struck
    /// cells are filled and carry a D/U glyph; ghost cells are outlined.
    pub fn render_raster(&self) -> Raster {
        let width = MARGIN * 2 + self.len() * (CELL_W + GAP) - GAP;
        let height = BOX_Y + CELL_H + MARGIN;
        let mut raster = Raster::new(width, height, BACKGROUND);

        for cell in 0..self.len() {
            let x = MARGIN + cell * (CELL_W + GAP);
            let label = count_label(self.time_of(cell));
            let on_beat = cell % self.resolution.subdivisions() as usize == 0;
            let label_w = (label.len() * GLYPH_ADVANCE).saturating_sub(SCALE);
            raster.draw_text(
                &label,
                x + CELL_W.saturating_sub(label_w) / 2,
                MARGIN,
                if on_beat { BEAT_LABEL } else { SUB_LABEL },
            );

            if self.is_active(cell) {
                let stroke = self.stroke_type(cell);
                let fill = match stroke {
                    StrokeType::Down => DOWN_FILL,
                    StrokeType::Up => UP_FILL,
                };
                raster.fill_rect(x, BOX_Y, CELL_W, CELL_H, fill);
                raster.draw_glyph(
                    stroke.glyph(),
                    x + (CELL_W - 5 * SCALE) / 2,
                    BOX_Y + (CELL_H - 7 * SCALE) / 2,
                    GLYPH,
                );
            } else {
                raster.outline_rect(x, BOX_Y, CELL_W, CELL_H, GHOST_OUTLINE);
            }
        }
        raster
    }

    /// Write the rendered grid as a binary PPM.
    pub fn export_ppm(&self, path: impl AsRef<Path>) -> Result<()> {
        let raster = self.render_raster();
        fs::write(path.as_ref(), raster.to_ppm())?;
        info!("exported {}x{} grid to {}", raster.width, raster.height, path.as_ref().display());
        Ok(())
    }
}

// ── Raster ────────────────────────────────────────────────────────────────────

type Rgb = [u8; 3];

const BACKGROUND: Rgb    = [24, 24, 28];
const BEAT_LABEL: Rgb    = [240, 200, 80];
const SUB_LABEL: Rgb     = [150, 150, 160];
const DOWN_FILL: Rgb     = [70, 130, 220];
const UP_FILL: Rgb       = [230, 140, 60];
const GHOST_OUTLINE: Rgb = [90, 90, 100];
const GLYPH: Rgb         = [255, 255, 255];

const SCALE: usize         = 2;
const GLYPH_ADVANCE: usize = 6 * SCALE;
const MARGIN: usize        = 8;
const CELL_W: usize        = 24;
const CELL_H: usize        = 28;
const GAP: usize           = 4;
const BOX_Y: usize         = MARGIN + 7 * SCALE + 6;

/// 5×7 bitmaps, one byte per row, bit 4 is the leftmost column.
fn glyph_rows(ch: char) -> [u8; 7] {
    match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        '&' => [0x0C, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0D],
        'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        _ => [0; 7],
    }
}

/// An RGB image in row-major order.
#[derive(Clone, Debug)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pixels: Vec<Rgb>,
}

impl Raster {
    fn new(width: usize, height: usize, fill: Rgb) -> Self {
        Self { width, height, pixels: vec![fill; width * height] }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }

    fn put(&mut self, x: usize, y: usize, color: Rgb) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: Rgb) {
        for yy in y..y + h {
            for xx in x..x + w {
                self.put(xx, yy, color);
            }
        }
    }

    fn outline_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: Rgb) {
        for xx in x..x + w {
            self.put(xx, y, color);
            self.put(xx, y + h - 1, color);
        }
        for yy in y..y + h {
            self.put(x, yy, color);
            self.put(x + w - 1, yy, color);
        }
    }

    fn draw_glyph(&mut self, ch: char, x: usize, y: usize, color: Rgb) {
        for (row, bits) in glyph_rows(ch).iter().enumerate() {
            for col in 0..5 {
                if bits & (0x10 >> col) != 0 {
                    self.fill_rect(x + col * SCALE, y + row * SCALE, SCALE, SCALE, color);
                }
            }
        }
    }

    fn draw_text(&mut self, text: &str, x: usize, y: usize, color: Rgb) {
        for (i, ch) in text.chars().enumerate() {
            self.draw_glyph(ch, x + i * GLYPH_ADVANCE, y, color);
        }
    }

    /// Binary `P6` encoding.
    pub fn to_ppm(&self) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.reserve(self.pixels.len() * 3);
        for px in &self.pixels {
            out.extend_from_slice(px);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eighth_directions_follow_position() {
        let mut grid = PatternGrid::new(Resolution::Eighth, 4);
        let and_of_two = grid.cell_at_time(1.5).unwrap();
        let three = grid.cell_at_time(2.0).unwrap();
        assert_eq!(grid.toggle(and_of_two), Some(StrokeType::Up));
        assert_eq!(grid.toggle(three), Some(StrokeType::Down));
        // toggling off and on again never changes the direction
        assert_eq!(grid.toggle(and_of_two), None);
        assert_eq!(grid.toggle(and_of_two), Some(StrokeType::Up));
    }

    #[test]
    fn test_sixteenth_directions() {
        let types: Vec<StrokeType> = (0..8).map(|i| stroke_type_at(Resolution::Sixteenth, i)).collect();
        use StrokeType::{Down as D, Up as U};
        assert_eq!(types, vec![D, U, D, U, D, U, D, U]);
        assert_eq!(stroke_type_at(Resolution::Eighth, 3), U);
    }

    #[test]
    fn test_to_pattern_builds_valid_strokes() {
        let mut grid = PatternGrid::new(Resolution::Eighth, 4);
        for cell in [0, 2, 3, 5, 6, 7] {
            grid.set(cell, true);
        }
        let p = grid.to_pattern("folk", "Folk");
        assert!(p.validate().is_ok());
        let summary: String = p.strokes.iter().map(|s| s.stroke_type.glyph()).collect();
        assert_eq!(summary, "DDUUDU");
        assert_eq!(p.strokes[2].time, 1.5);
    }

    #[test]
    fn test_from_pattern_rederives_directions() {
        let p = StrumPattern::new("odd", "Odd", 2).with_strokes([Stroke::up(0.0), Stroke::down(0.5)]);
        let grid = PatternGrid::from_pattern(&p);
        let back = grid.to_pattern("odd", "Odd");
        assert_eq!(back.strokes[0].stroke_type, StrokeType::Down);
        assert_eq!(back.strokes[1].stroke_type, StrokeType::Up);
    }

    #[test]
    fn test_resolution_change_keeps_shared_cells() {
        let mut grid = PatternGrid::new(Resolution::Sixteenth, 2);
        grid.set(0, true); // 0.0
        grid.set(1, true); // 0.25
        grid.set(6, true); // 1.5
        assert_eq!(grid.set_resolution(Resolution::Eighth), 1);
        assert_eq!(grid.len(), 4);
        assert!(grid.is_active(0));
        assert!(grid.is_active(3));
        assert_eq!(grid.active_count(), 2);

        assert_eq!(grid.set_resolution(Resolution::Sixteenth), 0);
        assert!(grid.is_active(6));
    }

    #[test]
    fn test_set_beats_drops_overflow() {
        let mut grid = PatternGrid::new(Resolution::Eighth, 4);
        grid.set(7, true);
        grid.set(1, true);
        grid.set_beats(3);
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.active_count(), 1);
    }

    #[test]
    fn test_raster_fills_struck_cells_and_outlines_ghosts() {
        let mut grid = PatternGrid::new(Resolution::Eighth, 1);
        grid.set(0, true);
        let raster = grid.render_raster();
        assert_eq!(raster.width, MARGIN * 2 + 2 * CELL_W + GAP);
        assert_eq!(raster.height, BOX_Y + CELL_H + MARGIN);

        let struck_x = MARGIN;
        let ghost_x = MARGIN + CELL_W + GAP;
        assert_eq!(raster.pixel(struck_x + 1, BOX_Y + 1), Some(DOWN_FILL));
        assert_eq!(raster.pixel(ghost_x, BOX_Y + 1), Some(GHOST_OUTLINE));
        assert_eq!(raster.pixel(ghost_x + 2, BOX_Y + 2), Some(BACKGROUND));
        // glyph pixels sit in the middle of the struck box
        let glyph_area = (BOX_Y..BOX_Y + CELL_H)
            .flat_map(|y| (struck_x..struck_x + CELL_W).map(move |x| (x, y)))
            .filter(|&(x, y)| raster.pixel(x, y) == Some(GLYPH))
            .count();
        assert!(glyph_area > 0);
    }

    #[test]
    fn test_export_writes_p6_file() {
        let grid = PatternGrid::new(Resolution::Sixteenth, 4);
        let path = std::env::temp_dir().join(format!("strumkit-grid-{}.ppm", std::process::id()));
        grid.export_ppm(&path).unwrap();
        let bytes = fs::read(&path).unwrap();
        let raster = grid.render_raster();
        let header = format!("P6\n{} {}\n255\n", raster.width, raster.height);
        assert!(bytes.starts_with(header.as_bytes()));
        assert_eq!(bytes.len(), header.len() + raster.width * raster.height * 3);
        let _ = fs::remove_file(&path);
    }
}
