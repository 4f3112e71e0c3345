//! Built-in patterns and pattern files on disk.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::Result;
use crate::pattern::{Stroke, StrumPattern};
use crate::song::{SongSection, SongStructure};

fn strokes(times_and_downs: &[(f64, bool)]) -> Vec<Stroke> {
    times_and_downs
        .iter()
        .map(|&(t, down)| if down { Stroke::down(t) } else { Stroke::up(t) })
        .collect()
}

/// Patterns the app ships with.
pub fn presets() -> Vec<StrumPattern> {
    vec![
        StrumPattern::new("all-downs", "All Downs", 4)
            .with_description("Quarter-note downstrokes")
            .with_strokes(strokes(&[(0.0, true), (1.0, true), (2.0, true), (3.0, true)])),
        StrumPattern::new("down-up", "Down Up Eighths", 4)
            .with_description("Straight eighths, down on the beat, up on the and")
            .with_strokes((0..8).map(|i| {
                let t = i as f64 * 0.5;
                if i % 2 == 0 { Stroke::down(t) } else { Stroke::up(t) }
            })),
        StrumPattern::new("folk", "Folk", 4)
            .with_description("D - D U - U D U")
            .with_strokes(strokes(&[
                (0.0, true), (1.0, true), (1.5, false), (2.5, false), (3.0, true), (3.5, false),
            ])),
        StrumPattern::new("waltz", "Waltz", 3)
            .with_description("Three-four: D - D U D U")
            .with_strokes(strokes(&[(0.0, true), (1.0, true), (1.5, false), (2.0, true), (2.5, false)])),
        StrumPattern::new("funk-16", "Sixteenth Funk", 4)
            .with_description("Syncopated sixteenths")
            .with_strokes(strokes(&[
                (0.0, true), (0.75, false), (1.5, true), (2.0, true), (2.25, false), (3.0, true), (3.25, false),
                (3.75, false),
            ])),
    ]
}

/// A short verse/chorus song built from the presets.
pub fn demo_song() -> SongStructure {
    let by_id = |id: &str| presets().into_iter().find(|p| p.id == id);
    let sections = [("Intro", "all-downs", 1), ("Verse", "folk", 2), ("Chorus", "funk-16", 2), ("Outro", "down-up", 1)]
        .into_iter()
        .filter_map(|(name, id, measures)| by_id(id).map(|p| SongSection::new(name, p, measures)))
        .collect();
    SongStructure::new("Demo Song", sections)
}

pub fn load_pattern(path: impl AsRef<Path>) -> Result<StrumPattern> {
    let text = fs::read_to_string(path.as_ref())?;
    let pattern: StrumPattern = serde_json::from_str(&text)?;
    pattern.validate()?;
    Ok(pattern)
}

/// Refuses to write a pattern that would not load back.
pub fn save_pattern(path: impl AsRef<Path>, pattern: &StrumPattern) -> Result<()> {
    pattern.validate()?;
    let json = serde_json::to_string_pretty(pattern)?;
    fs::write(path.as_ref(), json)?;
    debug!("saved pattern '{}' to {}", pattern.id, path.as_ref().display());
    Ok(())
}

/// Every valid `*.json` pattern in `dir`, in file-name order.  Files that do
/// not parse or validate are skipped with a warning.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<StrumPattern>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut patterns = Vec::with_capacity(paths.len());
    for path in paths {
        match load_pattern(&path) {
            Ok(p) => patterns.push(p),
            Err(e) => warn!("skipping {}: {e}", path.display()),
        }
    }
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::PatternGrid;
    use crate::pattern::StrokeType;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("strumkit-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_presets_are_valid_and_unique() {
        let all = presets();
        for p in &all {
            p.validate().unwrap();
        }
        let mut ids: Vec<&str> = all.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), all.len());
    }

    #[test]
    fn test_presets_follow_hand_direction() {
        for p in presets() {
            let derived = PatternGrid::from_pattern(&p).to_pattern(&p.id, &p.name);
            let stored: Vec<StrokeType> = p.strokes.iter().map(|s| s.stroke_type).collect();
            let expected: Vec<StrokeType> = derived.strokes.iter().map(|s| s.stroke_type).collect();
            assert_eq!(stored, expected, "{}", p.id);
        }
    }

    #[test]
    fn test_demo_song_is_playable() {
        let song = demo_song();
        assert_eq!(song.sections.len(), 4);
        assert_eq!(song.total_measures(), 6);
        assert!(song.to_arrangement().is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let dir = scratch_dir("save");
        let folk = presets().into_iter().find(|p| p.id == "folk").unwrap();
        let path = dir.join("folk.json");
        save_pattern(&path, &folk).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"beatsPerMeasure\": 4"));
        assert!(text.contains("\"type\": \"down\""));
        assert_eq!(load_pattern(&path).unwrap(), folk);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_dir_skips_bad_files() {
        let dir = scratch_dir("dir");
        for p in presets().iter().take(2) {
            save_pattern(dir.join(format!("{}.json", p.id)), p).unwrap();
        }
        fs::write(dir.join("broken.json"), "{ not json").unwrap();
        fs::write(
            dir.join("late.json"),
            r#"{"id":"late","name":"Late","beatsPerMeasure":2,"strokes":[{"type":"down","time":2.0}]}"#,
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let loaded = load_dir(&dir).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["all-downs", "down-up"]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_pattern_is_not_saved() {
        let dir = scratch_dir("invalid");
        let bad = StrumPattern::new("bad", "Bad", 0);
        assert!(save_pattern(dir.join("bad.json"), &bad).is_err());
        assert!(!dir.join("bad.json").exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
