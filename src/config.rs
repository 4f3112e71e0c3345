use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::instrument::{ChordVoicing, SoundMode};

pub const DEFAULT_PATH: &str = "strumkit.json";

/// Everything the app remembers between runs.  Missing fields fall back to
/// their defaults so older files keep loading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Transport
    pub bpm: f64,
    pub metronome: bool,
    pub loop_playback: bool,
    // Sound
    pub sound_mode: SoundMode,
    pub voicing: ChordVoicing,
    pub volume: f32,
    // Display
    pub downbeat_gap_ms: u64,
    /// Extra `*.json` patterns listed after the built-in ones.
    pub pattern_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bpm: 90.0,
            metronome: false,
            loop_playback: true,
            sound_mode: SoundMode::Percussion,
            voicing: ChordVoicing::EMinor,
            volume: 0.8,
            downbeat_gap_ms: 40,
            pattern_dir: None,
        }
    }
}

impl Settings {
    /// Defaults when `path` does not exist; a file that exists but does not
    /// parse is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(text) => {
                let settings = serde_json::from_str(&text)?;
                info!("loaded settings from {}", path.as_ref().display());
                Ok(settings)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn downbeat_gap(&self) -> Duration {
        Duration::from_millis(self.downbeat_gap_ms)
    }
}
