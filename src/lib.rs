//! Strumming-pattern playback.
//!
//! A [`StrumPattern`] is a measure of down/up strokes at fractional beat
//! positions.  [`StrumEngine`] schedules it against a clock, loops it without
//! drift, overlays a metronome and reports every trigger as a
//! [`PlaybackEvent`] that UI code feeds into a [`HighlightTracker`].
//!
//! ```no_run
//! use strumkit::{library, StrumEngine};
//!
//! # fn main() -> strumkit::Result<()> {
//! let folk = &library::presets()[2];
//! let mut engine = StrumEngine::new();
//! engine.ensure_started()?;
//! engine.play_pattern(folk, 90.0, true)?;
//! loop {
//!     for event in engine.poll() {
//!         println!("{event:?}");
//!     }
//!     std::thread::sleep(engine.time_until_next().unwrap_or_default());
//! }
//! # }
//! ```

pub mod audio;
pub mod clock;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod generator;
pub mod highlight;
pub mod instrument;
pub mod library;
pub mod pattern;
pub mod schedule;
pub mod song;
pub mod timer;

pub use audio::{AudioOutput, RecordingBackend, SoundBackend, Trigger};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Settings;
pub use engine::{Arrangement, EngineState, PlaybackEvent, PlaybackEventKind, SessionId, StrumEngine};
pub use error::{Result, StrumError};
pub use generator::{stroke_type_at, PatternGrid};
pub use highlight::{EighthGrid, GridLayout, HighlightTracker, PlayerState, SixteenthGrid};
pub use instrument::{ChordVoicing, SoundMode};
pub use pattern::{Resolution, Stroke, StrokeType, StrumPattern};
pub use schedule::Tempo;
pub use song::{SongSection, SongStructure, SongTimeline};
