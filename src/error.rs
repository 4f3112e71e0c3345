//! # Error Types
//!
//! Everything the engine can reject is reported synchronously at the call
//! boundary, so a caller never ends up with a silent or mistimed schedule.
//!
//! ## Error Types
//! - `InvalidTempo` - bpm was NaN or outside 1..=1000
//! - `InvalidPattern` - a pattern breaks the measure/grid rules
//! - `NotStarted` - playback requested before the audio output was unlocked
//! - `AudioUnavailable` - no usable output device or stream
//! - `Io` / `Json` - pattern and settings files
//!
//! ## Usage
//! ```rust
//! use strumkit::{StrumError, Tempo};
//!
//! match Tempo::new(0.0) {
//!     Err(StrumError::InvalidTempo(bpm)) => eprintln!("bad tempo {bpm}"),
//!     Err(e) => eprintln!("Error: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrumError {
    /// Tempo must be a finite number of beats per minute in `[1, 1000]`.
    ///
    /// ```
    /// # use strumkit::StrumError;
    /// let err = StrumError::InvalidTempo(-4.0);
    /// assert_eq!(err.to_string(), "Invalid tempo: -4 bpm (must be between 1 and 1000)");
    /// ```
    #[error("Invalid tempo: {0} bpm (must be between 1 and 1000)")]
    InvalidTempo(f64),

    /// The pattern cannot be scheduled as given.
    ///
    /// ```
    /// # use strumkit::StrumError;
    /// let err = StrumError::InvalidPattern {
    ///     id: "folk".to_string(),
    ///     reason: "stroke time 4 outside [0, 4)".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "Invalid pattern 'folk': stroke time 4 outside [0, 4)");
    /// ```
    #[error("Invalid pattern '{id}': {reason}")]
    InvalidPattern { id: String, reason: String },

    /// `ensure_started` has not completed yet.
    #[error("Audio output not started; call ensure_started() first")]
    NotStarted,

    #[error("Audio output unavailable: {0}")]
    AudioUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StrumError {
    pub(crate) fn pattern(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern { id: id.to_string(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, StrumError>;
