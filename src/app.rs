use std::path::Path;
use std::time::Duration;

use log::{info, warn};

use strumkit::config::Settings;
use strumkit::generator::PatternGrid;
use strumkit::highlight::HighlightTracker;
use strumkit::library;
use strumkit::pattern::{count_label, Resolution, StrumPattern};
use strumkit::song::{SongStructure, SongTimeline};
use strumkit::{AudioOutput, MonotonicClock, StrumEngine, StrumError};

/// Upper bound on how long the main loop may block waiting for input.
pub const FRAME: Duration = Duration::from_millis(16);

// ── Views ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum View {
    /// Pick a pattern and play it.
    Player,
    /// Play a multi-section song.
    Song,
    /// Build a pattern on a grid.
    Generator,
}

impl View {
    pub fn name(self) -> &'static str {
        match self {
            View::Player    => "Player",
            View::Song      => "Song",
            View::Generator => "Generator",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    None,
    SavePattern,
    ExportImage,
}

/// An engine plus the tracker following it.  Every view has its own.
pub struct Deck {
    pub engine:  StrumEngine,
    pub tracker: HighlightTracker,
}

impl Deck {
    fn new(settings: &Settings) -> Self {
        let mut engine = StrumEngine::with_parts(
            AudioOutput::with_mode(settings.sound_mode, settings.voicing),
            MonotonicClock::new(),
        );
        engine.set_loop(settings.loop_playback);
        engine.backend_mut().set_volume(settings.volume);
        Self { engine, tracker: HighlightTracker::new(settings.downbeat_gap()) }
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    fn tick(&mut self) {
        let events = self.engine.poll();
        self.tracker.apply_all(&events);
    }

    fn stop(&mut self) {
        self.engine.stop();
        self.tick();
    }
}

pub struct PlayerView {
    pub deck:     Deck,
    pub patterns: Vec<StrumPattern>,
    pub selected: usize,
}

pub struct SongView {
    pub deck:     Deck,
    pub song:     SongStructure,
    pub timeline: SongTimeline,
}

pub struct GeneratorView {
    pub deck:   Deck,
    pub grid:   PatternGrid,
    pub cursor: usize,
}

// ── App state ─────────────────────────────────────────────────────────────────

pub struct App {
    pub view:        View,
    pub settings:    Settings,
    pub player:      PlayerView,
    pub song:        SongView,
    pub generator:   GeneratorView,
    pub status_msg:  String,
    pub input_mode:  InputMode,
    pub input_buf:   String,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let mut status_msg = String::new();
        let mut patterns = library::presets();
        if let Some(dir) = &settings.pattern_dir {
            match library::load_dir(dir) {
                Ok(extra) => {
                    info!("{} patterns from {}", extra.len(), dir.display());
                    patterns.extend(extra);
                }
                Err(e) => {
                    warn!("pattern dir {}: {e}", dir.display());
                    status_msg = format!("Pattern dir: {e}");
                }
            }
        }
        let song = library::demo_song();
        let timeline = SongTimeline::new(&song);
        let grid = patterns
            .iter()
            .find(|p| p.id == "folk")
            .map(PatternGrid::from_pattern)
            .unwrap_or_else(|| PatternGrid::new(Resolution::Eighth, 4));

        Self {
            view: View::Player,
            player: PlayerView { deck: Deck::new(&settings), patterns, selected: 0 },
            song: SongView { deck: Deck::new(&settings), song, timeline },
            generator: GeneratorView { deck: Deck::new(&settings), grid, cursor: 0 },
            settings,
            status_msg,
            input_mode: InputMode::None,
            input_buf: String::new(),
        }
    }

    fn decks_mut(&mut self) -> [&mut Deck; 3] {
        [&mut self.player.deck, &mut self.song.deck, &mut self.generator.deck]
    }

    pub fn deck(&self) -> &Deck {
        match self.view {
            View::Player    => &self.player.deck,
            View::Song      => &self.song.deck,
            View::Generator => &self.generator.deck,
        }
    }

    fn deck_mut(&mut self) -> &mut Deck {
        match self.view {
            View::Player    => &mut self.player.deck,
            View::Song      => &mut self.song.deck,
            View::Generator => &mut self.generator.deck,
        }
    }

    // ── Main loop hooks ───────────────────────────────────────────────────

    /// Fire due triggers on every deck and update the highlights.
    pub fn tick(&mut self) {
        for deck in self.decks_mut() {
            deck.tick();
        }
    }

    /// How long the loop may wait for input before the next trigger is due.
    pub fn next_wakeup(&mut self) -> Duration {
        self.decks_mut()
            .into_iter()
            .filter_map(|d| d.engine.time_until_next())
            .fold(FRAME, Duration::min)
    }

    pub fn stop_all(&mut self) {
        for deck in self.decks_mut() {
            deck.stop();
        }
    }

    // ── Transport ─────────────────────────────────────────────────────────

    pub fn toggle_play(&mut self) {
        if self.deck().is_playing() {
            self.deck_mut().stop();
            self.status_msg = "Stopped".to_string();
            return;
        }
        match self.start_current() {
            Ok(()) => self.status_msg = format!("Playing at {:.0} BPM", self.settings.bpm),
            Err(e) => {
                warn!("play failed: {e}");
                self.deck_mut().tracker.stop();
                self.status_msg = format!("Error: {e}");
            }
        }
    }

    fn start_current(&mut self) -> Result<(), StrumError> {
        let bpm = self.settings.bpm;
        let metronome = self.settings.metronome;
        let id = match self.view {
            View::Player => {
                let pattern = self.player.patterns.get(self.player.selected).cloned().ok_or_else(|| {
                    StrumError::InvalidPattern { id: String::new(), reason: "no pattern selected".to_string() }
                })?;
                let deck = &mut self.player.deck;
                deck.engine.ensure_started()?;
                deck.engine.play_pattern(&pattern, bpm, metronome)?
            }
            View::Song => {
                let arrangement = self.song.song.to_arrangement()?;
                let deck = &mut self.song.deck;
                deck.engine.ensure_started()?;
                deck.engine.play_arrangement(arrangement, bpm, metronome)?
            }
            View::Generator => {
                let pattern = self.generator.grid.to_pattern("preview", "Preview");
                let deck = &mut self.generator.deck;
                deck.engine.ensure_started()?;
                deck.engine.play_pattern(&pattern, bpm, metronome)?
            }
        };
        let deck = self.deck_mut();
        deck.tracker.begin(id);
        // the downbeat is due immediately
        deck.tick();
        Ok(())
    }

    /// Restart the current view if it is playing, so edits are heard.
    fn restart_if_playing(&mut self) {
        if self.deck().is_playing() {
            if let Err(e) = self.start_current() {
                self.deck_mut().stop();
                self.status_msg = format!("Error: {e}");
            }
        }
    }

    /// Cycle Player → Song → Generator.  The view being left stops.
    pub fn cycle_view(&mut self) {
        self.deck_mut().stop();
        self.view = match self.view {
            View::Player    => View::Song,
            View::Song      => View::Generator,
            View::Generator => View::Player,
        };
        self.status_msg = format!("View: {}", self.view.name());
    }

    pub fn bpm_up(&mut self) {
        self.set_bpm(self.settings.bpm + 5.0);
    }

    pub fn bpm_down(&mut self) {
        self.set_bpm(self.settings.bpm - 5.0);
    }

    fn set_bpm(&mut self, bpm: f64) {
        self.settings.bpm = bpm.clamp(30.0, 300.0);
        let bpm = self.settings.bpm;
        for deck in self.decks_mut() {
            // only applies while playing; clamped above so it cannot fail
            let _ = deck.engine.set_tempo(bpm);
        }
        self.status_msg = format!("BPM: {:.0}", bpm);
    }

    pub fn toggle_metronome(&mut self) {
        self.settings.metronome = !self.settings.metronome;
        let on = self.settings.metronome;
        for deck in self.decks_mut() {
            deck.engine.set_metronome(on);
        }
        self.status_msg = format!("Metronome: {}", if on { "on" } else { "off" });
    }

    pub fn toggle_loop(&mut self) {
        self.settings.loop_playback = !self.settings.loop_playback;
        let on = self.settings.loop_playback;
        for deck in self.decks_mut() {
            deck.engine.set_loop(on);
        }
        self.status_msg = format!("Loop: {}", if on { "on" } else { "off" });
    }

    pub fn cycle_sound_mode(&mut self) {
        self.settings.sound_mode = self.settings.sound_mode.next();
        let mode = self.settings.sound_mode;
        for deck in self.decks_mut() {
            deck.engine.set_sound_mode(mode);
        }
        self.status_msg = format!("Sound: {}", mode.name());
    }

    pub fn cycle_voicing(&mut self) {
        self.settings.voicing = self.settings.voicing.next();
        let voicing = self.settings.voicing;
        for deck in self.decks_mut() {
            deck.engine.backend_mut().set_voicing(voicing);
        }
        self.status_msg = format!("Chord: {}", voicing.name());
    }

    pub fn volume_up(&mut self) {
        self.set_volume(self.settings.volume + 0.05);
    }

    pub fn volume_down(&mut self) {
        self.set_volume(self.settings.volume - 0.05);
    }

    fn set_volume(&mut self, volume: f32) {
        self.settings.volume = volume.clamp(0.0, 1.0);
        let volume = self.settings.volume;
        for deck in self.decks_mut() {
            deck.engine.backend_mut().set_volume(volume);
        }
        self.status_msg = format!("Volume: {:.0}%", volume * 100.0);
    }

    // ── Player view ───────────────────────────────────────────────────────

    pub fn select_prev(&mut self) {
        let n = self.player.patterns.len();
        if n == 0 { return; }
        self.player.selected = if self.player.selected == 0 { n - 1 } else { self.player.selected - 1 };
        self.on_pattern_selected();
    }

    pub fn select_next(&mut self) {
        let n = self.player.patterns.len();
        if n == 0 { return; }
        self.player.selected = (self.player.selected + 1) % n;
        self.on_pattern_selected();
    }

    fn on_pattern_selected(&mut self) {
        if let Some(p) = self.player.patterns.get(self.player.selected) {
            self.status_msg = format!("Pattern: {}", p.name);
        }
        self.restart_if_playing();
    }

    /// Open the selected pattern in the generator.
    pub fn edit_selected(&mut self) {
        let Some(pattern) = self.player.patterns.get(self.player.selected) else { return };
        self.generator.grid = PatternGrid::from_pattern(pattern);
        self.generator.cursor = 0;
        self.status_msg = format!("Editing: {}", pattern.name);
        self.deck_mut().stop();
        self.view = View::Generator;
    }

    // ── Generator view ────────────────────────────────────────────────────

    pub fn gen_cursor_left(&mut self) {
        let n = self.generator.grid.len();
        self.generator.cursor = if self.generator.cursor == 0 { n - 1 } else { self.generator.cursor - 1 };
    }

    pub fn gen_cursor_right(&mut self) {
        let n = self.generator.grid.len();
        self.generator.cursor = (self.generator.cursor + 1) % n;
    }

    pub fn gen_toggle_cell(&mut self) {
        let cursor = self.generator.cursor;
        let grid = &mut self.generator.grid;
        self.status_msg = match grid.toggle(cursor) {
            Some(stroke) => format!("{} on {}", stroke.glyph(), count_label(grid.time_of(cursor))),
            None         => format!("Cell {} cleared", cursor + 1),
        };
        self.restart_if_playing();
    }

    pub fn gen_clear(&mut self) {
        self.generator.grid.clear();
        self.status_msg = "Grid cleared".to_string();
        self.restart_if_playing();
    }

    pub fn gen_toggle_resolution(&mut self) {
        let grid = &mut self.generator.grid;
        let next = match grid.resolution() {
            Resolution::Eighth    => Resolution::Sixteenth,
            Resolution::Sixteenth => Resolution::Eighth,
        };
        let dropped = grid.set_resolution(next);
        self.generator.cursor = self.generator.cursor.min(grid.len() - 1);
        self.status_msg = if dropped > 0 {
            format!("Grid: {} ({} strokes dropped)", next.name(), dropped)
        } else {
            format!("Grid: {}", next.name())
        };
        self.restart_if_playing();
    }

    pub fn gen_beats_up(&mut self) {
        let beats = (self.generator.grid.beats() + 1).min(12);
        self.set_gen_beats(beats);
    }

    pub fn gen_beats_down(&mut self) {
        let beats = self.generator.grid.beats().saturating_sub(1).max(1);
        self.set_gen_beats(beats);
    }

    fn set_gen_beats(&mut self, beats: u32) {
        let grid = &mut self.generator.grid;
        grid.set_beats(beats);
        self.generator.cursor = self.generator.cursor.min(grid.len() - 1);
        self.status_msg = format!("Beats per measure: {}", beats);
        self.restart_if_playing();
    }

    pub fn begin_save(&mut self) {
        self.input_mode = InputMode::SavePattern;
        self.input_buf  = "my-pattern.json".to_string();
    }

    pub fn begin_export(&mut self) {
        self.input_mode = InputMode::ExportImage;
        self.input_buf  = "my-pattern.ppm".to_string();
    }

    pub fn cancel_input(&mut self) {
        self.input_mode = InputMode::None;
        self.input_buf.clear();
        self.status_msg = "Cancelled".to_string();
    }

    pub fn commit_input(&mut self) {
        let path = std::mem::take(&mut self.input_buf);
        let mode = std::mem::replace(&mut self.input_mode, InputMode::None);
        let result = match mode {
            InputMode::None        => return,
            InputMode::SavePattern => self.save_generated(Path::new(&path)),
            InputMode::ExportImage => self.generator.grid.export_ppm(&path),
        };
        self.status_msg = match result {
            Ok(())  => format!("Wrote {}", path),
            Err(e)  => format!("Error: {e}"),
        };
    }

    fn save_generated(&mut self, path: &Path) -> Result<(), StrumError> {
        let id = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "pattern".to_string());
        let pattern = self.generator.grid.to_pattern(id.clone(), id);
        library::save_pattern(path, &pattern)?;
        match self.player.patterns.iter_mut().find(|p| p.id == pattern.id) {
            Some(existing) => *existing = pattern,
            None           => self.player.patterns.push(pattern),
        }
        Ok(())
    }
}
