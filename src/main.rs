mod app;
mod ui;

use anyhow::{Context, Result};
use app::{App, InputMode, View};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{env, fs::File, io};
use strumkit::config::{self, Settings};

/// Log to `strumkit.log` when `RUST_LOG` is set.  The terminal owns stdout
/// and stderr while the UI is up.
fn init_logging() {
    if env::var_os("RUST_LOG").is_none() { return; }
    match File::create("strumkit.log") {
        Ok(file) => {
            let _ = env_logger::Builder::from_default_env()
                .target(env_logger::Target::Pipe(Box::new(file)))
                .try_init();
        }
        Err(e) => eprintln!("could not open strumkit.log: {e}"),
    }
}

fn main() -> Result<()> {
    init_logging();
    let settings_path = env::args().nth(1).unwrap_or_else(|| config::DEFAULT_PATH.to_string());
    let settings = Settings::load_or_default(&settings_path)
        .with_context(|| format!("loading settings from {settings_path}"))?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut app = App::new(settings);
    let result = run(&mut terminal, &mut app);
    app.stop_all();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    if let Err(e) = result { eprintln!("Error: {:?}", e); }
    if let Err(e) = app.settings.save(&settings_path) {
        eprintln!("Could not save settings to {}: {}", settings_path, e);
    }
    Ok(())
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|f| ui::draw(f, app))?;

        // Wake for input, a due trigger or the next frame, whichever is first
        if event::poll(app.next_wakeup())? {
            let Event::Key(key) = event::read()? else { continue };
            if key.kind == KeyEventKind::Release { continue; }

            // ── Input mode: intercept all keys for file-path prompt ──
            if app.input_mode != InputMode::None {
                match key.code {
                    KeyCode::Esc       => app.cancel_input(),
                    KeyCode::Enter     => app.commit_input(),
                    KeyCode::Backspace => { app.input_buf.pop(); }
                    KeyCode::Char(c)   => app.input_buf.push(c),
                    _ => {}
                }
                continue;
            }

            match key.code {
                // Global quit
                KeyCode::Esc => break,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,

                // Global transport and sound
                KeyCode::Tab       => app.cycle_view(),
                KeyCode::Char(' ') => app.toggle_play(),
                KeyCode::PageUp    => app.bpm_up(),
                KeyCode::PageDown  => app.bpm_down(),
                KeyCode::Char('m') => app.toggle_metronome(),
                KeyCode::Char('l') => app.toggle_loop(),
                KeyCode::Char('s') => app.cycle_sound_mode(),
                KeyCode::Char('v') => app.cycle_voicing(),
                KeyCode::Char('=') => app.volume_up(),
                KeyCode::Char('-') => app.volume_down(),

                // ── Player view ───────────────────────────────────
                KeyCode::Up        if app.view == View::Player => app.select_prev(),
                KeyCode::Down      if app.view == View::Player => app.select_next(),
                KeyCode::Char('e') if app.view == View::Player => app.edit_selected(),

                // ── Generator view ────────────────────────────────
                KeyCode::Left      if app.view == View::Generator => app.gen_cursor_left(),
                KeyCode::Right     if app.view == View::Generator => app.gen_cursor_right(),
                KeyCode::Enter     if app.view == View::Generator => app.gen_toggle_cell(),
                KeyCode::Char('r') if app.view == View::Generator => app.gen_toggle_resolution(),
                KeyCode::Char(']') if app.view == View::Generator => app.gen_beats_up(),
                KeyCode::Char('[') if app.view == View::Generator => app.gen_beats_down(),
                KeyCode::Char('c') if app.view == View::Generator => app.gen_clear(),
                KeyCode::Char('w') if app.view == View::Generator => app.begin_save(),
                KeyCode::Char('x') if app.view == View::Generator => app.begin_export(),

                _ => {}
            }
        }
    }
    Ok(())
}
