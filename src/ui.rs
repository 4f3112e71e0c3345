use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use strumkit::highlight::{highlighted_cell, layout_for, ActiveStroke, Cell, GridLayout, PlayerState};
use strumkit::pattern::{count_label, StrokeType, StrumPattern};
use strumkit::Clock;

use crate::app::{App, Deck, InputMode, View};

// ── Top-level routing ─────────────────────────────────────────────────────────

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // title bar   chunks[0]
            Constraint::Length(3),  // transport   chunks[1]
            Constraint::Min(10),    // active view chunks[2]
            Constraint::Length(3),  // status      chunks[3]
            Constraint::Length(4),  // help        chunks[4]
        ])
        .split(area);

    draw_title(f, chunks[0], app);
    draw_transport(f, chunks[1], app);
    match app.view {
        View::Player    => draw_player(f, chunks[2], app),
        View::Song      => draw_song(f, chunks[2], app),
        View::Generator => draw_generator(f, chunks[2], app),
    }
    draw_status(f, chunks[3], app);
    draw_help(f, chunks[4], app);
}

/// What the deck's tracker wants lit right now.
fn visible(deck: &Deck) -> Option<ActiveStroke> {
    deck.tracker.visible_stroke(deck.engine.clock().now())
}

fn focused_block(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
}

fn stroke_color(stroke: StrokeType) -> Color {
    match stroke {
        StrokeType::Down => Color::Cyan,
        StrokeType::Up   => Color::Magenta,
    }
}

// ── Title bar ─────────────────────────────────────────────────────────────────

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let state = match app.deck().tracker.state() {
        PlayerState::Idle    => "■ STOPPED",
        PlayerState::Playing => "▶ PLAYING",
        PlayerState::Looping => "↻ LOOPING",
    };
    let text = format!(
        "  Strumkit  ─  View: {}  ─  {}  ─  Tab: cycle view  Space: play/stop",
        app.view.name(), state
    );
    f.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL)),
        area,
    );
}

// ── Transport bar ─────────────────────────────────────────────────────────────

fn draw_transport(f: &mut Frame, area: Rect, app: &App) {
    let s = &app.settings;
    let engine = &app.deck().engine;
    let d = Style::default().fg(Color::DarkGray);
    let on_off = |on: bool| if on { "on" } else { "off" };
    let flag = |on: bool| if on {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let mut spans = vec![
        Span::styled("BPM: ", d),
        Span::styled(format!("{:.0}", s.bpm), Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled("Sound: ", d),
        Span::styled(s.sound_mode.name(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled("Chord: ", d),
        Span::styled(engine.backend().voicing().name(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled("Loop: ", d),
        Span::styled(on_off(engine.is_looping()), flag(engine.is_looping())),
        Span::raw("  │  "),
        Span::styled("Vol: ", d),
        Span::styled(format!("{:.0}%", s.volume * 100.0), Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled("Click: ", d),
        Span::styled(on_off(s.metronome), flag(s.metronome)),
    ];

    // Beat pulse, only meaningful while the metronome is sounding
    if s.metronome && app.deck().tracker.is_active() {
        let pulse = app.deck().tracker.pulse();
        spans.push(Span::raw(" "));
        let beats = match app.view {
            View::Player => app.player.patterns.get(app.player.selected).map_or(4, |p| p.beats_per_measure),
            View::Song => {
                let measure = app.deck().tracker.measure() % app.song.song.total_measures().max(1);
                app.song.song.section_at(measure)
                    .map_or(4, |(i, _)| app.song.song.sections[i].pattern.beats_per_measure)
            }
            View::Generator => app.generator.grid.beats(),
        };
        for beat in 0..beats {
            let lit = pulse == Some(beat);
            spans.push(Span::styled(
                if lit { "●" } else { "○" },
                if lit { Style::default().fg(Color::Yellow) } else { d },
            ));
        }
    }

    f.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().title(" Transport ").borders(Borders::ALL)),
        area,
    );
}

// ── Grid rendering ────────────────────────────────────────────────────────────

/// Two lines per layout row: count labels, then strokes.
fn grid_lines(layout: &dyn GridLayout, pattern: &StrumPattern, lit: Option<Cell>) -> Vec<Line<'static>> {
    let cells = layout.cells();
    let mut lines = Vec::new();
    for row in 0..layout.rows() {
        let row_cells: Vec<_> = cells.iter().filter(|c| c.cell.row == row).collect();

        let labels: Vec<Span> = row_cells
            .iter()
            .map(|c| {
                let on_beat = c.label.chars().all(|ch| ch.is_ascii_digit());
                let sty = if on_beat { Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD) }
                          else       { Style::default().fg(Color::DarkGray) };
                Span::styled(format!("{:^4}", c.label), sty)
            })
            .collect();
        lines.push(Line::from(labels));

        let strokes: Vec<Span> = row_cells
            .iter()
            .map(|c| {
                let stroke = pattern.stroke_at(c.time).map(|i| pattern.strokes[i].stroke_type);
                let is_lit = lit == Some(c.cell);
                let text = stroke.map_or("·".to_string(), |s| s.glyph().to_string());
                let sty = match stroke {
                    Some(_) if is_lit => Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD),
                    Some(s)           => Style::default().fg(stroke_color(s)).add_modifier(Modifier::BOLD),
                    None              => Style::default().fg(Color::DarkGray),
                };
                Span::styled(format!("{:^4}", text), sty)
            })
            .collect();
        lines.push(Line::from(strokes));
        lines.push(Line::from(""));
    }
    lines
}

// ── Player view ───────────────────────────────────────────────────────────────

fn draw_player(f: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Min(20)])
        .split(area);

    let items: Vec<Line> = app
        .player
        .patterns
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let selected = i == app.player.selected;
            let sty = if selected { Style::default().fg(Color::Black).bg(Color::Yellow) }
                      else        { Style::default().fg(Color::White) };
            Line::from(Span::styled(format!(" {:<24}", p.name), sty))
        })
        .collect();
    f.render_widget(Paragraph::new(items).block(focused_block(" Patterns — [↑↓] Select  [e] Edit ")), cols[0]);

    let Some(pattern) = app.player.patterns.get(app.player.selected) else { return };
    let layout = layout_for(pattern);
    let lit = highlighted_cell(layout.as_ref(), pattern, visible(&app.player.deck));

    let mut lines = vec![
        Line::from(vec![
            Span::styled(pattern.name.clone(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::styled(
                format!("   {}/4  {} grid", pattern.beats_per_measure, pattern.resolution().name()),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::from(Span::styled(pattern.description.clone(), Style::default().fg(Color::DarkGray))),
        Line::from(""),
    ];
    lines.extend(grid_lines(layout.as_ref(), pattern, lit));
    lines.push(Line::from(vec![
        Span::styled("Measure: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", app.player.deck.tracker.measure() + 1),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
    ]));

    f.render_widget(Paragraph::new(lines).block(focused_block(" Pattern ")), cols[1]);
}

// ── Song view ─────────────────────────────────────────────────────────────────

fn draw_song(f: &mut Frame, area: Rect, app: &App) {
    let view = &app.song;
    let tracker = &view.deck.tracker;
    let lit = view.timeline.highlighted(&view.song, visible(&view.deck));
    let current = tracker.is_active().then(|| (tracker.measure() % view.song.total_measures().max(1)) as usize);

    let mut lines = vec![
        Line::from(vec![
            Span::styled(view.song.title.clone(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::styled(format!("   {} measures", view.song.total_measures()), Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(""),
    ];

    let mut first_cell = 0usize;
    for measure in 0..view.timeline.measures() {
        let cells = view.timeline.measure_cells(measure);
        let Some((section, in_section)) = view.song.section_at(measure as u64) else { break };
        let sec = &view.song.sections[section];
        let marker = if current == Some(measure) { "▶" } else { " " };

        let mut row = vec![
            Span::styled(marker, Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::styled(
                format!(" {:<8}{:>2}/{:<2}", sec.name, in_section + 1, sec.measures),
                Style::default().fg(if in_section == 0 { Color::Yellow } else { Color::DarkGray }),
            ),
            Span::styled("│", Style::default().fg(Color::DarkGray)),
        ];
        for (i, cell) in cells.iter().enumerate() {
            let is_lit = lit == Some(first_cell + i);
            let text = cell.stroke.map_or("·".to_string(), |s| s.glyph().to_string());
            let sty = match cell.stroke {
                Some(_) if is_lit => Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD),
                Some(s)           => Style::default().fg(stroke_color(s)),
                None              => Style::default().fg(Color::DarkGray),
            };
            row.push(Span::styled(format!("{} ", text), sty));
        }
        first_cell += cells.len();
        lines.push(Line::from(row));
    }

    f.render_widget(Paragraph::new(lines).block(focused_block(" Song ")), area);
}

// ── Generator view ────────────────────────────────────────────────────────────

fn draw_generator(f: &mut Frame, area: Rect, app: &App) {
    let view = &app.generator;
    let grid = &view.grid;
    let preview = grid.to_pattern("preview", "Preview");
    let lit = visible(&view.deck)
        .and_then(|a| preview.strokes.get(a.stroke_index))
        .and_then(|s| grid.cell_at_time(s.time));

    let mut lines = vec![Line::from(vec![
        Span::styled("Grid: ", Style::default().fg(Color::DarkGray)),
        Span::styled(grid.resolution().name(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled("Beats: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", grid.beats()), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled("Strokes: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", grid.active_count()), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(
            format!("cursor {}/{} ({})", view.cursor + 1, grid.len(), count_label(grid.time_of(view.cursor))),
            Style::default().fg(Color::White),
        ),
    ])];
    lines.push(Line::from(""));

    let per_row = if grid.len() <= 16 { 16 } else { grid.len().div_ceil(2) };
    for chunk_start in (0..grid.len()).step_by(per_row) {
        let chunk_end = (chunk_start + per_row).min(grid.len());

        let mut labels = Vec::new();
        let mut cells = Vec::new();
        for i in chunk_start..chunk_end {
            let label = count_label(grid.time_of(i));
            let on_beat = label.chars().all(|c| c.is_ascii_digit());
            labels.push(Span::styled(
                format!("{:^4}", label),
                if on_beat { Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD) }
                else       { Style::default().fg(Color::DarkGray) },
            ));

            let stroke = grid.stroke_type(i);
            let active = grid.is_active(i);
            let is_cu = i == view.cursor;
            let is_lit = lit == Some(i);
            // ghost cells show the hand's direction in lower case
            let text = if active { format!("[{}]", stroke.glyph()) }
                       else      { format!(" {} ", stroke.glyph().to_ascii_lowercase()) };
            let sty = if is_lit && is_cu { Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD) }
                      else if is_lit     { Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD) }
                      else if is_cu      { Style::default().fg(Color::Black).bg(Color::Yellow) }
                      else if active     { Style::default().fg(stroke_color(stroke)).add_modifier(Modifier::BOLD) }
                      else               { Style::default().fg(Color::DarkGray) };
            cells.push(Span::styled(format!("{} ", text), sty));
        }
        lines.push(Line::from(labels));
        lines.push(Line::from(cells));
        lines.push(Line::from(""));
    }

    let summary = preview.strokes.iter().map(|s| s.stroke_type.glyph().to_string()).collect::<Vec<_>>().join(" ");
    lines.push(Line::from(vec![
        Span::styled("Pattern: ", Style::default().fg(Color::DarkGray)),
        Span::styled(if summary.is_empty() { "—".to_string() } else { summary }, Style::default().fg(Color::White)),
    ]));

    if let Some(prompt) = view_prompt(app) {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled(prompt, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::styled(format!("{}_", app.input_buf), Style::default().fg(Color::White)),
        ]));
    }

    f.render_widget(
        Paragraph::new(lines).block(focused_block(" Generator — [←→] Cursor  [Enter] Toggle  [r] 8th/16th  [[]] Beats  [c] Clear ")),
        area,
    );
}

fn view_prompt(app: &App) -> Option<&'static str> {
    match app.input_mode {
        InputMode::None        => None,
        InputMode::SavePattern => Some("Save JSON as: "),
        InputMode::ExportImage => Some("Export PPM as: "),
    }
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(app.status_msg.as_str(), Style::default().fg(Color::Yellow))))
            .block(Block::default().title(" Status ").borders(Borders::ALL))
            .wrap(Wrap { trim: false }),
        area,
    );
}

// ── Help ──────────────────────────────────────────────────────────────────────

fn draw_help(f: &mut Frame, area: Rect, app: &App) {
    let w = Style::default().fg(Color::White);

    let global = Line::from(vec![
        Span::styled("[Tab] ",     w), Span::raw("View  │  "),
        Span::styled("[Space] ",   w), Span::raw("Play/Stop  │  "),
        Span::styled("[PgUp/Dn] ", w), Span::raw("BPM  │  "),
        Span::styled("[m] ",       w), Span::raw("Metronome  │  "),
        Span::styled("[l] ",       w), Span::raw("Loop  │  "),
        Span::styled("[s] ",       w), Span::raw("Sound  │  "),
        Span::styled("[v] ",       w), Span::raw("Chord  │  "),
        Span::styled("[-=] ",      w), Span::raw("Vol  │  "),
        Span::styled("[Esc] ",     w), Span::raw("Quit"),
    ]);

    let view_line = match app.view {
        View::Player => Line::from(vec![
            Span::styled("[↑↓] ", w), Span::raw("Pattern  │  "),
            Span::styled("[e] ",  w), Span::raw("Open in generator"),
        ]),
        View::Song => Line::from(vec![
            Span::raw("Plays every section in order; the highlight follows the measure being played"),
        ]),
        View::Generator => Line::from(vec![
            Span::styled("[←→] ",    w), Span::raw("Cursor  │  "),
            Span::styled("[Enter] ", w), Span::raw("Toggle stroke  │  "),
            Span::styled("[r] ",     w), Span::raw("8th/16th  │  "),
            Span::styled("[[ ]] ",   w), Span::raw("Beats  │  "),
            Span::styled("[c] ",     w), Span::raw("Clear  │  "),
            Span::styled("[w] ",     w), Span::raw("Save JSON  │  "),
            Span::styled("[x] ",     w), Span::raw("Export PPM"),
        ]),
    };

    f.render_widget(
        Paragraph::new(vec![global, view_line])
            .block(Block::default().title(" Help ").borders(Borders::ALL))
            .style(Style::default().fg(Color::DarkGray)),
        area,
    );
}
