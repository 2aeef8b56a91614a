mod clipboard;
mod help;
mod state;

use crate::cli::{build_config, Cli};
use crate::engine::InjectorFactory;
use crate::model::{Outcome, RunConfig, RunState, UiEvent};
use crate::orchestrator::{self, RunController, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{Field, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

pub async fn run(args: Cli, factory: Arc<dyn InjectorFactory>) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let initial = build_config(&args);
    let (config_tx, config_rx) = watch::channel(initial.clone());

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let dry_run = args.dry_run;
    let ui_handle = std::thread::spawn(move || {
        run_threaded(initial, dry_run, config_tx, event_rx, cmd_tx)
    });

    let controller = RunController::new(config_rx, factory, event_tx);
    let res = orchestrator::run_controller(controller, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    initial: RunConfig,
    dry_run: bool,
    config_tx: watch::Sender<RunConfig>,
    mut event_rx: UnboundedReceiver<UiEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(&initial, dry_run);
    if dry_run {
        state.push_log("Dry run: nothing will be typed.");
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if handle_key(&mut state, k, &config_tx, &cmd_tx) {
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Apply one key press. Returns true when the UI should exit.
fn handle_key(
    state: &mut UiState,
    k: KeyEvent,
    config_tx: &watch::Sender<RunConfig>,
    cmd_tx: &UnboundedSender<UiCommand>,
) -> bool {
    let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);
    match k.code {
        KeyCode::Char('c') | KeyCode::Char('q') if ctrl => {
            let _ = cmd_tx.send(UiCommand::Quit);
            return true;
        }
        KeyCode::Char('t') if ctrl => {
            let _ = cmd_tx.send(UiCommand::QuickTest);
        }
        KeyCode::Char('l') if ctrl => {
            state.log.clear();
            state.info = "Log cleared".into();
        }
        KeyCode::Char('y') if ctrl => {
            if state.log.is_empty() {
                state.info = "Log is empty, nothing to copy".into();
            } else {
                state.info = match clipboard::copy_to_clipboard(&state.log.join("\n")) {
                    Ok(()) => format!("✓ Copied {} log lines to clipboard", state.log.len()),
                    Err(e) => format!("Clipboard copy failed: {e:#}"),
                };
            }
        }
        KeyCode::F(1) => {
            state.tab = if state.tab == 0 { 1 } else { 0 };
        }
        KeyCode::Enter => {
            if !state.inputs_enabled() {
                state.info = "A run is already in progress.".into();
            } else {
                match state.form.to_config() {
                    Ok(cfg) => {
                        // Each run starts with a fresh log.
                        state.log.clear();
                        config_tx.send_replace(cfg);
                        let _ = cmd_tx.send(UiCommand::Start);
                    }
                    Err(e) => {
                        state.info = e.to_string();
                        state.push_log(&format!("Validation: {e}"));
                    }
                }
            }
        }
        KeyCode::Esc => {
            let _ = cmd_tx.send(UiCommand::Stop);
        }
        KeyCode::Up | KeyCode::BackTab => state.form.focus = state.form.focus.prev(),
        KeyCode::Down | KeyCode::Tab => state.form.focus = state.form.focus.next(),
        KeyCode::Backspace => {
            if state.inputs_enabled() && state.form.backspace() {
                publish_form(state, config_tx);
            }
        }
        KeyCode::Char(ch) if !ctrl => {
            if state.inputs_enabled() && state.form.input(ch) {
                publish_form(state, config_tx);
            }
        }
        _ => {}
    }
    false
}

/// Publish the form to the controller when it parses.
fn publish_form(state: &mut UiState, config_tx: &watch::Sender<RunConfig>) {
    match state.form.to_config() {
        Ok(cfg) => {
            config_tx.send_replace(cfg);
        }
        Err(e) => state.info = e.to_string(),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    let title = if state.dry_run {
        "message-sender (dry run)"
    } else {
        "message-sender"
    };
    let tabs = Tabs::new(vec![Line::from("Sender"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_sender(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }

    let footer = if state.info.is_empty() {
        Line::from(Span::styled(
            "Tip: test in a safe input field first. Move the mouse to the top-left corner to abort.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(Span::styled(
            state.info.clone(),
            Style::default().fg(Color::Gray),
        ))
    };
    f.render_widget(Paragraph::new(footer), chunks[2]);
}

fn draw_sender(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(area);

    draw_form(cols[0], f, state);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(5), // Status
                Constraint::Length(3), // Progress gauge
                Constraint::Length(4), // Last run
                Constraint::Min(3),    // Log
            ]
            .as_ref(),
        )
        .split(cols[1]);

    draw_status(right[0], f, state);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(state.progress_ratio())
        .label(format!("Progress: {} / {}", state.sent, state.total));
    f.render_widget(gauge, right[1]);

    draw_last_run(right[2], f, state);
    draw_log(right[3], f, state);
}

fn field_block(field: Field, state: &UiState) -> Block<'static> {
    let border = if state.form.focus == field {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(field.label())
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let outer = Block::default()
        .borders(Borders::ALL)
        .title("Message Settings");
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(inner);

    let text_style = if state.inputs_enabled() {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let text_fields = [
        (Field::Message, state.form.message.as_str(), rows[0]),
        (Field::Count, state.form.count.as_str(), rows[1]),
        (Field::Delay, state.form.delay.as_str(), rows[2]),
        (Field::Prep, state.form.prep.as_str(), rows[4]),
    ];
    for (field, value, rect) in text_fields {
        let mut text = value.to_string();
        if state.form.focus == field && state.inputs_enabled() {
            text.push('▏');
        }
        let p = Paragraph::new(Span::styled(text, text_style)).block(field_block(field, state));
        f.render_widget(p, rect);
    }

    let mark = if state.form.auto_delay { "[x]" } else { "[ ]" };
    let checkbox = Paragraph::new(Line::from(vec![
        Span::styled(mark, text_style.add_modifier(Modifier::BOLD)),
        Span::styled(" Use 0.5 s when the delay is 0", text_style),
    ]))
    .block(field_block(Field::AutoDelay, state));
    f.render_widget(checkbox, rows[3]);

    let hints = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw(" start  "),
            Span::styled("Esc", Style::default().fg(Color::Magenta)),
            Span::raw(" stop  "),
            Span::styled("Ctrl-T", Style::default().fg(Color::Magenta)),
            Span::raw(" quick test"),
        ]),
        Line::from(vec![
            Span::styled("Ctrl-L", Style::default().fg(Color::Magenta)),
            Span::raw(" clear log  "),
            Span::styled("Ctrl-Y", Style::default().fg(Color::Magenta)),
            Span::raw(" copy log  "),
            Span::styled("F1", Style::default().fg(Color::Magenta)),
            Span::raw(" help"),
        ]),
    ])
    .wrap(Wrap { trim: true });
    f.render_widget(hints, rows[5]);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let state_color = match state.run_state {
        RunState::Idle => Color::Gray,
        RunState::CountingDown => Color::Yellow,
        RunState::Running => Color::Green,
        RunState::Finished => Color::Cyan,
        RunState::Aborted => Color::Red,
    };
    let lines = vec![
        Line::from(vec![
            Span::styled("State:", Style::default().fg(Color::Gray)),
            Span::raw(" "),
            Span::styled(state.run_state.label(), Style::default().fg(state_color)),
        ]),
        Line::from(state.countdown_label.clone()),
    ];
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Run & Status"));
    f.render_widget(p, area);
}

fn draw_last_run(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let lines = match &state.last_summary {
        None => vec![Line::from(Span::styled(
            "No runs yet.",
            Style::default().fg(Color::DarkGray),
        ))],
        Some(s) => {
            let (mark, color) = match s.outcome {
                Outcome::Finished => ("✅", Color::Green),
                Outcome::Aborted => ("⛔", Color::Red),
            };
            let elapsed = Duration::from_millis(s.elapsed.as_millis() as u64);
            vec![
                Line::from(vec![
                    Span::raw(format!("{mark} ")),
                    Span::styled(s.detail.clone(), Style::default().fg(color)),
                ]),
                Line::from(format!(
                    "Sent {} / {} in {} (delay {:.2} s)",
                    s.sent,
                    s.total,
                    humantime::format_duration(elapsed),
                    s.delay_seconds
                )),
            ]
        }
    };
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Last run"));
    f.render_widget(p, area);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    // Show the tail that fits inside the borders.
    let visible = area.height.saturating_sub(2) as usize;
    let start = state.log.len().saturating_sub(visible);
    let lines: Vec<Line> = state.log[start..]
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();
    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Log ({})", state.log.len())),
    );
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        state: UiState,
        config_tx: watch::Sender<RunConfig>,
        config_rx: watch::Receiver<RunConfig>,
        cmd_tx: UnboundedSender<UiCommand>,
        cmd_rx: UnboundedReceiver<UiCommand>,
    }

    impl Harness {
        fn new() -> Self {
            let cfg = RunConfig::default();
            let (config_tx, config_rx) = watch::channel(cfg.clone());
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            Self {
                state: UiState::new(&cfg, false),
                config_tx,
                config_rx,
                cmd_tx,
                cmd_rx,
            }
        }

        fn press(&mut self, code: KeyCode) -> bool {
            self.press_mod(code, KeyModifiers::NONE)
        }

        fn press_mod(&mut self, code: KeyCode, mods: KeyModifiers) -> bool {
            handle_key(
                &mut self.state,
                KeyEvent::new(code, mods),
                &self.config_tx,
                &self.cmd_tx,
            )
        }

        fn type_str(&mut self, s: &str) {
            for ch in s.chars() {
                self.press(KeyCode::Char(ch));
            }
        }
    }

    #[test]
    fn typing_publishes_the_form() {
        let mut h = Harness::new();
        h.type_str("hi");
        assert_eq!(h.config_rx.borrow().message, "hi");

        h.press(KeyCode::Down);
        h.press(KeyCode::Backspace);
        h.press(KeyCode::Backspace);
        h.type_str("3");
        assert_eq!(h.config_rx.borrow().repeat_count, 3);
    }

    #[test]
    fn unparsable_field_keeps_last_good_config() {
        let mut h = Harness::new();
        h.press(KeyCode::Down);
        h.press(KeyCode::Backspace);
        assert_eq!(h.config_rx.borrow().repeat_count, 1);
        h.press(KeyCode::Backspace);
        assert_eq!(h.config_rx.borrow().repeat_count, 1);
        assert!(h.state.info.contains("Times to send"));
    }

    #[test]
    fn enter_starts_with_the_current_form() {
        let mut h = Harness::new();
        h.type_str("go");
        h.press(KeyCode::Enter);
        assert_eq!(h.cmd_rx.try_recv().ok(), Some(UiCommand::Start));
        assert_eq!(h.config_rx.borrow().message, "go");
    }

    #[test]
    fn enter_clears_the_log_before_starting() {
        let mut h = Harness::new();
        h.state.push_log("previous run");
        h.type_str("go");
        h.press(KeyCode::Enter);
        assert!(h.state.log.is_empty());
        assert_eq!(h.cmd_rx.try_recv().ok(), Some(UiCommand::Start));
    }

    #[test]
    fn enter_with_bad_numbers_does_not_start() {
        let mut h = Harness::new();
        h.state.form.delay = "abc".into();
        h.press(KeyCode::Enter);
        assert!(h.cmd_rx.try_recv().is_err());
        assert!(h.state.log[0].ends_with("Validation: Delay (s) must be a number (got 'abc')."));
    }

    #[test]
    fn form_is_locked_during_a_run() {
        let mut h = Harness::new();
        h.state.apply_event(UiEvent::State(RunState::Running));
        h.type_str("x");
        assert_eq!(h.state.form.message, "");

        h.press(KeyCode::Enter);
        assert!(h.cmd_rx.try_recv().is_err());
        assert_eq!(h.state.info, "A run is already in progress.");

        h.press(KeyCode::Esc);
        assert_eq!(h.cmd_rx.try_recv().ok(), Some(UiCommand::Stop));
    }

    #[test]
    fn control_keys_map_to_commands() {
        let mut h = Harness::new();
        assert!(!h.press_mod(KeyCode::Char('t'), KeyModifiers::CONTROL));
        assert_eq!(h.cmd_rx.try_recv().ok(), Some(UiCommand::QuickTest));
        // Control chords never reach the form.
        assert_eq!(h.state.form.message, "");

        h.state.push_log("something");
        h.press_mod(KeyCode::Char('l'), KeyModifiers::CONTROL);
        assert!(h.state.log.is_empty());

        h.press(KeyCode::F(1));
        assert_eq!(h.state.tab, 1);

        assert!(h.press_mod(KeyCode::Char('q'), KeyModifiers::CONTROL));
        assert_eq!(h.cmd_rx.try_recv().ok(), Some(UiCommand::Quit));
    }

    #[test]
    fn draws_without_panicking() {
        use ratatui::backend::TestBackend;

        let mut state = UiState::new(&RunConfig::default(), true);
        state.push_log("hello");
        state.apply_event(UiEvent::Progress { sent: 2, total: 4 });
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f.area(), f, &state)).unwrap();
        state.tab = 1;
        terminal.draw(|f| draw(f.area(), f, &state)).unwrap();
    }
}
