use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn key_line(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line("Enter", 9, "Start (countdown, then typing)"),
        key_line("Esc", 11, "Stop the countdown or the running send loop"),
        key_line("Ctrl-T", 8, "Quick test: type a short string once after 3 s"),
        key_line("Ctrl-L", 8, "Clear the log"),
        key_line("Ctrl-Y", 8, "Copy the log to the clipboard"),
        key_line("F1", 12, "Toggle this help"),
        key_line("Ctrl-C/Q", 6, "Quit (stops a running send first)"),
        Line::from(""),
        Line::from("Form:"),
        key_line("↑/↓", 11, "Move between fields"),
        key_line("Space", 9, "Toggle auto delay (on the checkbox)"),
        key_line("Backspace", 5, "Delete the last character"),
        Line::from(""),
        Line::from("Safety:"),
        Line::from(vec![
            Span::raw("  Move the mouse to the "),
            Span::styled("top-left corner", Style::default().fg(Color::Red)),
            Span::raw(" of the screen to abort a run immediately."),
        ]),
        Line::from("  Test in a safe input field first. Typing goes to whatever window has focus."),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
