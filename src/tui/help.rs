use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use std::path::Path;

fn key_line(key: &'static str, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(format!("{:width$}{what}", "", width = 14usize.saturating_sub(key.chars().count()))),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame, log_path: Option<&Path>) {
    let mut lines = vec![
        Line::from("Keybinds:"),
        key_line("q / Ctrl-C", "Quit (running jobs are stopped)"),
        key_line("tab", "Next tab"),
        key_line("shift-tab", "Previous tab"),
        Line::from(""),
        Line::from("Training / Inference tabs:"),
        key_line("↑/↓", "Move between fields"),
        key_line("type", "Edit the focused text field"),
        key_line("Ctrl-U", "Clear the focused text field"),
        key_line("←/→", "Change model type"),
        key_line("space", "Toggle checkbox"),
        key_line("enter", "Next field, or run on the button row"),
        key_line("Ctrl-R", "Run from any field"),
        Line::from(""),
        Line::from("Jobs tab:"),
        key_line("↑/↓", "Select job"),
        key_line("PgUp/PgDn", "Scroll output"),
        key_line("o", "Open output folder"),
        key_line("x", "Cancel job"),
        key_line("w", "Close view (job keeps running)"),
        key_line("y", "Copy command line to clipboard"),
        Line::from(""),
        Line::from("Models tab:"),
        key_line("r", "Fetch the model list"),
        key_line("↑/↓", "Select link"),
        key_line("enter", "Open link in browser"),
    ];

    if let Some(p) = log_path {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Log file: ", Style::default().fg(Color::Gray)),
            Span::styled(p.display().to_string(), Style::default().fg(Color::Cyan)),
        ]));
    }

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
