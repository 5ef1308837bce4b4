use anyhow::Error;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

/// Carve out a rectangle centered within `area`, sized by percentages.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// Extract the most relevant error message from a chained error.
pub(crate) fn surface_error(err: &Error) -> String {
    err.chain()
        .last()
        .map(|cause| cause.to_string())
        .unwrap_or_else(|| err.to_string())
}

/// Green when plenty is left, yellow for the last copy, red when none are.
pub(crate) fn availability_style(available: i64, total: i64) -> Style {
    if available <= 0 {
        Style::default().fg(Color::Red)
    } else if available == 1 && total > 1 {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Green)
    }
}

/// `[key] action` pairs for the footer.
pub(crate) fn key_hints(pairs: &[(&str, &str)]) -> Vec<Span<'static>> {
    let key_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let mut spans = Vec::with_capacity(pairs.len() * 2);
    for (idx, (key, action)) in pairs.iter().enumerate() {
        spans.push(Span::styled(format!("[{key}]"), key_style));
        let gap = if idx + 1 == pairs.len() { "" } else { "   " };
        spans.push(Span::raw(format!(" {action}{gap}")));
    }
    spans
}
