use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::*;

use crate::ui::AppState;

const SPINNER: [&str; 6] = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"];

pub fn toast_tag(level: crate::ui::ToastLevel) -> &'static str {
    match level {
        crate::ui::ToastLevel::Success => "[OK]",
        crate::ui::ToastLevel::Error => "[ERROR]",
        crate::ui::ToastLevel::Info => "[INFO]",
    }
}

/// One-line footer: busy spinner, active toast, then the page's key help.
pub fn draw_footer_combined(f: &mut Frame, area: Rect, state: &AppState, help_text: &str) {
    let mut spans: Vec<Span> = Vec::new();
    if let Some(msg) = state.current_page().and_then(|p| p.status_text()) {
        let spinner = SPINNER[state.tick as usize % SPINNER.len()];
        spans.push(Span::raw(format!(" {spinner} {msg}")));
        spans.push(Span::raw("  |  "));
    }
    if let Some(t) = &state.toast {
        let color = state.theme.toast_color(t.level);
        spans.push(Span::styled(
            format!("{} ", toast_tag(t.level)),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!("{}  |  ", t.text),
            Style::default().fg(color),
        ));
    }
    if let Some(page) = state.current_page() {
        if page.captures_input() {
            spans.push(Span::styled(
                "editing  |  ",
                Style::default().fg(state.theme.warning),
            ));
        }
    }
    spans.push(Span::styled(
        help_text.to_string(),
        Style::default().fg(state.theme.muted),
    ));
    let p = Paragraph::new(Line::from(spans));
    f.render_widget(p, area);
}
