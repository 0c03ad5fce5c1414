use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Tabs};

use crate::ui::AppState;

/// Page strip across the top: `[F1] Dashboard │ [F2] Add Valve …`.
pub fn draw_page_tabs(f: &mut Frame, area: Rect, state: &AppState) {
    let theme = &state.theme;
    let current_index = state.tab_index;

    let titles: Vec<Line> = state
        .config
        .pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            let is_selected = i == current_index;
            let text_style = if is_selected {
                Style::default()
                    .fg(theme.selected)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.muted)
            };
            let key_style = if is_selected {
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.muted)
            };
            Line::from(vec![
                Span::styled("[", Style::default().fg(theme.frame)),
                Span::styled(format!("F{}", i + 1), key_style),
                Span::styled("]", Style::default().fg(theme.frame)),
                Span::raw(" "),
                Span::styled(page.title(), text_style),
            ])
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(current_index)
        .style(Style::default().fg(theme.fg))
        .highlight_style(
            Style::default()
                .fg(theme.selected)
                .add_modifier(Modifier::BOLD),
        )
        .divider(Span::styled(" │ ", Style::default().fg(theme.frame)));

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(theme.frame))
        .title(Span::styled(
            state.config.header.clone(),
            theme.header_style(),
        ));

    f.render_widget(tabs.block(block), area);
}

/// Map F1..Fn to a page index. Returns None when the key has no page or the
/// page is already showing.
pub fn handle_function_key(state: &AppState, key_num: u8) -> Option<usize> {
    let index = (key_num as usize).checked_sub(1)?;
    if index >= state.config.pages.len() || index == state.tab_index {
        return None;
    }
    Some(index)
}
