use crate::widgets::chrome::panel_block;
use ratatui::prelude::*;
use ratatui::widgets::*;

/// Rows rendered with a header line and a highlighted cursor row.
pub struct TableView<'a> {
    pub title: &'a str,
    pub headers: &'a [&'a str],
    pub widths: &'a [Constraint],
    pub rows: Vec<Vec<String>>,
    pub cursor: Option<usize>,
    pub empty_text: &'a str,
}

impl TableView<'_> {
    pub fn draw(self, f: &mut Frame, area: Rect, focused: bool) {
        let block = panel_block(self.title, focused);
        if self.rows.is_empty() {
            let p = Paragraph::new(Line::from(Span::styled(
                self.empty_text.to_string(),
                crate::theme::text_muted(),
            )))
            .block(block);
            f.render_widget(p, area);
            return;
        }
        let header = Row::new(
            self.headers
                .iter()
                .map(|h| Cell::from(h.to_string()))
                .collect::<Vec<_>>(),
        )
        .style(crate::theme::text_active_bold());
        let rows: Vec<Row> = self
            .rows
            .into_iter()
            .map(|r| Row::new(r.into_iter().map(Cell::from).collect::<Vec<_>>()))
            .collect();
        let table = Table::new(rows, self.widths.to_vec())
            .header(header)
            .block(block)
            .column_spacing(1)
            .row_highlight_style(crate::theme::list_cursor_style())
            .highlight_symbol("› ");
        let mut ts = TableState::default();
        ts.select(self.cursor);
        f.render_stateful_widget(table, area, &mut ts);
    }
}

/// Move a list cursor by `delta`, clamped to `len`.
pub fn step_cursor(cursor: usize, delta: i32, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = cursor as i64 + delta as i64;
    next.clamp(0, len as i64 - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    #[test]
    fn step_cursor_clamps() {
        assert_eq!(step_cursor(0, -1, 3), 0);
        assert_eq!(step_cursor(1, 1, 3), 2);
        assert_eq!(step_cursor(2, 10, 3), 2);
        assert_eq!(step_cursor(5, 1, 0), 0);
    }

    #[test]
    fn empty_table_shows_placeholder() {
        let backend = TestBackend::new(30, 4);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal
            .draw(|f| {
                TableView {
                    title: "Valves",
                    headers: &["Name"],
                    widths: &[Constraint::Fill(1)],
                    rows: Vec::new(),
                    cursor: None,
                    empty_text: "No valves found",
                }
                .draw(f, f.area(), false)
            })
            .unwrap();
        let buf = terminal.backend().buffer().clone();
        let line: String = (1..29).map(|x| buf[(x, 1)].symbol()).collect();
        assert_eq!(line.trim_end(), "No valves found");
    }
}
