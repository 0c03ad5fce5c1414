use crate::app::Effect;
use crate::model::PageId;
use crate::pages::{toast, Page, PageMsg};
use crate::ui::ToastLevel;
use crate::widgets::chrome::panel_block;
use crossterm::event::KeyCode;
use ratatui::prelude::*;
use ratatui::widgets::*;

pub struct Section {
    pub title: &'static str,
    pub description: &'static str,
    pub target: Option<PageId>,
}

pub static SECTIONS: [Section; 4] = [
    Section {
        title: "Core",
        description: "Access essential features like the dashboard and profile settings.",
        target: None,
    },
    Section {
        title: "Operations",
        description: "Manage complaints, blue brigade, running contracts, valves, area, and flows.",
        target: Some(PageId::Valves),
    },
    Section {
        title: "Admin",
        description: "Handle user management tasks, including roles and permissions.",
        target: None,
    },
    Section {
        title: "E-Tap",
        description: "Access E-Tap portal, connection, and conversion features.",
        target: Some(PageId::Conversions),
    },
];

pub struct DashboardPage {
    header: String,
    pub selected: usize,
}

impl DashboardPage {
    pub fn new(header: &str) -> Self {
        Self {
            header: header.to_string(),
            selected: 0,
        }
    }
}

impl Page for DashboardPage {
    fn id(&self) -> PageId {
        PageId::Dashboard
    }

    fn update(&mut self, msg: PageMsg) -> Vec<Effect> {
        let PageMsg::Key(key) = msg else {
            return Vec::new();
        };
        match key {
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => self.selected = (self.selected + 1).min(SECTIONS.len() - 1),
            KeyCode::Enter => {
                let section = &SECTIONS[self.selected];
                return match section.target {
                    Some(page) => vec![Effect::SwitchPage(page)],
                    None => vec![toast(
                        format!("{} is managed from the web console.", section.title),
                        ToastLevel::Info,
                    )],
                };
            }
            _ => {}
        }
        Vec::new()
    }

    fn render(&self, f: &mut Frame, area: Rect, _tick: u64) {
        let mut lines: Vec<Line> = vec![
            Line::from(Span::styled(
                format!("{} Dashboard", self.header),
                crate::theme::text_active_bold(),
            )),
            Line::from(
                "Welcome to the Kerala Water Authority Dashboard. Explore different sections \
                 to manage and monitor water-related operations and administration.",
            ),
            Line::from(""),
        ];
        for (i, s) in SECTIONS.iter().enumerate() {
            let sel = if i == self.selected { '›' } else { ' ' };
            let title_style = if i == self.selected {
                crate::theme::list_cursor_style()
            } else {
                crate::theme::text_active_bold()
            };
            let mut title = vec![
                Span::raw(format!("{sel} ")),
                Span::styled(s.title, title_style),
            ];
            if let Some(target) = s.target {
                title.push(Span::styled(
                    format!("  → {}", target.title()),
                    crate::theme::text_muted(),
                ));
            }
            lines.push(Line::from(title));
            lines.push(Line::from(Span::styled(
                format!("    {}", s.description),
                crate::theme::text_muted(),
            )));
            lines.push(Line::from(""));
        }
        let p = Paragraph::new(lines)
            .block(panel_block("Dashboard", true))
            .wrap(Wrap { trim: false });
        f.render_widget(p, area);
    }

    fn help_text(&self) -> String {
        "↑/↓ select • Enter open section".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_switches_to_linked_page() {
        let mut p = DashboardPage::new("KWA");
        p.update(PageMsg::Key(KeyCode::Down));
        let effs = p.update(PageMsg::Key(KeyCode::Enter));
        assert!(matches!(effs.as_slice(), [Effect::SwitchPage(PageId::Valves)]));
        for _ in 0..5 {
            p.update(PageMsg::Key(KeyCode::Down));
        }
        assert_eq!(p.selected, 3);
        let effs = p.update(PageMsg::Key(KeyCode::Enter));
        assert!(matches!(effs.as_slice(), [Effect::SwitchPage(PageId::Conversions)]));
    }

    #[test]
    fn unlinked_section_shows_info() {
        let mut p = DashboardPage::new("KWA");
        let effs = p.update(PageMsg::Key(KeyCode::Enter));
        assert!(matches!(
            effs.as_slice(),
            [Effect::ShowToast {
                level: ToastLevel::Info,
                ..
            }]
        ));
    }
}
