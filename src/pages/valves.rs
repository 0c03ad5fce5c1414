use crate::app::Effect;
use crate::listing::{FilterMode, ListView, ValveCriteria};
use crate::model::PageId;
use crate::pages::add_valve::BOUND_ERROR;
use crate::pages::{toast, Page, PageMsg};
use crate::permissions::{Action, Capabilities};
use crate::records::{Valve, ValveLog};
use crate::services::api_client::ApiError;
use crate::services::export::{log_sentence, ExportFormat};
use crate::services::loader::{ApiRequest, Loaded, RequestKind};
use crate::ui::ToastLevel;
use crate::widgets::chrome::{centered_rect, panel_block};
use crate::widgets::form::{FormField, FormState};
use crate::widgets::form_widget::{FormEvent, FormWidget};
use crate::widgets::table::{step_cursor, TableView};
use crossterm::event::KeyCode;
use ratatui::prelude::*;
use ratatui::widgets::*;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, warn};

const LOG_PREVIEW: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchField {
    Name,
    Area,
}

pub enum Modal {
    None,
    Details { id: i64 },
    Edit { id: i64, form: FormWidget, error: Option<String> },
    ConfirmDelete { id: i64, name: String },
    Logs { valve_id: i64, logs: Vec<ValveLog>, show_all: bool, scroll: usize },
}

pub struct ValvesPage {
    pub list: ListView<Valve>,
    pub criteria: ValveCriteria,
    pub cursor: usize,
    pub caps: Capabilities,
    pub modal: Modal,
    pub search: Option<SearchField>,
    pub busy: bool,
    pub load_error: Option<String>,
    opened: bool,
}

fn edit_form(v: &Valve) -> FormState {
    FormState::new(
        format!("Edit {}", v.name),
        vec![
            FormField::number(
                "current_condition",
                "Current Condition",
                Some("0"),
                Some(&v.full_open_condition.to_string()),
                "0.1",
            )
            .with_value(v.current_condition.to_string()),
            FormField::text("remarks", "Remarks").with_value(v.remarks.clone()),
        ],
    )
}

/// Live check while typing: only a parsable value above full-open is an error.
fn edit_error(current: &str, full_open: f64) -> Option<String> {
    match current.parse::<f64>() {
        Ok(c) if !current.is_empty() && c > full_open => Some(BOUND_ERROR.to_string()),
        _ => None,
    }
}

/// Body for PUT /valve/valves/:id/ with the edited condition and remarks.
pub fn update_payload(v: &Valve, current: f64, remarks: &str) -> Map<String, JsonValue> {
    let mut m = Map::new();
    m.insert("name".into(), json!(v.name));
    m.insert("size".into(), json!(v.size));
    m.insert("full_open_condition".into(), json!(v.full_open_condition));
    m.insert("current_condition".into(), json!(current));
    m.insert("mid_point".into(), json!(v.mid_point));
    m.insert("steepness".into(), json!(v.steepness));
    m.insert("remarks".into(), json!(remarks));
    m.insert("latitude".into(), json!(v.latitude));
    m.insert("longitude".into(), json!(v.longitude));
    m.insert("area_id".into(), json!(v.area.as_ref().map(|a| a.id)));
    m
}

fn opening_bar(pct: f64) -> String {
    let filled = ((pct / 10.0).round() as usize).min(10);
    format!("{:>5.1}% {}{}", pct, "█".repeat(filled), "░".repeat(10 - filled))
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

impl ValvesPage {
    pub fn new(use_api_filtering: bool) -> Self {
        Self {
            list: ListView::new(FilterMode::from_flag(use_api_filtering), None),
            criteria: ValveCriteria::default(),
            cursor: 0,
            caps: Capabilities::default(),
            modal: Modal::None,
            search: None,
            busy: false,
            load_error: None,
            opened: false,
        }
    }

    pub fn selected(&self) -> Option<&Valve> {
        self.list.visible().get(self.cursor)
    }

    fn api(request: ApiRequest) -> Effect {
        Effect::Api {
            page: PageId::Valves,
            request,
        }
    }

    fn fetch(&mut self) -> Vec<Effect> {
        let (token, query) = self.list.begin_fetch(&self.criteria);
        debug!(token, ?query, "fetching valves");
        vec![Self::api(ApiRequest::Valves { token, query })]
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.list.visible().len().saturating_sub(1));
    }

    fn criteria_changed(&mut self) -> Vec<Effect> {
        match self.list.mode {
            FilterMode::Server => self.fetch(),
            FilterMode::Client => {
                self.list.refilter(&self.criteria);
                self.clamp_cursor();
                Vec::new()
            }
        }
    }

    fn open_logs(&mut self, id: i64) -> Vec<Effect> {
        if self.busy {
            return Vec::new();
        }
        self.busy = true;
        vec![Self::api(ApiRequest::ValveLogs(id))]
    }

    fn begin_edit(&mut self, id: i64) -> Vec<Effect> {
        if let Err(msg) = self.caps.check(Action::Edit, "valves") {
            return vec![toast(msg, ToastLevel::Error)];
        }
        let Some(v) = self.list.find(id) else {
            return Vec::new();
        };
        self.modal = Modal::Edit {
            id,
            form: FormWidget::new(edit_form(v)),
            error: None,
        };
        Vec::new()
    }

    fn begin_delete(&mut self, id: i64) -> Vec<Effect> {
        if let Err(msg) = self.caps.check(Action::Delete, "valves") {
            return vec![toast(msg, ToastLevel::Error)];
        }
        let Some(v) = self.list.find(id) else {
            return Vec::new();
        };
        self.modal = Modal::ConfirmDelete {
            id,
            name: v.name.clone(),
        };
        Vec::new()
    }

    fn show_map(&self, id: i64) -> Vec<Effect> {
        match self.list.find(id).and_then(|v| v.map_url()) {
            Some(url) => vec![Effect::CopyToClipboard {
                text: url,
                what: "Map link".into(),
            }],
            None => vec![toast("No location data available for this valve.", ToastLevel::Error)],
        }
    }

    fn submit_edit(&mut self) -> Vec<Effect> {
        let Modal::Edit { id, form, error } = &mut self.modal else {
            return Vec::new();
        };
        if self.busy {
            return Vec::new();
        }
        let Some(v) = self.list.find(*id) else {
            return Vec::new();
        };
        // Earlier messages (including a failed save) are re-judged from the current input
        let Ok(current) = form.form.text("current_condition").parse::<f64>() else {
            *error = Some("Current condition must be a valid number.".into());
            return Vec::new();
        };
        if current > v.full_open_condition {
            *error = Some(BOUND_ERROR.into());
            return Vec::new();
        }
        *error = None;
        let payload = update_payload(v, current, form.form.text("remarks"));
        let id = *id;
        form.form.disabled = true;
        self.busy = true;
        vec![Self::api(ApiRequest::UpdateValve { id, payload })]
    }

    fn on_edit_key(&mut self, key: KeyCode) -> Vec<Effect> {
        let Modal::Edit { id, form, error } = &mut self.modal else {
            return Vec::new();
        };
        let id = *id;
        match form.on_key(key) {
            FormEvent::Changed { id: field, value } if field == "current_condition" => {
                let full = self.list.find(id).map(|v| v.full_open_condition).unwrap_or(f64::MAX);
                *error = edit_error(value.as_text(), full);
                Vec::new()
            }
            FormEvent::Submit => self.submit_edit(),
            FormEvent::Cancel if !self.busy => {
                self.modal = Modal::Details { id };
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_search_key(&mut self, field: SearchField, key: KeyCode) -> Vec<Effect> {
        let target = match field {
            SearchField::Name => &mut self.criteria.name,
            SearchField::Area => &mut self.criteria.area,
        };
        match key {
            KeyCode::Char(c) => {
                target.push(c);
                self.criteria_changed()
            }
            KeyCode::Backspace => {
                if target.pop().is_some() {
                    self.criteria_changed()
                } else {
                    Vec::new()
                }
            }
            KeyCode::Enter | KeyCode::Esc => {
                self.search = None;
                Vec::new()
            }
            KeyCode::Tab => {
                self.search = Some(match field {
                    SearchField::Name => SearchField::Area,
                    SearchField::Area => SearchField::Name,
                });
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_table_key(&mut self, key: KeyCode) -> Vec<Effect> {
        let len = self.list.visible().len();
        let selected = self.selected().map(|v| v.id);
        match key {
            KeyCode::Up => self.cursor = step_cursor(self.cursor, -1, len),
            KeyCode::Down => self.cursor = step_cursor(self.cursor, 1, len),
            KeyCode::PageUp => self.cursor = step_cursor(self.cursor, -10, len),
            KeyCode::PageDown => self.cursor = step_cursor(self.cursor, 10, len),
            KeyCode::Char('/') => self.search = Some(SearchField::Name),
            KeyCode::Char('a') => self.search = Some(SearchField::Area),
            KeyCode::Char('c') => {
                self.criteria = ValveCriteria::default();
                return self.criteria_changed();
            }
            KeyCode::Char('m') => {
                self.list.mode = match self.list.mode {
                    FilterMode::Server => FilterMode::Client,
                    FilterMode::Client => FilterMode::Server,
                };
                return self.fetch();
            }
            KeyCode::Char('r') => return self.fetch(),
            KeyCode::Enter => {
                if let Some(id) = selected {
                    self.modal = Modal::Details { id };
                }
            }
            KeyCode::Char('e') => return selected.map(|id| self.begin_edit(id)).unwrap_or_default(),
            KeyCode::Char('d') => return selected.map(|id| self.begin_delete(id)).unwrap_or_default(),
            KeyCode::Char('l') => return selected.map(|id| self.open_logs(id)).unwrap_or_default(),
            KeyCode::Char('g') => return selected.map(|id| self.show_map(id)).unwrap_or_default(),
            _ => {}
        }
        Vec::new()
    }

    fn on_key(&mut self, key: KeyCode) -> Vec<Effect> {
        match &mut self.modal {
            Modal::None => match self.search {
                Some(field) => self.on_search_key(field, key),
                None => self.on_table_key(key),
            },
            Modal::Details { id } => {
                let id = *id;
                match key {
                    KeyCode::Esc => {
                        self.modal = Modal::None;
                        Vec::new()
                    }
                    KeyCode::Char('e') => self.begin_edit(id),
                    KeyCode::Char('d') => self.begin_delete(id),
                    KeyCode::Char('l') => self.open_logs(id),
                    KeyCode::Char('g') => self.show_map(id),
                    _ => Vec::new(),
                }
            }
            Modal::Edit { .. } => self.on_edit_key(key),
            Modal::ConfirmDelete { id, .. } => {
                let id = *id;
                match key {
                    KeyCode::Char('y') | KeyCode::Char('Y') => {
                        // Re-check at dispatch time
                        if let Err(msg) = self.caps.check(Action::Delete, "valves") {
                            self.modal = Modal::None;
                            return vec![toast(msg, ToastLevel::Error)];
                        }
                        if self.busy {
                            return Vec::new();
                        }
                        self.busy = true;
                        vec![Self::api(ApiRequest::DeleteValve(id))]
                    }
                    KeyCode::Char('n') | KeyCode::Esc if !self.busy => {
                        self.modal = Modal::None;
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
            Modal::Logs {
                logs,
                show_all,
                scroll,
                ..
            } => match key {
                KeyCode::Esc => {
                    self.modal = Modal::None;
                    Vec::new()
                }
                KeyCode::Char('a') if logs.len() > LOG_PREVIEW => {
                    *show_all = !*show_all;
                    *scroll = 0;
                    Vec::new()
                }
                KeyCode::Up => {
                    *scroll = scroll.saturating_sub(1);
                    Vec::new()
                }
                KeyCode::Down => {
                    *scroll = (*scroll + 1).min(logs.len().saturating_sub(1));
                    Vec::new()
                }
                KeyCode::Char('x') => vec![Effect::ExportLogs {
                    format: ExportFormat::Xlsx,
                    logs: logs.clone(),
                }],
                KeyCode::Char('p') => vec![Effect::ExportLogs {
                    format: ExportFormat::Pdf,
                    logs: logs.clone(),
                }],
                _ => Vec::new(),
            },
        }
    }

    fn on_loaded(
        &mut self,
        kind: RequestKind,
        token: Option<u64>,
        outcome: Result<Loaded, ApiError>,
    ) -> Vec<Effect> {
        match outcome {
            Ok(Loaded::Capabilities(caps)) => {
                self.caps = caps;
                Vec::new()
            }
            Ok(Loaded::Valves { token, items }) => {
                if self.list.accept(token, items, &self.criteria) {
                    self.load_error = None;
                    self.clamp_cursor();
                } else {
                    debug!(token, "dropped stale valve list");
                }
                Vec::new()
            }
            Ok(Loaded::ValveSaved(v)) => {
                self.busy = false;
                let id = v.id;
                self.list.replace_by_id(v);
                self.modal = Modal::Details { id };
                let mut effs = vec![toast("Valve updated successfully!", ToastLevel::Success)];
                effs.extend(self.open_logs(id));
                effs
            }
            Ok(Loaded::ValveDeleted(id)) => {
                self.busy = false;
                self.list.remove_by_id(id);
                self.clamp_cursor();
                self.modal = Modal::None;
                vec![toast("Valve deleted successfully!", ToastLevel::Success)]
            }
            Ok(Loaded::Logs { valve_id, logs }) => {
                self.busy = false;
                self.modal = Modal::Logs {
                    valve_id,
                    logs,
                    show_all: false,
                    scroll: 0,
                };
                Vec::new()
            }
            Ok(_) => Vec::new(),
            Err(e) => self.on_failed(kind, token, e),
        }
    }

    fn on_failed(&mut self, kind: RequestKind, token: Option<u64>, e: ApiError) -> Vec<Effect> {
        warn!(?kind, error = %e, "valves request failed");
        match kind {
            RequestKind::Capabilities => {
                // No permissions known: act as a read-only user
                self.caps = Capabilities {
                    loaded: true,
                    ..Capabilities::default()
                };
                Vec::new()
            }
            RequestKind::Valves => {
                if !token.map(|t| self.list.fail(t)).unwrap_or(false) {
                    return Vec::new();
                }
                let msg = e.user_message("Failed to fetch valves.");
                self.load_error = Some(msg.clone());
                vec![toast(msg, ToastLevel::Error)]
            }
            RequestKind::UpdateValve => {
                self.busy = false;
                if let Modal::Edit { form, error, .. } = &mut self.modal {
                    form.form.disabled = false;
                    *error = Some(e.user_message("Failed to update valve."));
                }
                Vec::new()
            }
            RequestKind::DeleteValve => {
                self.busy = false;
                self.modal = Modal::None;
                vec![toast(e.user_message("Failed to delete valve."), ToastLevel::Error)]
            }
            RequestKind::ValveLogs => {
                self.busy = false;
                vec![toast(e.user_message("Failed to fetch logs."), ToastLevel::Error)]
            }
            _ => Vec::new(),
        }
    }

    fn draw_filters(&self, f: &mut Frame, area: Rect, tick: u64) {
        let field = |label: &str, value: &str, which: SearchField| -> Vec<Span<'static>> {
            let active = self.search == Some(which);
            let mut v = value.to_string();
            if active && tick % 2 == 0 {
                v.push('▏');
            }
            let style = if active {
                crate::theme::text_editing_bold()
            } else {
                Style::default()
            };
            vec![
                Span::styled(format!("{label}: "), crate::theme::text_muted()),
                Span::styled(format!("[{v}]"), style),
                Span::raw("  "),
            ]
        };
        let mut spans = field("Name", &self.criteria.name, SearchField::Name);
        spans.extend(field("Area", &self.criteria.area, SearchField::Area));
        spans.push(Span::styled(
            format!("filter: {}", self.list.mode.label()),
            crate::theme::text_muted(),
        ));
        let mut lines = vec![Line::from(spans)];
        if let Some(err) = &self.load_error {
            lines.push(Line::from(Span::styled(err.clone(), crate::theme::text_error())));
        }
        f.render_widget(Paragraph::new(lines), area);
    }

    fn draw_details(&self, f: &mut Frame, area: Rect, id: i64) {
        let Some(v) = self.list.find(id) else {
            return;
        };
        let row = |k: &str, val: String| {
            Line::from(vec![
                Span::styled(format!("{k}: "), crate::theme::text_active_bold()),
                Span::raw(val),
            ])
        };
        let mut lines = vec![
            row("Name", v.name.clone()),
            row("Size", v.size.clone()),
            row("Full Open Condition", v.full_open_condition.to_string()),
            row("Current Condition", v.current_condition.to_string()),
            row("Opening", opening_bar(v.opening_percentage())),
            row("Remarks", v.remarks.clone()),
            row(
                "Previous Position",
                v.previous_position
                    .clone()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "No Previous Position".into()),
            ),
            row("Area", v.area_name().to_string()),
            row(
                "Area Image",
                v.area_image.clone().unwrap_or_else(|| "No Image".into()),
            ),
            row(
                "Location",
                v.map_url().unwrap_or_else(|| "No location data".into()),
            ),
            Line::from(""),
        ];
        let mut keys = Vec::new();
        if self.caps.can_edit {
            keys.push("e edit");
        }
        if self.caps.can_delete {
            keys.push("d delete");
        }
        keys.extend(["l view log", "g copy map link", "Esc close"]);
        lines.push(Line::from(Span::styled(keys.join(" • "), crate::theme::text_muted())));
        let p = Paragraph::new(lines)
            .block(panel_block("Valve Details", true))
            .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(p, area);
    }

    fn draw_edit(&self, f: &mut Frame, area: Rect, form: &FormWidget, error: Option<&str>, tick: u64) {
        f.render_widget(Clear, area);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(error.is_some() as u16), Constraint::Min(3)])
            .split(area);
        if let Some(err) = error {
            f.render_widget(
                Paragraph::new(Span::styled(err.to_string(), crate::theme::text_error())),
                chunks[0],
            );
        }
        form.render(f, chunks[1], true, tick);
    }

    fn draw_logs(
        &self,
        f: &mut Frame,
        area: Rect,
        valve_id: i64,
        logs: &[ValveLog],
        show_all: bool,
        scroll: usize,
    ) {
        let shown: Vec<&ValveLog> = if show_all {
            logs.iter().collect()
        } else {
            logs.iter().take(LOG_PREVIEW).collect()
        };
        let mut lines: Vec<Line> = if shown.is_empty() {
            vec![Line::from(Span::styled("No logs recorded.", crate::theme::text_muted()))]
        } else {
            shown
                .iter()
                .skip(scroll)
                .map(|l| Line::from(format!("• {}", log_sentence(l))))
                .collect()
        };
        lines.push(Line::from(""));
        let mut keys = Vec::new();
        if logs.len() > LOG_PREVIEW {
            keys.push(if show_all { "a show less" } else { "a read more" });
        }
        keys.extend(["x Excel", "p PDF", "Esc close"]);
        lines.push(Line::from(Span::styled(keys.join(" • "), crate::theme::text_muted())));
        let title = match self.list.find(valve_id) {
            Some(v) => format!("Update Logs: {}", v.name),
            None => "Update Logs".to_string(),
        };
        let p = Paragraph::new(lines)
            .block(panel_block(&title, true))
            .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(p, area);
    }

    fn draw_confirm(&self, f: &mut Frame, area: Rect, name: &str) {
        let lines = vec![
            Line::from(format!("Are you sure you want to delete valve '{name}'?")),
            Line::from(""),
            Line::from(Span::styled("y confirm • n cancel", crate::theme::text_muted())),
        ];
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(lines)
                .block(panel_block("Delete Valve", true))
                .wrap(Wrap { trim: false }),
            area,
        );
    }
}

impl Page for ValvesPage {
    fn id(&self) -> PageId {
        PageId::Valves
    }

    fn update(&mut self, msg: PageMsg) -> Vec<Effect> {
        match msg {
            PageMsg::Open => {
                if self.opened {
                    return Vec::new();
                }
                self.opened = true;
                let mut effs: Vec<Effect> = self
                    .id()
                    .permission_page()
                    .map(|page| Self::api(ApiRequest::Capabilities { page }))
                    .into_iter()
                    .collect();
                effs.extend(self.fetch());
                effs
            }
            PageMsg::Key(key) => self.on_key(key),
            PageMsg::Loaded {
                kind,
                token,
                outcome,
            } => self.on_loaded(kind, token, outcome),
        }
    }

    fn render(&self, f: &mut Frame, area: Rect, tick: u64) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1 + self.load_error.is_some() as u16),
                Constraint::Min(3),
            ])
            .split(area);
        self.draw_filters(f, chunks[0], tick);
        let rows: Vec<Vec<String>> = self
            .list
            .visible()
            .iter()
            .map(|v| {
                vec![
                    v.name.clone(),
                    v.size.clone(),
                    v.full_open_condition.to_string(),
                    v.current_condition.to_string(),
                    fmt_opt(v.mid_point),
                    fmt_opt(v.steepness),
                    v.area_name().to_string(),
                    opening_bar(v.opening_percentage()),
                    if v.map_url().is_some() { "map" } else { "-" }.to_string(),
                ]
            })
            .collect();
        let title = format!(
            "Valve List ({} of {})",
            self.list.visible().len(),
            self.list.all().len()
        );
        let empty = if self.list.loading {
            "Loading valves..."
        } else {
            "No valves found."
        };
        TableView {
            title: &title,
            headers: &["Name", "Size", "Full Open", "Current", "Mid", "Steep", "Area", "Opening %", "Loc"],
            widths: &[
                Constraint::Fill(2),
                Constraint::Length(8),
                Constraint::Length(9),
                Constraint::Length(8),
                Constraint::Length(5),
                Constraint::Length(6),
                Constraint::Fill(1),
                Constraint::Length(18),
                Constraint::Length(4),
            ],
            rows,
            cursor: (!self.list.visible().is_empty()).then_some(self.cursor),
            empty_text: empty,
        }
        .draw(f, chunks[1], matches!(self.modal, Modal::None) && self.search.is_none());

        match &self.modal {
            Modal::None => {}
            Modal::Details { id } => self.draw_details(f, centered_rect(60, 70, area), *id),
            Modal::Edit { form, error, .. } => {
                self.draw_edit(f, centered_rect(60, 40, area), form, error.as_deref(), tick)
            }
            Modal::ConfirmDelete { name, .. } => self.draw_confirm(f, centered_rect(50, 25, area), name),
            Modal::Logs {
                valve_id,
                logs,
                show_all,
                scroll,
            } => self.draw_logs(f, centered_rect(80, 70, area), *valve_id, logs, *show_all, *scroll),
        }
    }

    fn help_text(&self) -> String {
        match &self.modal {
            Modal::Edit { form, .. } if form.form.editing => {
                "type to edit • Enter/Esc done".into()
            }
            Modal::Edit { .. } => "↑/↓ move • Enter edit/Save • Esc back".into(),
            Modal::ConfirmDelete { .. } => "y delete • n cancel".into(),
            Modal::Logs { .. } => "↑/↓ scroll • a more/less • x Excel • p PDF • Esc close".into(),
            Modal::Details { .. } => "see keys in the popup • Esc close".into(),
            Modal::None if self.search.is_some() => "type to search • Tab switch field • Enter/Esc done".into(),
            Modal::None => {
                let mut keys = vec!["↑/↓ move", "Enter details", "/ name", "a area", "c clear", "m filter mode", "l logs", "g map"];
                if self.caps.can_edit {
                    keys.push("e edit");
                }
                if self.caps.can_delete {
                    keys.push("d delete");
                }
                keys.push("r refresh");
                keys.join(" • ")
            }
        }
    }

    fn status_text(&self) -> Option<String> {
        if self.busy {
            Some("Working…".into())
        } else if self.list.loading {
            Some("Loading valves…".into())
        } else {
            None
        }
    }

    fn captures_input(&self) -> bool {
        match &self.modal {
            Modal::None => self.search.is_some(),
            Modal::Edit { form, .. } => form.form.editing,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::AreaRef;
    use crate::widgets::form::validate_form_ids;
    use chrono::{TimeZone, Utc};

    fn valve(id: i64, name: &str, area: &str) -> Valve {
        Valve {
            id,
            name: name.into(),
            size: "100".into(),
            full_open_condition: 100.0,
            current_condition: 30.0,
            mid_point: Some(0.5),
            steepness: Some(12.5),
            remarks: String::new(),
            previous_position: None,
            latitude: (id % 2 == 0).then_some(9.93),
            longitude: (id % 2 == 0).then_some(76.26),
            area_image: None,
            area: Some(AreaRef {
                id: id * 10,
                name: area.into(),
            }),
        }
    }

    fn loaded_page(caps: Capabilities) -> ValvesPage {
        let mut p = ValvesPage::new(false);
        let effs = p.update(PageMsg::Open);
        let token = effs
            .iter()
            .find_map(|e| match e {
                Effect::Api {
                    request: ApiRequest::Valves { token, .. },
                    ..
                } => Some(*token),
                _ => None,
            })
            .unwrap();
        p.update(PageMsg::Loaded {
            kind: RequestKind::Capabilities,
            token: None,
            outcome: Ok(Loaded::Capabilities(caps)),
        });
        p.update(PageMsg::Loaded {
            kind: RequestKind::Valves,
            token: Some(token),
            outcome: Ok(Loaded::Valves {
                token,
                items: vec![valve(1, "Gate A", "Kochi"), valve(2, "Sluice", "Kollam"), valve(3, "gate b", "Kochi")],
            }),
        });
        p
    }

    fn key(p: &mut ValvesPage, k: KeyCode) -> Vec<Effect> {
        p.update(PageMsg::Key(k))
    }

    fn ids(p: &ValvesPage) -> Vec<i64> {
        p.list.visible().iter().map(|v| v.id).collect()
    }

    #[test]
    fn client_search_filters_without_refetch() {
        let mut p = loaded_page(Capabilities::full());
        key(&mut p, KeyCode::Char('/'));
        let mut effs = Vec::new();
        for c in "GATE".chars() {
            effs.extend(key(&mut p, KeyCode::Char(c)));
        }
        assert!(effs.is_empty());
        assert_eq!(ids(&p), vec![1, 3]);
        key(&mut p, KeyCode::Tab);
        for c in "koc".chars() {
            key(&mut p, KeyCode::Char(c));
        }
        assert_eq!(ids(&p), vec![1, 3]);
        key(&mut p, KeyCode::Esc);
        key(&mut p, KeyCode::Char('c'));
        assert_eq!(ids(&p), vec![1, 2, 3]);
    }

    #[test]
    fn server_mode_refetches_with_query() {
        let mut p = ValvesPage::new(true);
        p.update(PageMsg::Open);
        key(&mut p, KeyCode::Char('/'));
        let effs = key(&mut p, KeyCode::Char('g'));
        match effs.as_slice() {
            [Effect::Api {
                request: ApiRequest::Valves { query, .. },
                ..
            }] => assert_eq!(query, &vec![("name".to_string(), "g".to_string())]),
            _ => panic!("expected a refetch"),
        }
    }

    #[test]
    fn stale_list_is_ignored() {
        let mut p = loaded_page(Capabilities::full());
        let stale = p.list.begin_fetch(&p.criteria).0;
        let fresh = p.list.begin_fetch(&p.criteria).0;
        p.update(PageMsg::Loaded {
            kind: RequestKind::Valves,
            token: Some(fresh),
            outcome: Ok(Loaded::Valves {
                token: fresh,
                items: vec![valve(9, "New", "Kochi")],
            }),
        });
        p.update(PageMsg::Loaded {
            kind: RequestKind::Valves,
            token: Some(stale),
            outcome: Err(ApiError::Network("timeout".into())),
        });
        assert_eq!(ids(&p), vec![9]);
        assert!(p.load_error.is_none());
    }

    #[test]
    fn delete_without_permission_is_rejected() {
        let mut p = loaded_page(Capabilities {
            can_edit: true,
            can_delete: false,
            loaded: true,
        });
        let effs = key(&mut p, KeyCode::Char('d'));
        assert!(matches!(
            effs.as_slice(),
            [Effect::ShowToast {
                level: ToastLevel::Error,
                ..
            }]
        ));
        assert!(matches!(p.modal, Modal::None));
        assert_eq!(ids(&p), vec![1, 2, 3]);
        assert!(!p.help_text().contains("d delete"));
    }

    #[test]
    fn confirmed_delete_removes_from_both_lists() {
        let mut p = loaded_page(Capabilities::full());
        key(&mut p, KeyCode::Char('/'));
        key(&mut p, KeyCode::Char('g'));
        key(&mut p, KeyCode::Enter);
        key(&mut p, KeyCode::Char('d'));
        let effs = key(&mut p, KeyCode::Char('y'));
        assert!(matches!(
            effs.as_slice(),
            [Effect::Api {
                request: ApiRequest::DeleteValve(1),
                ..
            }]
        ));
        p.update(PageMsg::Loaded {
            kind: RequestKind::DeleteValve,
            token: None,
            outcome: Ok(Loaded::ValveDeleted(1)),
        });
        assert!(p.list.find(1).is_none());
        assert_eq!(ids(&p), vec![3]);
        assert!(!p.busy);
    }

    #[test]
    fn edit_above_full_open_sends_nothing() {
        let mut p = loaded_page(Capabilities::full());
        key(&mut p, KeyCode::Char('e'));
        key(&mut p, KeyCode::Enter);
        key(&mut p, KeyCode::Char('0'));
        // "30" + "0" = 300 > 100
        assert!(matches!(&p.modal, Modal::Edit { error: Some(e), .. } if e == BOUND_ERROR));
        key(&mut p, KeyCode::Esc);
        for _ in 0..2 {
            key(&mut p, KeyCode::Down);
        }
        let effs = key(&mut p, KeyCode::Enter);
        assert!(effs.is_empty());
        assert!(!p.busy);
    }

    #[test]
    fn edit_saves_then_loads_logs() {
        let mut p = loaded_page(Capabilities::full());
        key(&mut p, KeyCode::Char('e'));
        key(&mut p, KeyCode::Enter);
        key(&mut p, KeyCode::Backspace);
        key(&mut p, KeyCode::Esc);
        for _ in 0..2 {
            key(&mut p, KeyCode::Down);
        }
        let effs = key(&mut p, KeyCode::Enter);
        let payload = match effs.as_slice() {
            [Effect::Api {
                request: ApiRequest::UpdateValve { id: 1, payload },
                ..
            }] => payload.clone(),
            _ => panic!("expected PUT"),
        };
        assert_eq!(payload["current_condition"], json!(3.0));
        assert_eq!(payload["area_id"], json!(10));

        let mut saved = valve(1, "Gate A", "Kochi");
        saved.current_condition = 3.0;
        let effs = p.update(PageMsg::Loaded {
            kind: RequestKind::UpdateValve,
            token: None,
            outcome: Ok(Loaded::ValveSaved(saved)),
        });
        assert_eq!(p.list.visible()[0].current_condition, 3.0);
        assert!(effs.iter().any(|e| matches!(
            e,
            Effect::Api {
                request: ApiRequest::ValveLogs(1),
                ..
            }
        )));
        let logs: Vec<ValveLog> = (0..7)
            .map(|i| ValveLog {
                id: i,
                valve: 1,
                user: None,
                changed_field: "current_condition".into(),
                old_value: "30".into(),
                new_value: "3".into(),
                timestamp: Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap(),
            })
            .collect();
        p.update(PageMsg::Loaded {
            kind: RequestKind::ValveLogs,
            token: None,
            outcome: Ok(Loaded::Logs { valve_id: 1, logs }),
        });
        key(&mut p, KeyCode::Char('a'));
        assert!(matches!(p.modal, Modal::Logs { show_all: true, .. }));
        let effs = key(&mut p, KeyCode::Char('p'));
        assert!(matches!(
            effs.as_slice(),
            [Effect::ExportLogs {
                format: ExportFormat::Pdf,
                ..
            }]
        ));
    }

    #[test]
    fn update_failure_shows_inline_error() {
        let mut p = loaded_page(Capabilities::full());
        key(&mut p, KeyCode::Char('e'));
        for _ in 0..2 {
            key(&mut p, KeyCode::Down);
        }
        key(&mut p, KeyCode::Enter);
        p.update(PageMsg::Loaded {
            kind: RequestKind::UpdateValve,
            token: None,
            outcome: Err(ApiError::Network("down".into())),
        });
        assert!(matches!(&p.modal, Modal::Edit { error: Some(e), .. } if e == "Failed to update valve."));
        assert!(!p.busy);
    }

    #[test]
    fn save_can_be_retried_after_a_failed_update() {
        let mut p = loaded_page(Capabilities::full());
        key(&mut p, KeyCode::Char('e'));
        for _ in 0..2 {
            key(&mut p, KeyCode::Down);
        }
        assert_eq!(key(&mut p, KeyCode::Enter).len(), 1);
        p.update(PageMsg::Loaded {
            kind: RequestKind::UpdateValve,
            token: None,
            outcome: Err(ApiError::Network("down".into())),
        });
        // Touch only the remarks, then save again
        key(&mut p, KeyCode::Up);
        key(&mut p, KeyCode::Enter);
        key(&mut p, KeyCode::Char('x'));
        key(&mut p, KeyCode::Esc);
        key(&mut p, KeyCode::Down);
        let effs = key(&mut p, KeyCode::Enter);
        match effs.as_slice() {
            [Effect::Api {
                request: ApiRequest::UpdateValve { id: 1, payload },
                ..
            }] => assert_eq!(payload["remarks"], json!("x")),
            _ => panic!("expected a second PUT"),
        }
        assert!(matches!(&p.modal, Modal::Edit { error: None, .. }));
        assert!(p.busy);
    }

    #[test]
    fn edit_form_ids_are_unique() {
        let form = edit_form(&valve(1, "Gate A", "Kochi"));
        assert!(validate_form_ids(&form.fields).is_ok());
    }

    #[test]
    fn map_link_needs_coordinates() {
        let mut p = loaded_page(Capabilities::full());
        let effs = key(&mut p, KeyCode::Char('g'));
        assert!(matches!(effs.as_slice(), [Effect::ShowToast { .. }]));
        key(&mut p, KeyCode::Down);
        let effs = key(&mut p, KeyCode::Char('g'));
        match effs.as_slice() {
            [Effect::CopyToClipboard { text, .. }] => {
                assert_eq!(text, "https://www.google.com/maps?q=9.93,76.26")
            }
            _ => panic!("expected clipboard copy"),
        }
    }
}
