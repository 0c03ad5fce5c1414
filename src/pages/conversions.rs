use crate::app::Effect;
use crate::listing::{ConversionCriteria, FilterMode, ListView, SortOrder};
use crate::model::PageId;
use crate::pages::{toast, Page, PageMsg};
use crate::permissions::{Action, Capabilities};
use crate::records::{Area, ConnectionType, Conversion, ConversionStatus};
use crate::services::api_client::ApiError;
use crate::services::loader::{ApiRequest, Loaded, RequestKind};
use crate::ui::ToastLevel;
use crate::widgets::chrome::{centered_rect, panel_block};
use crate::widgets::form::{begin_submit, reset, set_options, FormField, FormState, SelectOption};
use crate::widgets::form_widget::{FormEvent, FormWidget};
use crate::widgets::table::{step_cursor, TableView};
use chrono::{Local, NaiveDate};
use crossterm::event::KeyCode;
use ratatui::prelude::*;
use ratatui::widgets::*;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, warn};

const LOAD_FALLBACK: &str =
    "Failed to load conversions, connection types, or permissions. Please try again.";
const DATE_HINT: &str = "Dates use YYYY-MM-DD";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Filters,
    Table,
}

pub enum Modal {
    None,
    Status { id: i64, cursor: usize },
    Edit { id: i64, form: FormWidget },
    ConfirmDelete { id: i64, name: String },
}

pub struct ConversionsPage {
    pub list: ListView<Conversion>,
    pub criteria: ConversionCriteria,
    pub filters: FormWidget,
    filter_template: Vec<FormField>,
    pub focus: Focus,
    pub cursor: usize,
    pub caps: Capabilities,
    pub modal: Modal,
    pub areas: Vec<Area>,
    pub types: Vec<ConnectionType>,
    pub load_error: Option<String>,
    pub busy: bool,
    opened: bool,
}

fn status_options() -> Vec<SelectOption> {
    ConversionStatus::ALL
        .iter()
        .map(|s| SelectOption::new(s.as_str(), s.label()))
        .collect()
}

fn type_options(types: &[ConnectionType]) -> Vec<SelectOption> {
    types
        .iter()
        .map(|t| SelectOption::new(t.id.to_string(), t.name.clone()))
        .collect()
}

fn area_options(areas: &[Area]) -> Vec<SelectOption> {
    areas
        .iter()
        .map(|a| SelectOption::new(a.id.to_string(), a.area_name.clone()))
        .collect()
}

fn filter_fields() -> Vec<FormField> {
    vec![
        FormField::text("name", "Search").placeholder("Search by name"),
        FormField::select("from_connection_type", "From Connection Type", Vec::new()),
        FormField::select("to_connection_type", "To Connection Type", Vec::new()),
        FormField::select("area", "Area", Vec::new()),
        FormField::select("status", "Status", status_options()),
        FormField::text("date_from", "Date From").placeholder("YYYY-MM-DD"),
        FormField::text("date_to", "Date To").placeholder("YYYY-MM-DD"),
    ]
}

fn edit_form(c: &Conversion, types: &[ConnectionType], areas: &[Area]) -> FormState {
    FormState::new(
        format!("Edit Conversion {}", c.file_number),
        vec![
            FormField::text("name", "Name")
                .required()
                .warning("Name is required.")
                .with_value(c.name.clone()),
            FormField::text("address", "Address")
                .required()
                .warning("Address is required.")
                .with_value(c.address.clone()),
            FormField::text("file_number", "File Number")
                .required()
                .warning("File number is required.")
                .with_value(c.file_number.clone()),
            FormField::select("area", "Area", area_options(areas))
                .required()
                .warning("Area is required.")
                .with_value(c.area.map(|a| a.to_string()).unwrap_or_default()),
            FormField::select("from_connection_type", "From Connection Type", type_options(types))
                .required()
                .warning("From connection type is required.")
                .with_value(c.from_connection_type.to_string()),
            FormField::select("to_connection_type", "To Connection Type", type_options(types))
                .required()
                .warning("To connection type is required.")
                .with_value(c.to_connection_type.to_string()),
            FormField::select("status", "Status", status_options())
                .required()
                .warning("Status is required.")
                .with_value(c.status.as_str()),
        ],
    )
}

/// Messages for blank required edit fields, in form order.
pub fn edit_errors(form: &FormState) -> Vec<String> {
    form.fields
        .iter()
        .filter(|f| f.required && f.value.as_text().trim().is_empty())
        .filter_map(|f| f.warning.clone())
        .collect()
}

/// PATCH body for an edited conversion: trimmed text and integer ids.
pub fn edit_payload(form: &FormState) -> Result<Map<String, JsonValue>, String> {
    let int = |id: &str| -> Result<i64, String> {
        form.text(id)
            .parse::<i64>()
            .map_err(|_| format!("Invalid value for {id}."))
    };
    let status = ConversionStatus::parse(form.text("status")).ok_or("Status is required.")?;
    let mut m = Map::new();
    m.insert("name".into(), json!(form.text("name").trim()));
    m.insert("address".into(), json!(form.text("address").trim()));
    m.insert("file_number".into(), json!(form.text("file_number").trim()));
    m.insert("area".into(), json!(int("area")?));
    m.insert("from_connection_type".into(), json!(int("from_connection_type")?));
    m.insert("to_connection_type".into(), json!(int("to_connection_type")?));
    m.insert("status".into(), json!(status.as_str()));
    Ok(m)
}

fn parse_day(text: &str) -> Result<Option<NaiveDate>, ()> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ())
}

/// Read filter criteria out of the filter form. A half-typed date keeps the
/// previously applied bound; the flag reports whether any date was invalid.
pub fn criteria_from_form(form: &FormState, prev: &ConversionCriteria) -> (ConversionCriteria, bool) {
    let id = |k: &str| form.text(k).parse::<i64>().ok();
    let mut bad_date = false;
    let mut day = |k: &str, prev: Option<NaiveDate>| match parse_day(form.text(k)) {
        Ok(d) => d,
        Err(()) => {
            bad_date = true;
            prev
        }
    };
    let date_from = day("date_from", prev.date_from);
    let date_to = day("date_to", prev.date_to);
    (
        ConversionCriteria {
            name: form.text("name").to_string(),
            from_connection_type: id("from_connection_type"),
            to_connection_type: id("to_connection_type"),
            area: id("area"),
            status: ConversionStatus::parse(form.text("status")),
            date_from,
            date_to,
        },
        bad_date,
    )
}

/// Connection type name from the embedded detail, then the loaded list.
pub fn type_name(detail: Option<&ConnectionType>, id: i64, types: &[ConnectionType]) -> String {
    detail
        .map(|d| d.name.clone())
        .filter(|n| !n.is_empty())
        .or_else(|| types.iter().find(|t| t.id == id).map(|t| t.name.clone()))
        .unwrap_or_else(|| "N/A".into())
}

pub fn area_name(area: Option<i64>, areas: &[Area]) -> String {
    area.and_then(|id| areas.iter().find(|a| a.id == id))
        .map(|a| a.area_name.clone())
        .unwrap_or_else(|| "N/A".into())
}

impl ConversionsPage {
    pub fn new(use_api_filtering: bool) -> Self {
        let template = filter_fields();
        Self {
            list: ListView::new(FilterMode::from_flag(use_api_filtering), Some(SortOrder::Asc)),
            criteria: ConversionCriteria::default(),
            filters: FormWidget::new(
                FormState::new("Filters", template.clone()).with_buttons("Apply", "Clear"),
            ),
            filter_template: template,
            focus: Focus::Table,
            cursor: 0,
            caps: Capabilities::default(),
            modal: Modal::None,
            areas: Vec::new(),
            types: Vec::new(),
            load_error: None,
            busy: false,
            opened: false,
        }
    }

    pub fn selected(&self) -> Option<&Conversion> {
        self.list.visible().get(self.cursor)
    }

    fn api(request: ApiRequest) -> Effect {
        Effect::Api {
            page: PageId::Conversions,
            request,
        }
    }

    fn fetch(&mut self) -> Vec<Effect> {
        let (token, query) = self.list.begin_fetch(&self.criteria);
        debug!(token, ?query, "fetching conversions");
        vec![Self::api(ApiRequest::Conversions { token, query })]
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

    fn sync_criteria(&mut self) -> Vec<Effect> {
        let (next, bad_date) = criteria_from_form(&self.filters.form, &self.criteria);
        self.filters.form.message = bad_date.then(|| DATE_HINT.to_string());
        if next == self.criteria {
            return Vec::new();
        }
        self.criteria = next;
        self.criteria_changed()
    }

    fn clear_filters(&mut self) -> Vec<Effect> {
        reset(&mut self.filters.form, &self.filter_template);
        self.criteria = ConversionCriteria::default();
        self.list.sort = Some(SortOrder::Asc);
        self.criteria_changed()
    }

    fn toggle_sort(&mut self) -> Vec<Effect> {
        if self.list.toggle_sort(&self.criteria) {
            self.fetch()
        } else {
            Vec::new()
        }
    }

    fn open_status(&mut self, id: i64) -> Vec<Effect> {
        if self.busy {
            return Vec::new();
        }
        if let Err(msg) = self.caps.check(Action::Edit, "conversions") {
            return vec![toast(msg, ToastLevel::Error)];
        }
        let Some(c) = self.list.find(id) else {
            return Vec::new();
        };
        let cursor = ConversionStatus::ALL
            .iter()
            .position(|s| *s == c.status)
            .unwrap_or(0);
        self.modal = Modal::Status { id, cursor };
        Vec::new()
    }

    fn open_edit(&mut self, id: i64) -> Vec<Effect> {
        if let Err(msg) = self.caps.check(Action::Edit, "conversions") {
            return vec![toast(msg, ToastLevel::Error)];
        }
        let Some(c) = self.list.find(id) else {
            return Vec::new();
        };
        self.modal = Modal::Edit {
            id,
            form: FormWidget::new(edit_form(c, &self.types, &self.areas)),
        };
        Vec::new()
    }

    fn open_delete(&mut self, id: i64) -> Vec<Effect> {
        if let Err(msg) = self.caps.check(Action::Delete, "conversions") {
            return vec![toast(msg, ToastLevel::Error)];
        }
        let Some(c) = self.list.find(id) else {
            return Vec::new();
        };
        self.modal = Modal::ConfirmDelete {
            id,
            name: c.name.clone(),
        };
        Vec::new()
    }

    fn submit_edit(&mut self) -> Vec<Effect> {
        let Modal::Edit { id, form } = &mut self.modal else {
            return Vec::new();
        };
        if self.busy {
            return Vec::new();
        }
        begin_submit(&mut form.form);
        let errors = edit_errors(&form.form);
        if !errors.is_empty() {
            form.form.message = Some(errors.join(" "));
            return Vec::new();
        }
        let payload = match edit_payload(&form.form) {
            Ok(p) => p,
            Err(msg) => {
                form.form.message = Some(msg);
                return Vec::new();
            }
        };
        let id = *id;
        form.form.disabled = true;
        self.busy = true;
        vec![Self::api(ApiRequest::UpdateConversion { id, payload })]
    }

    fn on_filter_key(&mut self, key: KeyCode) -> Vec<Effect> {
        if key == KeyCode::Tab && !self.filters.form.editing {
            self.focus = Focus::Table;
            return Vec::new();
        }
        match self.filters.on_key(key) {
            FormEvent::Changed { .. } => self.sync_criteria(),
            FormEvent::Submit => {
                self.focus = Focus::Table;
                self.sync_criteria()
            }
            FormEvent::Cancel => self.clear_filters(),
            FormEvent::Ignored => self.on_shared_key(key),
            FormEvent::Handled => Vec::new(),
        }
    }

    /// Keys that work from both the filter panel and the table.
    fn on_shared_key(&mut self, key: KeyCode) -> Vec<Effect> {
        match key {
            KeyCode::Char('o') => self.toggle_sort(),
            KeyCode::Char('C') => self.clear_filters(),
            KeyCode::Char('m') => {
                self.list.mode = match self.list.mode {
                    FilterMode::Server => FilterMode::Client,
                    FilterMode::Client => FilterMode::Server,
                };
                self.fetch()
            }
            KeyCode::Char('r') => self.fetch(),
            _ => Vec::new(),
        }
    }

    fn on_table_key(&mut self, key: KeyCode) -> Vec<Effect> {
        let len = self.list.visible().len();
        let selected = self.selected().map(|c| c.id);
        match key {
            KeyCode::Tab => {
                self.focus = Focus::Filters;
                Vec::new()
            }
            KeyCode::Up => {
                self.cursor = step_cursor(self.cursor, -1, len);
                Vec::new()
            }
            KeyCode::Down => {
                self.cursor = step_cursor(self.cursor, 1, len);
                Vec::new()
            }
            KeyCode::PageUp => {
                self.cursor = step_cursor(self.cursor, -10, len);
                Vec::new()
            }
            KeyCode::PageDown => {
                self.cursor = step_cursor(self.cursor, 10, len);
                Vec::new()
            }
            KeyCode::Char('s') | KeyCode::Enter => {
                selected.map(|id| self.open_status(id)).unwrap_or_default()
            }
            KeyCode::Char('e') => selected.map(|id| self.open_edit(id)).unwrap_or_default(),
            KeyCode::Char('d') => selected.map(|id| self.open_delete(id)).unwrap_or_default(),
            other => self.on_shared_key(other),
        }
    }

    fn on_key(&mut self, key: KeyCode) -> Vec<Effect> {
        match &mut self.modal {
            Modal::None => match self.focus {
                Focus::Filters => self.on_filter_key(key),
                Focus::Table => self.on_table_key(key),
            },
            Modal::Status { id, cursor } => match key {
                KeyCode::Up => {
                    *cursor = cursor.saturating_sub(1);
                    Vec::new()
                }
                KeyCode::Down => {
                    *cursor = (*cursor + 1).min(ConversionStatus::ALL.len() - 1);
                    Vec::new()
                }
                KeyCode::Enter if self.busy => Vec::new(),
                KeyCode::Enter => {
                    let (id, status) = (*id, ConversionStatus::ALL[*cursor]);
                    self.modal = Modal::None;
                    if let Err(msg) = self.caps.check(Action::Edit, "conversions") {
                        return vec![toast(msg, ToastLevel::Error)];
                    }
                    if self.list.find(id).map(|c| c.status) == Some(status) {
                        return Vec::new();
                    }
                    self.busy = true;
                    vec![Self::api(ApiRequest::SetConversionStatus { id, status })]
                }
                KeyCode::Esc => {
                    self.modal = Modal::None;
                    Vec::new()
                }
                _ => Vec::new(),
            },
            Modal::Edit { form, .. } => match form.on_key(key) {
                FormEvent::Submit => self.submit_edit(),
                FormEvent::Cancel if !self.busy => {
                    self.modal = Modal::None;
                    Vec::new()
                }
                _ => Vec::new(),
            },
            Modal::ConfirmDelete { id, .. } => {
                let id = *id;
                match key {
                    KeyCode::Char('y') | KeyCode::Char('Y') => {
                        if let Err(msg) = self.caps.check(Action::Delete, "conversions") {
                            self.modal = Modal::None;
                            return vec![toast(msg, ToastLevel::Error)];
                        }
                        if self.busy {
                            return Vec::new();
                        }
                        self.busy = true;
                        vec![Self::api(ApiRequest::DeleteConversion(id))]
                    }
                    KeyCode::Char('n') | KeyCode::Esc if !self.busy => {
                        self.modal = Modal::None;
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
        }
    }

    fn load_failed(&mut self, e: &ApiError) -> Vec<Effect> {
        let msg = e.user_message(LOAD_FALLBACK);
        self.load_error = Some(msg.clone());
        vec![toast(msg, ToastLevel::Error)]
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
            Ok(Loaded::Conversions { token, items }) => {
                if self.list.accept(token, items, &self.criteria) {
                    self.load_error = None;
                    self.clamp_cursor();
                } else {
                    debug!(token, "dropped stale conversion list");
                }
                Vec::new()
            }
            Ok(Loaded::ConnectionTypes(types)) => {
                set_options(&mut self.filters.form, "from_connection_type", type_options(&types));
                set_options(&mut self.filters.form, "to_connection_type", type_options(&types));
                self.types = types;
                Vec::new()
            }
            Ok(Loaded::Areas(areas)) => {
                set_options(&mut self.filters.form, "area", area_options(&areas));
                self.areas = areas;
                Vec::new()
            }
            Ok(Loaded::ConversionStatusSet { id, status }) => {
                self.busy = false;
                self.list.update_by_id(id, |c| c.status = status);
                self.list.refilter(&self.criteria);
                self.clamp_cursor();
                vec![toast("Status updated successfully!", ToastLevel::Success)]
            }
            Ok(Loaded::ConversionSaved(c)) => {
                self.busy = false;
                self.list.replace_by_id(c);
                self.list.refilter(&self.criteria);
                self.clamp_cursor();
                self.modal = Modal::None;
                vec![toast("Conversion updated successfully!", ToastLevel::Success)]
            }
            Ok(Loaded::ConversionDeleted(id)) => {
                self.busy = false;
                self.list.remove_by_id(id);
                self.clamp_cursor();
                self.modal = Modal::None;
                vec![toast("Conversion deleted successfully!", ToastLevel::Success)]
            }
            Ok(_) => Vec::new(),
            Err(e) => self.on_failed(kind, token, e),
        }
    }

    fn on_failed(&mut self, kind: RequestKind, token: Option<u64>, e: ApiError) -> Vec<Effect> {
        warn!(?kind, error = %e, "conversions request failed");
        match kind {
            RequestKind::Conversions => {
                if token.map(|t| self.list.fail(t)).unwrap_or(false) {
                    self.load_failed(&e)
                } else {
                    Vec::new()
                }
            }
            RequestKind::Capabilities => {
                self.caps = Capabilities {
                    loaded: true,
                    ..Capabilities::default()
                };
                self.load_failed(&e)
            }
            RequestKind::ConnectionTypes | RequestKind::Areas => self.load_failed(&e),
            RequestKind::SetConversionStatus => {
                self.busy = false;
                vec![toast(e.user_message("Failed to update status."), ToastLevel::Error)]
            }
            RequestKind::UpdateConversion => {
                self.busy = false;
                if let Modal::Edit { form, .. } = &mut self.modal {
                    form.form.disabled = false;
                }
                vec![toast(e.user_message("Failed to update conversion."), ToastLevel::Error)]
            }
            RequestKind::DeleteConversion => {
                self.busy = false;
                self.modal = Modal::None;
                vec![toast(e.user_message("Failed to delete conversion."), ToastLevel::Error)]
            }
            _ => Vec::new(),
        }
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.list
            .visible()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                vec![
                    (i + 1).to_string(),
                    c.created_at.with_timezone(&Local).format("%d/%m/%Y").to_string(),
                    c.file_number.clone(),
                    type_name(
                        c.from_connection_type_detail.as_ref(),
                        c.from_connection_type,
                        &self.types,
                    ),
                    type_name(
                        c.to_connection_type_detail.as_ref(),
                        c.to_connection_type,
                        &self.types,
                    ),
                    area_name(c.area, &self.areas),
                    c.name.clone(),
                    c.address.clone(),
                    c.status.label().to_string(),
                ]
            })
            .collect()
    }

    fn draw_status(&self, f: &mut Frame, area: Rect, id: i64, cursor: usize) {
        let name = self.list.find(id).map(|c| c.name.as_str()).unwrap_or("");
        let lines: Vec<Line> = ConversionStatus::ALL
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mark = if i == cursor { "(•)" } else { "( )" };
                let style = if i == cursor {
                    crate::theme::list_cursor_style()
                } else {
                    Style::default()
                };
                Line::from(Span::styled(format!("{mark} {}", s.label()), style))
            })
            .collect();
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(lines).block(panel_block(&format!("Status: {name}"), true)),
            area,
        );
    }

    fn draw_confirm(&self, f: &mut Frame, area: Rect, name: &str) {
        let lines = vec![
            Line::from(format!("Are you sure you want to delete the conversion for '{name}'?")),
            Line::from(""),
            Line::from(Span::styled("y confirm • n cancel", crate::theme::text_muted())),
        ];
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(lines)
                .block(panel_block("Delete Conversion", true))
                .wrap(Wrap { trim: false }),
            area,
        );
    }
}

impl Page for ConversionsPage {
    fn id(&self) -> PageId {
        PageId::Conversions
    }

    fn update(&mut self, msg: PageMsg) -> Vec<Effect> {
        match msg {
            PageMsg::Open => {
                if self.opened {
                    return Vec::new();
                }
                self.opened = true;
                let mut effs = self.fetch();
                effs.push(Self::api(ApiRequest::ConnectionTypes));
                effs.push(Self::api(ApiRequest::Areas));
                if let Some(page) = self.id().permission_page() {
                    effs.push(Self::api(ApiRequest::Capabilities { page }));
                }
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
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(44), Constraint::Min(20)])
            .split(area);
        self.filters
            .render(f, cols[0], self.focus == Focus::Filters && matches!(self.modal, Modal::None), tick);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(self.load_error.is_some() as u16),
                Constraint::Min(3),
            ])
            .split(cols[1]);
        if let Some(err) = &self.load_error {
            f.render_widget(
                Paragraph::new(Span::styled(err.clone(), crate::theme::text_error())),
                right[0],
            );
        }
        let sort = self.list.sort.unwrap_or_default();
        let created = format!("Created At {}", sort.arrow());
        let title = format!(
            "Conversions ({}) • filter: {}",
            self.list.visible().len(),
            self.list.mode.label()
        );
        TableView {
            title: &title,
            headers: &[
                "Sl No",
                created.as_str(),
                "File No",
                "From",
                "To",
                "Area",
                "Name",
                "Address",
                "Status",
            ],
            widths: &[
                Constraint::Length(5),
                Constraint::Length(12),
                Constraint::Length(10),
                Constraint::Fill(1),
                Constraint::Fill(1),
                Constraint::Fill(1),
                Constraint::Fill(2),
                Constraint::Fill(2),
                Constraint::Length(18),
            ],
            rows: self.rows(),
            cursor: (!self.list.visible().is_empty()).then_some(self.cursor),
            empty_text: if self.list.loading {
                "Loading conversions..."
            } else {
                "No conversions found."
            },
        }
        .draw(
            f,
            right[1],
            self.focus == Focus::Table && matches!(self.modal, Modal::None),
        );

        match &self.modal {
            Modal::None => {}
            Modal::Status { id, cursor } => self.draw_status(f, centered_rect(40, 30, area), *id, *cursor),
            Modal::Edit { form, .. } => {
                let r = centered_rect(60, 70, area);
                f.render_widget(Clear, r);
                form.render(f, r, true, tick);
            }
            Modal::ConfirmDelete { name, .. } => self.draw_confirm(f, centered_rect(50, 25, area), name),
        }
    }

    fn help_text(&self) -> String {
        match &self.modal {
            Modal::Status { .. } => "↑/↓ choose • Enter apply • Esc cancel".into(),
            Modal::Edit { form, .. } if form.form.editing => "type to edit • Enter/Esc done".into(),
            Modal::Edit { .. } => "↑/↓ move • Enter edit/Save • Esc cancel".into(),
            Modal::ConfirmDelete { .. } => "y delete • n cancel".into(),
            Modal::None if self.filters.form.editing => "type to filter • Enter/Esc done".into(),
            Modal::None => {
                let mut keys = vec!["Tab filters/table", "↑/↓ move"];
                if self.caps.can_edit {
                    keys.extend(["s status", "e edit"]);
                }
                if self.caps.can_delete {
                    keys.push("d delete");
                }
                keys.extend(["o sort", "C clear", "m filter mode", "r refresh"]);
                keys.join(" • ")
            }
        }
    }

    fn status_text(&self) -> Option<String> {
        if self.busy {
            Some("Working…".into())
        } else if self.list.loading {
            Some("Loading conversions…".into())
        } else {
            None
        }
    }

    fn captures_input(&self) -> bool {
        match &self.modal {
            Modal::None => self.focus == Focus::Filters && self.filters.form.editing,
            Modal::Edit { form, .. } => form.form.editing,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::form::validate_form_ids;
    use chrono::{TimeZone, Utc};

    fn conv(id: i64, name: &str, from: i64, area: i64, status: ConversionStatus, day: u32) -> Conversion {
        Conversion {
            id,
            name: name.into(),
            address: "Main Road".into(),
            file_number: format!("F{id}"),
            area: Some(area),
            from_connection_type: from,
            to_connection_type: 2,
            status,
            created_at: Utc.with_ymd_and_hms(2025, 4, day, 12, 0, 0).unwrap(),
            from_connection_type_detail: None,
            to_connection_type_detail: Some(ConnectionType {
                id: 2,
                name: "Commercial".into(),
            }),
        }
    }

    fn data() -> Vec<Conversion> {
        use ConversionStatus::*;
        vec![
            conv(1, "Anil", 1, 10, Fo, 3),
            conv(2, "Beena", 3, 11, Completed, 7),
            conv(3, "Chacko", 1, 10, SiteInspector, 5),
        ]
    }

    fn opened(api_filtering: bool, caps: Capabilities) -> (ConversionsPage, u64) {
        let mut p = ConversionsPage::new(api_filtering);
        let effs = p.update(PageMsg::Open);
        let token = match &effs[0] {
            Effect::Api {
                request: ApiRequest::Conversions { token, .. },
                ..
            } => *token,
            _ => panic!("expected list fetch first"),
        };
        p.update(PageMsg::Loaded {
            kind: RequestKind::Capabilities,
            token: None,
            outcome: Ok(Loaded::Capabilities(caps)),
        });
        p.update(PageMsg::Loaded {
            kind: RequestKind::ConnectionTypes,
            token: None,
            outcome: Ok(Loaded::ConnectionTypes(vec![
                ConnectionType {
                    id: 1,
                    name: "Domestic".into(),
                },
                ConnectionType {
                    id: 2,
                    name: "Commercial".into(),
                },
            ])),
        });
        p.update(PageMsg::Loaded {
            kind: RequestKind::Areas,
            token: None,
            outcome: Ok(Loaded::Areas(vec![Area {
                id: 10,
                area_name: "Kochi".into(),
            }])),
        });
        (p, token)
    }

    fn loaded(caps: Capabilities) -> ConversionsPage {
        let (mut p, token) = opened(false, caps);
        p.update(PageMsg::Loaded {
            kind: RequestKind::Conversions,
            token: Some(token),
            outcome: Ok(Loaded::Conversions { token, items: data() }),
        });
        p
    }

    fn key(p: &mut ConversionsPage, k: KeyCode) -> Vec<Effect> {
        p.update(PageMsg::Key(k))
    }

    fn ids(p: &ConversionsPage) -> Vec<i64> {
        p.list.visible().iter().map(|c| c.id).collect()
    }

    fn api_requests(effs: &[Effect]) -> Vec<ApiRequest> {
        effs.iter()
            .filter_map(|e| match e {
                Effect::Api { request, .. } => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn open_loads_list_lookups_and_permissions() {
        let mut p = ConversionsPage::new(true);
        let reqs = api_requests(&p.update(PageMsg::Open));
        assert_eq!(reqs.len(), 4);
        assert!(reqs.contains(&ApiRequest::Capabilities { page: "e-tapp" }));
        match &reqs[0] {
            ApiRequest::Conversions { query, .. } => {
                assert_eq!(query, &vec![("ordering".to_string(), "created_at".to_string())])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(p.update(PageMsg::Open).is_empty());
    }

    #[test]
    fn sorted_ascending_and_toggle_reverses() {
        let mut p = loaded(Capabilities::full());
        assert_eq!(ids(&p), vec![1, 3, 2]);
        assert!(key(&mut p, KeyCode::Char('o')).is_empty());
        assert_eq!(ids(&p), vec![2, 3, 1]);
        key(&mut p, KeyCode::Char('C'));
        assert_eq!(ids(&p), vec![1, 3, 2]);
    }

    #[test]
    fn status_filter_narrows_locally() {
        let mut p = loaded(Capabilities::full());
        key(&mut p, KeyCode::Tab);
        for _ in 0..4 {
            key(&mut p, KeyCode::Down);
        }
        key(&mut p, KeyCode::Enter);
        // placeholder, Assistant Engineer, FO
        key(&mut p, KeyCode::Down);
        key(&mut p, KeyCode::Down);
        let effs = key(&mut p, KeyCode::Enter);
        assert!(effs.is_empty());
        assert_eq!(p.criteria.status, Some(ConversionStatus::Fo));
        assert_eq!(ids(&p), vec![1]);
    }

    #[test]
    fn server_mode_refetches_once_date_is_complete() {
        let (mut p, _) = opened(true, Capabilities::full());
        key(&mut p, KeyCode::Tab);
        for _ in 0..5 {
            key(&mut p, KeyCode::Down);
        }
        key(&mut p, KeyCode::Enter);
        let mut reqs = Vec::new();
        for c in "2025-04-05".chars() {
            reqs.extend(api_requests(&key(&mut p, KeyCode::Char(c))));
        }
        // "2025" alone parses as nothing; only the full date is applied
        assert_eq!(reqs.len(), 1);
        match &reqs[0] {
            ApiRequest::Conversions { query, .. } => {
                assert!(query.contains(&("date_gte".to_string(), "2025-04-05".to_string())))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(p.filters.form.message.is_none());
    }

    #[test]
    fn status_change_requires_edit_permission() {
        let mut p = loaded(Capabilities {
            can_edit: false,
            can_delete: true,
            loaded: true,
        });
        let effs = key(&mut p, KeyCode::Char('s'));
        match effs.as_slice() {
            [Effect::ShowToast { text, .. }] => {
                assert_eq!(text, "You do not have permission to edit conversions.")
            }
            _ => panic!("expected a permission toast"),
        }
        assert!(matches!(p.modal, Modal::None));
    }

    #[test]
    fn status_change_patches_and_merges() {
        let mut p = loaded(Capabilities::full());
        key(&mut p, KeyCode::Char('s'));
        key(&mut p, KeyCode::Down);
        let reqs = api_requests(&key(&mut p, KeyCode::Enter));
        assert_eq!(
            reqs,
            vec![ApiRequest::SetConversionStatus {
                id: 1,
                status: ConversionStatus::SiteInspector
            }]
        );
        p.update(PageMsg::Loaded {
            kind: RequestKind::SetConversionStatus,
            token: None,
            outcome: Ok(Loaded::ConversionStatusSet {
                id: 1,
                status: ConversionStatus::SiteInspector,
            }),
        });
        assert_eq!(p.list.find(1).unwrap().status, ConversionStatus::SiteInspector);
        assert_eq!(p.list.visible()[0].status, ConversionStatus::SiteInspector);
        assert!(!p.busy);
    }

    #[test]
    fn status_editor_waits_for_pending_patch() {
        let mut p = loaded(Capabilities::full());
        key(&mut p, KeyCode::Char('s'));
        key(&mut p, KeyCode::Down);
        assert_eq!(api_requests(&key(&mut p, KeyCode::Enter)).len(), 1);
        assert!(p.busy);

        key(&mut p, KeyCode::Down);
        assert!(key(&mut p, KeyCode::Char('s')).is_empty());
        assert!(matches!(p.modal, Modal::None));

        // An editor left open cannot apply either
        p.modal = Modal::Status { id: 3, cursor: 3 };
        assert!(key(&mut p, KeyCode::Enter).is_empty());
        assert!(matches!(p.modal, Modal::Status { id: 3, .. }));

        p.update(PageMsg::Loaded {
            kind: RequestKind::SetConversionStatus,
            token: None,
            outcome: Ok(Loaded::ConversionStatusSet {
                id: 1,
                status: ConversionStatus::SiteInspector,
            }),
        });
        assert_eq!(
            api_requests(&key(&mut p, KeyCode::Enter)),
            vec![ApiRequest::SetConversionStatus {
                id: 3,
                status: ConversionStatus::Completed
            }]
        );
    }

    #[test]
    fn delete_without_permission_is_rejected() {
        let mut p = loaded(Capabilities {
            can_edit: true,
            can_delete: false,
            loaded: true,
        });
        match key(&mut p, KeyCode::Char('d')).as_slice() {
            [Effect::ShowToast { text, level: ToastLevel::Error, .. }] => {
                assert_eq!(text, "You do not have permission to delete conversions.")
            }
            _ => panic!("expected a permission toast"),
        }
        assert!(matches!(p.modal, Modal::None));
        assert!(!p.help_text().contains("d delete"));

        // Permission lost while the confirmation is showing
        p.caps = Capabilities::full();
        key(&mut p, KeyCode::Char('d'));
        assert!(matches!(p.modal, Modal::ConfirmDelete { .. }));
        p.caps.can_delete = false;
        let effs = key(&mut p, KeyCode::Char('y'));
        assert!(api_requests(&effs).is_empty());
        assert!(matches!(
            effs.as_slice(),
            [Effect::ShowToast { level: ToastLevel::Error, .. }]
        ));
        assert!(matches!(p.modal, Modal::None));
        assert_eq!(ids(&p), vec![1, 3, 2]);
        assert!(!p.busy);
    }

    #[test]
    fn form_templates_have_unique_ids() {
        assert!(validate_form_ids(&filter_fields()).is_ok());
        let p = loaded(Capabilities::full());
        let form = edit_form(&data()[0], &p.types, &p.areas);
        assert!(validate_form_ids(&form.fields).is_ok());
    }

    #[test]
    fn blank_edit_fields_block_the_patch() {
        let mut p = loaded(Capabilities::full());
        key(&mut p, KeyCode::Char('e'));
        // Clear the name, then type a space
        key(&mut p, KeyCode::Enter);
        for _ in 0.."Anil".len() {
            key(&mut p, KeyCode::Backspace);
        }
        key(&mut p, KeyCode::Char(' '));
        key(&mut p, KeyCode::Esc);
        for _ in 0..7 {
            key(&mut p, KeyCode::Down);
        }
        let effs = key(&mut p, KeyCode::Enter);
        assert!(effs.is_empty());
        match &p.modal {
            Modal::Edit { form, .. } => {
                assert_eq!(form.form.message.as_deref(), Some("Name is required."))
            }
            _ => panic!("edit modal closed"),
        }
    }

    #[test]
    fn edit_sends_trimmed_payload_and_merges_response() {
        let mut p = loaded(Capabilities::full());
        key(&mut p, KeyCode::Char('e'));
        key(&mut p, KeyCode::Enter);
        key(&mut p, KeyCode::Char(' '));
        key(&mut p, KeyCode::Esc);
        for _ in 0..7 {
            key(&mut p, KeyCode::Down);
        }
        let reqs = api_requests(&key(&mut p, KeyCode::Enter));
        let payload = match reqs.as_slice() {
            [ApiRequest::UpdateConversion { id: 1, payload }] => payload.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(payload["name"], json!("Anil"));
        assert_eq!(payload["area"], json!(10));
        assert_eq!(payload["from_connection_type"], json!(1));
        assert_eq!(payload["status"], json!("fo"));

        let mut saved = data()[0].clone();
        saved.address = "New Road".into();
        let effs = p.update(PageMsg::Loaded {
            kind: RequestKind::UpdateConversion,
            token: None,
            outcome: Ok(Loaded::ConversionSaved(saved)),
        });
        assert!(matches!(p.modal, Modal::None));
        assert_eq!(p.list.find(1).unwrap().address, "New Road");
        assert!(matches!(
            effs.as_slice(),
            [Effect::ShowToast {
                level: ToastLevel::Success,
                ..
            }]
        ));
    }

    #[test]
    fn delete_confirms_then_removes() {
        let mut p = loaded(Capabilities::full());
        key(&mut p, KeyCode::Down);
        key(&mut p, KeyCode::Char('d'));
        assert!(key(&mut p, KeyCode::Char('n')).is_empty());
        assert!(matches!(p.modal, Modal::None));
        key(&mut p, KeyCode::Char('d'));
        let reqs = api_requests(&key(&mut p, KeyCode::Char('y')));
        assert_eq!(reqs, vec![ApiRequest::DeleteConversion(3)]);
        p.update(PageMsg::Loaded {
            kind: RequestKind::DeleteConversion,
            token: None,
            outcome: Ok(Loaded::ConversionDeleted(3)),
        });
        assert_eq!(ids(&p), vec![1, 2]);
    }

    #[test]
    fn load_failure_uses_server_detail() {
        let (mut p, token) = opened(false, Capabilities::full());
        let effs = p.update(PageMsg::Loaded {
            kind: RequestKind::Conversions,
            token: Some(token),
            outcome: Err(ApiError::Status {
                status: 500,
                detail: Some("Database unavailable".into()),
            }),
        });
        assert_eq!(p.load_error.as_deref(), Some("Database unavailable"));
        assert_eq!(effs.len(), 1);
        p.update(PageMsg::Loaded {
            kind: RequestKind::Areas,
            token: None,
            outcome: Err(ApiError::Network("refused".into())),
        });
        assert_eq!(p.load_error.as_deref(), Some(LOAD_FALLBACK));
    }

    #[test]
    fn names_fall_back_to_lookup_then_na() {
        let p = loaded(Capabilities::full());
        let rows = p.rows();
        assert_eq!(rows[0][3], "Domestic");
        assert_eq!(rows[0][4], "Commercial");
        assert_eq!(rows[0][5], "Kochi");
        // id 2 has from type 3 and area 11, neither known
        assert_eq!(rows[2][3], "N/A");
        assert_eq!(rows[2][5], "N/A");
        assert_eq!(rows[2][0], "3");
    }
}
