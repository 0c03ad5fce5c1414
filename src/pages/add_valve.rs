use crate::app::Effect;
use crate::model::PageId;
use crate::pages::{toast, Page, PageMsg};
use crate::services::loader::{ApiRequest, Loaded, RequestKind};
use crate::ui::ToastLevel;
use crate::widgets::form::{
    begin_submit, file_attachments, reset, set_max, set_options, to_payload, FormField, FormState,
    SelectOption,
};
use crate::widgets::form_widget::{FormEvent, FormWidget};
use crossterm::event::KeyCode;
use ratatui::prelude::*;
use ratatui::widgets::*;
use tracing::debug;

pub const CURRENT_CEILING: &str = "1000";
pub const BOUND_ERROR: &str = "Current condition must be less than or equal to full open condition.";

pub fn valve_template() -> Vec<FormField> {
    vec![
        FormField::text("name", "Name")
            .placeholder("Enter valve name")
            .warning("Please enter the valve name.")
            .required(),
        FormField::text("size", "Size")
            .placeholder("Enter valve size")
            .warning("Please enter the valve size.")
            .required(),
        FormField::number("full_open_condition", "Full Open Condition", Some("0"), Some("1000"), "0.1")
            .placeholder("Enter full open condition")
            .warning("Please enter a number for full open condition.")
            .required(),
        FormField::number("current_condition", "Current Condition", Some("0"), None, "0.1")
            .placeholder("Enter current condition")
            .warning("Please enter a number for current condition.")
            .required(),
        FormField::number("mid_point", "Mid Point", Some("0"), Some("1"), "0.01")
            .with_value("0.5")
            .placeholder("Enter mid point")
            .warning("Please enter a number between 0 and 1 for mid point.")
            .required(),
        FormField::number("steepness", "Steepness", Some("0"), Some("100"), "0.1")
            .with_value("12.5")
            .placeholder("Enter steepness")
            .warning("Please enter a number between 0 and 100 for steepness.")
            .required(),
        FormField::text("remarks", "Remarks")
            .placeholder("Enter any remarks")
            .warning("Please enter any remarks.")
            .required(),
        FormField::number("latitude", "Latitude", None, None, "0.000001")
            .placeholder("Enter latitude")
            .warning("Please enter latitude"),
        FormField::number("longitude", "Longitude", None, None, "0.000001")
            .placeholder("Enter longitude")
            .warning("Please enter longitude"),
        FormField::select("area_id", "Choose your area", Vec::new()).warning("Please choose an area."),
        FormField::image("area_image", "Area Image")
            .placeholder("Upload the image")
            .warning("Please upload the image.")
            .required(),
        FormField::hidden("previous_position"),
    ]
}

/// Re-derive the current-condition ceiling from the full-open value and
/// report a violation of `current <= full_open`.
pub fn check_valve_bounds(form: &mut FormState) -> Option<String> {
    let full = form.text("full_open_condition").to_string();
    let ceiling = if full.is_empty() {
        CURRENT_CEILING
    } else {
        full.as_str()
    };
    set_max(form, "current_condition", ceiling);
    let current = form.text("current_condition");
    match (current.parse::<f64>(), full.parse::<f64>()) {
        (Ok(c), Ok(f)) if c > f => Some(BOUND_ERROR.to_string()),
        _ => None,
    }
}

pub struct AddValvePage {
    pub form: FormWidget,
    template: Vec<FormField>,
    pub validation_error: Option<String>,
    pub load_error: Option<String>,
    pub loading_areas: bool,
    pub busy: bool,
    opened: bool,
}

impl Default for AddValvePage {
    fn default() -> Self {
        Self::new()
    }
}

impl AddValvePage {
    pub fn new() -> Self {
        let template = valve_template();
        Self {
            form: FormWidget::new(FormState::new("Valve Section", template.clone())),
            template,
            validation_error: None,
            load_error: None,
            loading_areas: false,
            busy: false,
            opened: false,
        }
    }

    fn load_areas(&mut self) -> Vec<Effect> {
        self.loading_areas = true;
        self.load_error = None;
        vec![Effect::Api {
            page: PageId::AddValve,
            request: ApiRequest::Areas,
        }]
    }

    fn on_change(&mut self, id: &str) {
        if id == "current_condition" || id == "full_open_condition" {
            self.validation_error = check_valve_bounds(&mut self.form.form);
        }
    }

    fn submit(&mut self) -> Vec<Effect> {
        if self.busy {
            return Vec::new();
        }
        let missing = begin_submit(&mut self.form.form);
        if !missing.is_empty() {
            debug!(?missing, "valve form incomplete");
            return Vec::new();
        }
        self.validation_error = check_valve_bounds(&mut self.form.form);
        if let Some(err) = &self.validation_error {
            return vec![toast(err.clone(), ToastLevel::Error)];
        }
        self.busy = true;
        self.form.form.disabled = true;
        vec![Effect::Api {
            page: PageId::AddValve,
            request: ApiRequest::CreateValve {
                payload: to_payload(&self.form.form),
                attachments: file_attachments(&self.form.form),
            },
        }]
    }

    fn on_loaded(&mut self, kind: RequestKind, outcome: Result<Loaded, crate::services::api_client::ApiError>) -> Vec<Effect> {
        match (kind, outcome) {
            (_, Ok(Loaded::Areas(areas))) => {
                self.loading_areas = false;
                let options = areas
                    .into_iter()
                    .map(|a| SelectOption::new(a.id.to_string(), a.area_name))
                    .collect();
                set_options(&mut self.form.form, "area_id", options);
                Vec::new()
            }
            (_, Ok(Loaded::ValveCreated(v))) => {
                self.busy = false;
                self.form.form.disabled = false;
                self.validation_error = None;
                reset(&mut self.form.form, &self.template);
                debug!(id = v.id, "valve created");
                vec![toast(format!("Valve '{}' added successfully!", v.name), ToastLevel::Success)]
            }
            (RequestKind::Areas, Err(e)) => {
                self.loading_areas = false;
                let msg = "Failed to fetch areas. Please try again later.".to_string();
                self.load_error = Some(msg);
                vec![toast(e.user_message("Failed to fetch areas."), ToastLevel::Error)]
            }
            (RequestKind::CreateValve, Err(e)) => {
                self.busy = false;
                self.form.form.disabled = false;
                vec![toast(e.user_message("Failed to add valve."), ToastLevel::Error)]
            }
            _ => Vec::new(),
        }
    }
}

impl Page for AddValvePage {
    fn id(&self) -> PageId {
        PageId::AddValve
    }

    fn update(&mut self, msg: PageMsg) -> Vec<Effect> {
        match msg {
            PageMsg::Open => {
                if self.opened {
                    return Vec::new();
                }
                self.opened = true;
                self.load_areas()
            }
            PageMsg::Loaded { kind, outcome, .. } => self.on_loaded(kind, outcome),
            PageMsg::Key(key) => {
                let editing = self.form.form.editing;
                if !editing && key == KeyCode::Esc {
                    return Vec::new();
                }
                match self.form.on_key(key) {
                    FormEvent::Changed { id, .. } => {
                        self.on_change(&id);
                        Vec::new()
                    }
                    FormEvent::Submit => self.submit(),
                    FormEvent::Cancel => {
                        reset(&mut self.form.form, &self.template);
                        self.validation_error = None;
                        vec![toast("Form cleared", ToastLevel::Info)]
                    }
                    FormEvent::Ignored if key == KeyCode::Char('r') && !self.loading_areas => {
                        self.load_areas()
                    }
                    _ => Vec::new(),
                }
            }
        }
    }

    fn render(&self, f: &mut Frame, area: Rect, tick: u64) {
        let banners: Vec<&String> = [&self.load_error, &self.validation_error]
            .into_iter()
            .flatten()
            .collect();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(banners.len() as u16), Constraint::Min(3)])
            .split(area);
        if !banners.is_empty() {
            let lines: Vec<Line> = banners
                .into_iter()
                .map(|b| Line::from(Span::styled(b.clone(), crate::theme::text_error())))
                .collect();
            f.render_widget(Paragraph::new(lines), chunks[0]);
        }
        self.form.render(f, chunks[1], true, tick);
    }

    fn help_text(&self) -> String {
        if self.form.form.editing {
            "type to edit • ↑/↓ choose option • Enter commit • Esc done".into()
        } else {
            "↑/↓ move • Enter edit/activate • r reload areas".into()
        }
    }

    fn status_text(&self) -> Option<String> {
        if self.busy {
            Some("Saving valve…".into())
        } else if self.loading_areas {
            Some("Loading areas…".into())
        } else {
            None
        }
    }

    fn captures_input(&self) -> bool {
        self.form.form.editing
    }
}
