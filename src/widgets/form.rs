use crate::widgets::chrome::panel_block;
use ratatui::prelude::*;
use ratatui::widgets::*;
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};

pub const OPTIONS_VISIBLE: usize = 8;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "svg", "tif", "tiff",
];

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    // Transient handle picked for upload; never part of a JSON payload
    File(Option<PathBuf>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::File(p) => p.is_none(),
        }
    }

    pub fn as_text(&self) -> &str {
        match self {
            FieldValue::Text(s) => s,
            FieldValue::File(_) => "",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    Text,
    // Bounds are control hints; authoritative checks live with the page
    Number {
        min: Option<String>,
        max: Option<String>,
        step: Option<String>,
    },
    Select {
        options: Vec<SelectOption>,
    },
    File {
        accept: &'static [&'static str],
    },
    Hidden,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormField {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    pub value: FieldValue,
    pub placeholder: Option<String>,
    pub warning: Option<String>,
    pub required: bool,
    pub show_warning: bool,
}

impl FormField {
    fn base(id: &str, label: &str, kind: FieldKind, value: FieldValue) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            value,
            placeholder: None,
            warning: None,
            required: false,
            show_warning: false,
        }
    }

    pub fn text(id: &str, label: &str) -> Self {
        Self::base(id, label, FieldKind::Text, FieldValue::Text(String::new()))
    }

    pub fn number(id: &str, label: &str, min: Option<&str>, max: Option<&str>, step: &str) -> Self {
        Self::base(
            id,
            label,
            FieldKind::Number {
                min: min.map(str::to_string),
                max: max.map(str::to_string),
                step: Some(step.to_string()),
            },
            FieldValue::Text(String::new()),
        )
    }

    pub fn select(id: &str, label: &str, options: Vec<SelectOption>) -> Self {
        Self::base(
            id,
            label,
            FieldKind::Select { options },
            FieldValue::Text(String::new()),
        )
    }

    pub fn image(id: &str, label: &str) -> Self {
        Self::base(
            id,
            label,
            FieldKind::File {
                accept: IMAGE_EXTENSIONS,
            },
            FieldValue::File(None),
        )
    }

    pub fn hidden(id: &str) -> Self {
        Self::base(id, "", FieldKind::Hidden, FieldValue::Text(String::new()))
    }

    pub fn placeholder(mut self, text: &str) -> Self {
        self.placeholder = Some(text.to_string());
        self
    }

    pub fn warning(mut self, text: &str) -> Self {
        self.warning = Some(text.to_string());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.show_warning = true;
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        if !matches!(self.kind, FieldKind::File { .. }) {
            self.value = FieldValue::Text(value.into());
        }
        self
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self.kind, FieldKind::Hidden)
    }

    /// Label of the chosen option for select fields.
    pub fn selected_label(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Select { options } => options
                .iter()
                .find(|o| o.value == self.value.as_text())
                .map(|o| o.label.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EditScratch {
    pub option_cursor: usize,
    pub path: String,
}

#[derive(Clone, Debug, Default)]
pub struct FormState {
    pub title: String,
    pub fields: Vec<FormField>,
    pub selected: usize,
    pub editing: bool,
    pub submitted: bool,
    pub disabled: bool,
    pub message: Option<String>,
    pub scratch: EditScratch,
    /// Button captions; `None` means Save / Cancel.
    pub buttons: Option<(&'static str, &'static str)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Field(usize),
    Save,
    Cancel,
}

impl FormState {
    pub fn new(title: impl Into<String>, fields: Vec<FormField>) -> Self {
        let title = title.into();
        debug_assert!(
            validate_form_ids(&fields).is_ok(),
            "form '{title}' has inconsistent field ids"
        );
        Self {
            title,
            fields,
            ..Default::default()
        }
    }

    pub fn with_buttons(mut self, submit: &'static str, cancel: &'static str) -> Self {
        self.buttons = Some((submit, cancel));
        self
    }

    pub fn field(&self, id: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn text(&self, id: &str) -> &str {
        self.field(id).map(|f| f.value.as_text()).unwrap_or("")
    }

    /// Navigable positions: visible fields followed by the two buttons.
    pub fn slots(&self) -> Vec<Slot> {
        let mut out: Vec<Slot> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_hidden())
            .map(|(i, _)| Slot::Field(i))
            .collect();
        out.push(Slot::Save);
        out.push(Slot::Cancel);
        out
    }

    pub fn current_slot(&self) -> Slot {
        let slots = self.slots();
        slots[self.selected.min(slots.len() - 1)]
    }

    pub fn current_field(&self) -> Option<&FormField> {
        match self.current_slot() {
            Slot::Field(i) => self.fields.get(i),
            _ => None,
        }
    }
}

pub fn validate_form_ids(fields: &[FormField]) -> Result<(), String> {
    use std::collections::HashSet;
    let mut ids = HashSet::new();
    for (i, f) in fields.iter().enumerate() {
        if !ids.insert(f.id.as_str()) {
            return Err(format!("duplicate field id: '{}' at index {}", f.id, i));
        }
        let file_value = matches!(f.value, FieldValue::File(_));
        let file_kind = matches!(f.kind, FieldKind::File { .. });
        if file_value != file_kind {
            return Err(format!("field '{}' value does not match its kind", f.id));
        }
    }
    Ok(())
}

/// Text accepted by a number control: finite, no surrounding whitespace.
pub fn is_numeric_text(s: &str) -> bool {
    if s.trim() != s {
        return false;
    }
    s.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false)
}

pub fn is_image_path(path: &Path, accept: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| accept.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Replace the value of field `id`, returning whether the change was taken.
///
/// Number fields absorb anything that is neither empty nor numeric. An
/// accepted change keeps the warning only while the form has been submitted
/// and the value is still empty; it never switches a warning on.
pub fn apply_change(form: &mut FormState, id: &str, value: FieldValue) -> bool {
    let Some(current) = form.field(id) else {
        return false;
    };
    match (&current.kind, &value) {
        (FieldKind::Number { .. }, FieldValue::Text(s)) => {
            if !s.is_empty() && !is_numeric_text(s) {
                return false;
            }
        }
        (FieldKind::File { .. }, FieldValue::File(_)) => {}
        (FieldKind::File { .. }, _) | (_, FieldValue::File(_)) => return false,
        _ => {}
    }
    let submitted = form.submitted;
    form.fields = form
        .fields
        .iter()
        .map(|f| {
            if f.id == id {
                FormField {
                    show_warning: submitted && value.is_empty() && f.show_warning,
                    value: value.clone(),
                    ..f.clone()
                }
            } else {
                f.clone()
            }
        })
        .collect();
    true
}

pub fn set_options(form: &mut FormState, id: &str, options: Vec<SelectOption>) {
    form.fields = form
        .fields
        .iter()
        .map(|f| match (&f.kind, f.id == id) {
            (FieldKind::Select { .. }, true) => FormField {
                kind: FieldKind::Select {
                    options: options.clone(),
                },
                ..f.clone()
            },
            _ => f.clone(),
        })
        .collect();
}

pub fn set_max(form: &mut FormState, id: &str, max: &str) {
    form.fields = form
        .fields
        .iter()
        .map(|f| match (&f.kind, f.id == id) {
            (FieldKind::Number { min, step, .. }, true) => FormField {
                kind: FieldKind::Number {
                    min: min.clone(),
                    max: Some(max.to_string()),
                    step: step.clone(),
                },
                ..f.clone()
            },
            _ => f.clone(),
        })
        .collect();
}

pub fn warning_visible(field: &FormField, submitted: bool) -> bool {
    field.show_warning && submitted && field.value.is_empty() && field.warning.is_some()
}

/// Mark the form submitted and raise warnings on required fields.
/// Returns the ids of required fields that are still empty.
pub fn begin_submit(form: &mut FormState) -> Vec<String> {
    form.submitted = true;
    for f in &mut form.fields {
        f.show_warning = f.required;
    }
    let missing: Vec<String> = form
        .fields
        .iter()
        .filter(|f| f.required && f.value.is_empty())
        .map(|f| f.id.clone())
        .collect();
    form.message = if missing.is_empty() {
        None
    } else {
        Some("Please fill in the highlighted fields".into())
    };
    missing
}

/// Restore a template after a successful submit.
pub fn reset(form: &mut FormState, template: &[FormField]) {
    // Keep fetched option lists across the reset
    let fields: Vec<FormField> = template
        .iter()
        .map(|t| match (&t.kind, form.field(&t.id)) {
            (FieldKind::Select { .. }, Some(cur)) => FormField {
                kind: cur.kind.clone(),
                ..t.clone()
            },
            _ => t.clone(),
        })
        .collect();
    form.fields = fields;
    form.submitted = false;
    form.editing = false;
    form.selected = 0;
    form.message = None;
}

/// Serialize fields into a request body. Empty non-text values become null,
/// select values that look like ids become integers and files are left out.
pub fn to_payload(form: &FormState) -> Map<String, JsonValue> {
    let mut out = Map::new();
    for f in &form.fields {
        let v = match (&f.kind, &f.value) {
            (FieldKind::File { .. }, _) | (_, FieldValue::File(_)) => continue,
            (FieldKind::Hidden, FieldValue::Text(s)) if s.is_empty() => continue,
            (FieldKind::Text | FieldKind::Hidden, FieldValue::Text(s)) => {
                JsonValue::String(s.clone())
            }
            (FieldKind::Number { .. }, FieldValue::Text(s)) => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            (FieldKind::Select { .. }, FieldValue::Text(s)) => {
                if s.is_empty() {
                    JsonValue::Null
                } else if let Ok(n) = s.parse::<i64>() {
                    JsonValue::from(n)
                } else {
                    JsonValue::String(s.clone())
                }
            }
        };
        out.insert(f.id.clone(), v);
    }
    out
}

pub fn file_attachments(form: &FormState) -> Vec<(String, PathBuf)> {
    form.fields
        .iter()
        .filter_map(|f| match &f.value {
            FieldValue::File(Some(p)) => Some((f.id.clone(), p.clone())),
            _ => None,
        })
        .collect()
}

fn number_hint(min: &Option<String>, max: &Option<String>, step: &Option<String>) -> String {
    let mut parts: Vec<String> = Vec::new();
    match (min.as_deref(), max.as_deref()) {
        (Some(lo), Some(hi)) if !hi.is_empty() => parts.push(format!("{lo}..{hi}")),
        (Some(lo), _) => parts.push(format!("≥ {lo}")),
        (None, Some(hi)) if !hi.is_empty() => parts.push(format!("≤ {hi}")),
        _ => {}
    }
    if let Some(s) = step {
        parts.push(format!("step {s}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("  [{}]", parts.join(", "))
    }
}

pub fn draw_form(f: &mut Frame, area: Rect, form: &FormState, highlight: bool, cursor_on: bool) {
    let mut lines: Vec<Line> = Vec::new();
    let current = form.current_slot();
    for (i, fld) in form.fields.iter().enumerate() {
        if fld.is_hidden() {
            continue;
        }
        let is_sel = current == Slot::Field(i);
        let sel = if is_sel { '›' } else { ' ' };
        let req = if fld.required { " *" } else { "" };
        let editing_here = form.editing && is_sel;
        let value_style = if is_sel {
            if form.editing {
                crate::theme::text_editing_bold()
            } else {
                crate::theme::text_active_bold()
            }
        } else {
            Style::default()
        };
        let prefix = Span::raw(format!("{sel} {}{req}: ", fld.label));
        match &fld.kind {
            FieldKind::Text | FieldKind::Number { .. } => {
                let mut spans = vec![prefix];
                let text = fld.value.as_text();
                if text.is_empty() && !editing_here {
                    if let Some(ph) = &fld.placeholder {
                        spans.push(Span::styled(ph.clone(), crate::theme::text_muted()));
                    }
                } else {
                    let mut val = text.to_string();
                    if editing_here && cursor_on {
                        val.push('▏');
                    }
                    spans.push(Span::styled(val, value_style));
                }
                if let FieldKind::Number { min, max, step } = &fld.kind {
                    spans.push(Span::styled(
                        number_hint(min, max, step),
                        crate::theme::text_muted(),
                    ));
                }
                lines.push(Line::from(spans));
            }
            FieldKind::Select { options } => {
                let summary = fld
                    .selected_label()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Select {}", fld.label));
                lines.push(Line::from(vec![prefix, Span::styled(summary, value_style)]));
                if editing_here {
                    // Entry 0 is the unselected placeholder
                    let total = options.len() + 1;
                    let cursor = form.scratch.option_cursor.min(total - 1);
                    let start = cursor.saturating_sub(OPTIONS_VISIBLE - 1);
                    let end = (start + OPTIONS_VISIBLE).min(total);
                    for oi in start..end {
                        let (value, label) = if oi == 0 {
                            ("", format!("Select {}", fld.label))
                        } else {
                            let o = &options[oi - 1];
                            (o.value.as_str(), o.label.clone())
                        };
                        let mark = if value == fld.value.as_text() { "(•)" } else { "( )" };
                        let cur = if oi == cursor { '›' } else { ' ' };
                        let st = if oi == cursor {
                            crate::theme::list_cursor_style()
                        } else {
                            crate::theme::text_muted()
                        };
                        lines.push(Line::from(Span::styled(
                            format!("  {cur} {mark} {label}"),
                            st,
                        )));
                    }
                }
            }
            FieldKind::File { accept } => {
                let chosen = match &fld.value {
                    FieldValue::File(Some(p)) => p
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| p.display().to_string()),
                    _ => "(no file)".to_string(),
                };
                lines.push(Line::from(vec![
                    prefix,
                    Span::styled(chosen, value_style),
                    Span::styled(
                        format!("  [{}]", accept.join(", ")),
                        crate::theme::text_muted(),
                    ),
                ]));
                if editing_here {
                    let mut buf = form.scratch.path.clone();
                    if cursor_on {
                        buf.push('▏');
                    }
                    lines.push(Line::from(vec![
                        Span::styled("    path: ", crate::theme::text_muted()),
                        Span::styled(buf, value_style),
                    ]));
                }
            }
            FieldKind::Hidden => {}
        }
        if warning_visible(fld, form.submitted) {
            if let Some(w) = &fld.warning {
                lines.push(Line::from(Span::styled(
                    format!("  ! {w}"),
                    crate::theme::text_error(),
                )));
            }
        }
    }
    if !form.fields.is_empty() {
        lines.push(Line::from(""));
    }
    let can_save = !form.disabled;
    let mut save_style = if can_save {
        crate::theme::text_active_bold()
    } else {
        crate::theme::text_muted()
    };
    let mut cancel_style = crate::theme::text_muted();
    match current {
        Slot::Save => save_style = crate::theme::list_cursor_style(),
        Slot::Cancel => cancel_style = crate::theme::list_cursor_style(),
        Slot::Field(_) => {}
    }
    let (submit, cancel) = form.buttons.unwrap_or(("Save", "Cancel"));
    let save_label = if form.disabled {
        "[ Saving… ]".to_string()
    } else {
        format!("[ {submit} ]")
    };
    lines.push(Line::from(vec![
        Span::styled(format!("  {save_label}  "), save_style),
        Span::styled(cancel, cancel_style),
    ]));
    if let Some(msg) = &form.message {
        lines.push(Line::from(Span::styled(
            msg.clone(),
            crate::theme::text_muted(),
        )));
    }
    let title = if form.editing {
        format!("{} (editing)", form.title)
    } else {
        form.title.clone()
    };
    let block = panel_block(&title, highlight);
    let p = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}
