use crate::widgets::form::{
    apply_change, draw_form, is_image_path, FieldKind, FieldValue, FormState, Slot,
};
use crossterm::event::KeyCode;
use ratatui::prelude::*;
use std::path::PathBuf;

/// What a key press did to the form, for the owning page to react to.
#[derive(Clone, Debug, PartialEq)]
pub enum FormEvent {
    /// The key means nothing to the form; the page may use it.
    Ignored,
    Handled,
    Changed { id: String, value: FieldValue },
    Submit,
    Cancel,
}

#[derive(Clone, Debug, Default)]
pub struct FormWidget {
    pub form: FormState,
}

impl FormWidget {
    pub fn new(form: FormState) -> Self {
        Self { form }
    }

    pub fn render(&self, f: &mut Frame, area: Rect, focused: bool, tick: u64) {
        let cursor_on = tick % 2 == 0;
        draw_form(f, area, &self.form, focused, cursor_on);
    }

    fn change(&mut self, id: String, value: FieldValue) -> FormEvent {
        if apply_change(&mut self.form, &id, value.clone()) {
            FormEvent::Changed { id, value }
        } else {
            FormEvent::Handled
        }
    }

    pub fn on_key(&mut self, key: KeyCode) -> FormEvent {
        if self.form.editing {
            return self.on_edit_key(key);
        }
        let slots = self.form.slots();
        let last = slots.len() - 1;
        match key {
            KeyCode::Up => {
                self.form.selected = self.form.selected.min(last).saturating_sub(1);
                FormEvent::Handled
            }
            KeyCode::Down => {
                self.form.selected = (self.form.selected + 1).min(last);
                FormEvent::Handled
            }
            KeyCode::Esc => FormEvent::Cancel,
            KeyCode::Enter => match self.form.current_slot() {
                Slot::Save if self.form.disabled => FormEvent::Handled,
                Slot::Save => FormEvent::Submit,
                Slot::Cancel => FormEvent::Cancel,
                Slot::Field(i) => {
                    if self.form.disabled {
                        return FormEvent::Handled;
                    }
                    let Some(fld) = self.form.fields.get(i) else {
                        return FormEvent::Handled;
                    };
                    match &fld.kind {
                        FieldKind::Select { options } => {
                            let cur = fld.value.as_text();
                            self.form.scratch.option_cursor = options
                                .iter()
                                .position(|o| o.value == cur)
                                .map(|p| p + 1)
                                .unwrap_or(0);
                        }
                        // File inputs never show the previous pick
                        FieldKind::File { .. } => self.form.scratch.path.clear(),
                        _ => {}
                    }
                    self.form.message = None;
                    self.form.editing = true;
                    FormEvent::Handled
                }
            },
            _ => FormEvent::Ignored,
        }
    }

    fn on_edit_key(&mut self, key: KeyCode) -> FormEvent {
        let Some(fld) = self.form.current_field().cloned() else {
            self.form.editing = false;
            return FormEvent::Handled;
        };
        match &fld.kind {
            FieldKind::Text | FieldKind::Number { .. } => match key {
                KeyCode::Char(c) => {
                    let mut next = fld.value.as_text().to_string();
                    next.push(c);
                    self.change(fld.id, FieldValue::Text(next))
                }
                KeyCode::Backspace => {
                    let mut next = fld.value.as_text().to_string();
                    if next.pop().is_none() {
                        return FormEvent::Handled;
                    }
                    self.change(fld.id, FieldValue::Text(next))
                }
                KeyCode::Enter | KeyCode::Esc | KeyCode::Tab => {
                    self.form.editing = false;
                    FormEvent::Handled
                }
                _ => FormEvent::Handled,
            },
            FieldKind::Select { options } => {
                let total = options.len() + 1;
                let cursor = &mut self.form.scratch.option_cursor;
                match key {
                    KeyCode::Up => {
                        *cursor = cursor.saturating_sub(1);
                        FormEvent::Handled
                    }
                    KeyCode::Down => {
                        *cursor = (*cursor + 1).min(total - 1);
                        FormEvent::Handled
                    }
                    KeyCode::Enter => {
                        // Options can be replaced while the list is open
                        let value = match *cursor {
                            0 => String::new(),
                            n => options
                                .get(n - 1)
                                .map(|o| o.value.clone())
                                .unwrap_or_default(),
                        };
                        self.form.editing = false;
                        self.change(fld.id, FieldValue::Text(value))
                    }
                    KeyCode::Esc => {
                        self.form.editing = false;
                        FormEvent::Handled
                    }
                    _ => FormEvent::Handled,
                }
            }
            FieldKind::File { accept } => match key {
                KeyCode::Char(c) => {
                    self.form.scratch.path.push(c);
                    FormEvent::Handled
                }
                KeyCode::Backspace => {
                    self.form.scratch.path.pop();
                    FormEvent::Handled
                }
                KeyCode::Esc => {
                    self.form.editing = false;
                    self.form.scratch.path.clear();
                    FormEvent::Handled
                }
                KeyCode::Enter => {
                    let typed = self.form.scratch.path.trim().to_string();
                    if typed.is_empty() {
                        self.form.editing = false;
                        return self.change(fld.id, FieldValue::File(None));
                    }
                    let path = PathBuf::from(&typed);
                    if !is_image_path(&path, accept) {
                        self.form.message =
                            Some(format!("Only image files are accepted ({})", accept.join(", ")));
                        return FormEvent::Handled;
                    }
                    if !path.is_file() {
                        self.form.message = Some(format!("File not found: {typed}"));
                        return FormEvent::Handled;
                    }
                    self.form.editing = false;
                    self.form.scratch.path.clear();
                    self.form.message = None;
                    self.change(fld.id, FieldValue::File(Some(path)))
                }
                _ => FormEvent::Handled,
            },
            FieldKind::Hidden => {
                self.form.editing = false;
                FormEvent::Handled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::form::{set_options, FormField, SelectOption};

    fn widget() -> FormWidget {
        FormWidget::new(FormState::new(
            "Test",
            vec![
                FormField::text("name", "Name").required(),
                FormField::number("current_condition", "Current", Some("0"), Some("1000"), "0.01"),
                FormField::select(
                    "area_id",
                    "Area",
                    vec![SelectOption::new("1", "Kochi"), SelectOption::new("2", "Kollam")],
                ),
                FormField::image("area_image", "Area Image"),
            ],
        ))
    }

    fn type_str(w: &mut FormWidget, s: &str) -> Vec<FormEvent> {
        s.chars().map(|c| w.on_key(KeyCode::Char(c))).collect()
    }

    #[test]
    fn invalid_number_keystrokes_fire_no_change() {
        let mut w = widget();
        w.on_key(KeyCode::Down);
        w.on_key(KeyCode::Enter);
        let events = type_str(&mut w, "1a2.x5");
        assert_eq!(w.form.text("current_condition"), "12.5");
        let changed = events
            .iter()
            .filter(|e| matches!(e, FormEvent::Changed { .. }))
            .count();
        assert_eq!(changed, 4);
        assert_eq!(events[1], FormEvent::Handled);
    }

    #[test]
    fn backspace_can_empty_a_number() {
        let mut w = widget();
        w.on_key(KeyCode::Down);
        w.on_key(KeyCode::Enter);
        type_str(&mut w, "7");
        assert!(matches!(w.on_key(KeyCode::Backspace), FormEvent::Changed { .. }));
        assert_eq!(w.form.text("current_condition"), "");
        assert_eq!(w.on_key(KeyCode::Backspace), FormEvent::Handled);
    }

    #[test]
    fn select_picks_option_and_placeholder() {
        let mut w = widget();
        w.on_key(KeyCode::Down);
        w.on_key(KeyCode::Down);
        w.on_key(KeyCode::Enter);
        w.on_key(KeyCode::Down);
        w.on_key(KeyCode::Down);
        let ev = w.on_key(KeyCode::Enter);
        assert_eq!(
            ev,
            FormEvent::Changed {
                id: "area_id".into(),
                value: FieldValue::Text("2".into())
            }
        );
        // Re-opening starts on the chosen option
        w.on_key(KeyCode::Enter);
        assert_eq!(w.form.scratch.option_cursor, 2);
        w.on_key(KeyCode::Up);
        w.on_key(KeyCode::Up);
        w.on_key(KeyCode::Enter);
        assert_eq!(w.form.text("area_id"), "");
    }

    #[test]
    fn emptied_options_commit_as_unselected() {
        let mut w = widget();
        w.on_key(KeyCode::Down);
        w.on_key(KeyCode::Down);
        w.on_key(KeyCode::Enter);
        w.on_key(KeyCode::Down);
        w.on_key(KeyCode::Down);
        // A reload returned no areas while the list was open
        set_options(&mut w.form, "area_id", Vec::new());
        let ev = w.on_key(KeyCode::Enter);
        assert_eq!(
            ev,
            FormEvent::Changed {
                id: "area_id".into(),
                value: FieldValue::Text(String::new())
            }
        );
        assert!(!w.form.editing);
    }

    #[test]
    fn file_field_only_accepts_existing_images() {
        let mut w = widget();
        for _ in 0..3 {
            w.on_key(KeyCode::Down);
        }
        w.on_key(KeyCode::Enter);
        type_str(&mut w, "notes.txt");
        assert_eq!(w.on_key(KeyCode::Enter), FormEvent::Handled);
        assert!(w.form.message.as_deref().unwrap().starts_with("Only image files"));
        assert!(w.form.editing);

        let img = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        w.form.scratch.path = img.path().display().to_string();
        let ev = w.on_key(KeyCode::Enter);
        assert!(matches!(ev, FormEvent::Changed { .. }));
        assert!(!w.form.editing);
        assert_eq!(
            w.form.field("area_image").unwrap().value,
            FieldValue::File(Some(img.path().to_path_buf()))
        );

        // The path buffer starts empty on the next edit
        w.on_key(KeyCode::Enter);
        assert!(w.form.scratch.path.is_empty());
    }

    #[test]
    fn save_and_cancel_buttons() {
        let mut w = widget();
        for _ in 0..10 {
            w.on_key(KeyCode::Down);
        }
        assert_eq!(w.form.current_slot(), Slot::Cancel);
        assert_eq!(w.on_key(KeyCode::Enter), FormEvent::Cancel);
        w.on_key(KeyCode::Up);
        assert_eq!(w.on_key(KeyCode::Enter), FormEvent::Submit);
        w.form.disabled = true;
        assert_eq!(w.on_key(KeyCode::Enter), FormEvent::Handled);
        assert_eq!(w.on_key(KeyCode::Char('x')), FormEvent::Ignored);
    }
}
