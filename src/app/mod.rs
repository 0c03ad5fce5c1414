use crate::model::PageId;
use crate::pages::{toast, PageMsg};
use crate::records::ValveLog;
use crate::services::export::ExportFormat;
use crate::services::loader::{ApiRequest, LoadMsg};
use crate::ui::{AppState, ToastLevel};
use crossterm::event::KeyCode;

pub enum AppMsg {
    /// Show the tab at this index; the first visit starts its loads.
    OpenTab(usize),
    Key(KeyCode),
    Loaded(LoadMsg),
}

#[derive(Debug)]
pub enum Effect {
    Api {
        page: PageId,
        request: ApiRequest,
    },
    ShowToast {
        text: String,
        level: ToastLevel,
        seconds: u64,
    },
    CopyToClipboard {
        text: String,
        what: String,
    },
    ExportLogs {
        format: ExportFormat,
        logs: Vec<ValveLog>,
    },
    SwitchPage(PageId),
}

pub const DEBUG_KEY: KeyCode = KeyCode::F(12);

pub fn update(state: &mut AppState, msg: AppMsg) -> Vec<Effect> {
    use AppMsg::*;
    match msg {
        OpenTab(index) => open_tab(state, index),
        Key(key) => on_key(state, key),
        Loaded(m) => {
            match &m.outcome {
                Ok(_) => state.dbg(format!("{:?} {:?} ok", m.page, m.kind)),
                Err(e) => state.dbg(format!("{:?} {:?} failed: {e}", m.page, m.kind)),
            }
            // Results go to the page that asked, even when another tab is showing
            match state.page_mut(m.page) {
                Some(page) => page.update(PageMsg::Loaded {
                    kind: m.kind,
                    token: m.token,
                    outcome: m.outcome,
                }),
                None => Vec::new(),
            }
        }
    }
}

fn on_key(state: &mut AppState, key: KeyCode) -> Vec<Effect> {
    let capturing = state
        .current_page()
        .map(|p| p.captures_input())
        .unwrap_or(false);
    if !capturing {
        match key {
            k if k == DEBUG_KEY => {
                state.show_debug = !state.show_debug;
                return Vec::new();
            }
            KeyCode::F(n) => {
                return match crate::widgets::tabs::handle_function_key(state, n) {
                    Some(index) => open_tab(state, index),
                    None => Vec::new(),
                };
            }
            KeyCode::Char('q') => {
                state.quit = true;
                return Vec::new();
            }
            _ => {}
        }
    }
    match state.current_page_mut() {
        Some(page) => page.update(PageMsg::Key(key)),
        None => Vec::new(),
    }
}

fn open_tab(state: &mut AppState, index: usize) -> Vec<Effect> {
    let Some(page) = state.pages.get_mut(index) else {
        return Vec::new();
    };
    let effects = page.update(PageMsg::Open);
    let title = page.id().title();
    state.tab_index = index;
    state.dbg(format!("open tab {index}: {title}"));
    effects
}

/// Jump to a page by id, as requested by a dashboard link.
pub fn switch_to(state: &mut AppState, id: PageId) -> Vec<Effect> {
    match state.config.pages.iter().position(|p| *p == id) {
        Some(index) => open_tab(state, index),
        None => vec![toast(
            format!("{} is not enabled in this console.", id.title()),
            ToastLevel::Info,
        )],
    }
}
