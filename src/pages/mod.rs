pub mod add_valve;
pub mod conversions;
pub mod dashboard;
pub mod valves;

use crate::app::Effect;
use crate::model::{ConsoleConfig, PageId};
use crate::services::api_client::ApiError;
use crate::services::loader::{Loaded, RequestKind};
use crossterm::event::KeyCode;
use ratatui::prelude::*;

/// Input to a page reducer.
#[derive(Debug)]
pub enum PageMsg {
    /// The page became visible; first open triggers its loads.
    Open,
    Key(KeyCode),
    Loaded {
        kind: RequestKind,
        token: Option<u64>,
        outcome: Result<Loaded, ApiError>,
    },
}

pub trait Page {
    fn id(&self) -> PageId;
    fn update(&mut self, msg: PageMsg) -> Vec<Effect>;
    fn render(&self, f: &mut Frame, area: Rect, tick: u64);
    fn help_text(&self) -> String;
    /// Spinner text for the footer while a call is in flight.
    fn status_text(&self) -> Option<String> {
        None
    }
    /// True while a text input owns the keyboard; global shortcuts stand back.
    fn captures_input(&self) -> bool {
        false
    }
}

pub fn build(id: PageId, cfg: &ConsoleConfig) -> Box<dyn Page> {
    match id {
        PageId::Dashboard => Box::new(dashboard::DashboardPage::new(&cfg.header)),
        PageId::AddValve => Box::new(add_valve::AddValvePage::new()),
        PageId::Valves => Box::new(valves::ValvesPage::new(cfg.use_api_filtering)),
        PageId::Conversions => Box::new(conversions::ConversionsPage::new(cfg.use_api_filtering)),
    }
}

pub(crate) fn toast(
    text: impl Into<String>,
    level: crate::ui::ToastLevel,
) -> Effect {
    let seconds = match level {
        crate::ui::ToastLevel::Error => 5,
        _ => 3,
    };
    Effect::ShowToast {
        text: text.into(),
        level,
        seconds,
    }
}
