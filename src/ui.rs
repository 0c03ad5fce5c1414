use crate::app::{switch_to, update, AppMsg, Effect};
use crate::model::{ConsoleConfig, PageId};
use crate::pages::{self, Page};
use crate::services::api_client::ApiClient;
use crate::services::export::export_logs;
use crate::services::loader::{spawn_request, LoadMsg};
use crate::widgets::status_bar::draw_footer_combined;
use crate::widgets::tabs::draw_page_tabs;
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const TICK_RATE: Duration = Duration::from_millis(200);
const TICKS_PER_SECOND: u64 = 5;
const DEBUG_PANE_H: u16 = 8;
const GLOBAL_HELP: &str = "F1-F4 pages • F12 debug • q quit";

pub struct AppState {
    pub config: ConsoleConfig,
    pub theme: crate::theme::Theme,
    pub tick: u64,
    pub tab_index: usize,
    pub pages: Vec<Box<dyn Page>>,
    pub toast: Option<Toast>,
    pub show_debug: bool,
    pub quit: bool,
    // Debug log (rendered in the bottom debug pane)
    pub debug_log: VecDeque<String>,
    api: Option<Arc<ApiClient>>,
    tx: Option<Sender<LoadMsg>>,
    rx: Option<Receiver<LoadMsg>>,
}

impl AppState {
    pub fn new(config: ConsoleConfig) -> Self {
        let pages = config
            .pages
            .iter()
            .map(|id| pages::build(*id, &config))
            .collect();
        Self {
            config,
            theme: crate::theme::Theme::harbour_dark(),
            tick: 0,
            tab_index: 0,
            pages,
            toast: None,
            show_debug: false,
            quit: false,
            debug_log: VecDeque::new(),
            api: None,
            tx: None,
            rx: None,
        }
    }

    pub fn current_page(&self) -> Option<&dyn Page> {
        self.pages.get(self.tab_index).map(|p| p.as_ref())
    }

    pub fn current_page_mut(&mut self) -> Option<&mut Box<dyn Page>> {
        self.pages.get_mut(self.tab_index)
    }

    pub fn page_mut(&mut self, id: PageId) -> Option<&mut Box<dyn Page>> {
        self.pages.iter_mut().find(|p| p.id() == id)
    }

    pub fn dbg(&mut self, msg: impl Into<String>) {
        const MAX_LOG_LINES: usize = 200;
        let msg = msg.into();
        debug!("{msg}");
        if self.debug_log.len() >= MAX_LOG_LINES {
            self.debug_log.pop_front();
        }
        self.debug_log.push_back(msg);
    }

    fn show_toast(&mut self, text: String, level: ToastLevel, seconds: u64) {
        let exp = self
            .tick
            .saturating_add(seconds.saturating_mul(TICKS_PER_SECOND));
        self.toast = Some(Toast {
            text,
            level,
            expires_at_tick: exp,
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

pub struct Toast {
    pub text: String,
    pub level: ToastLevel,
    pub expires_at_tick: u64,
}

fn run_effects(state: &mut AppState, effects: Vec<Effect>) {
    for eff in effects {
        match eff {
            Effect::Api { page, request } => {
                state.dbg(format!("request {page:?} {:?}", request.kind()));
                match (&state.api, &state.tx) {
                    (Some(api), Some(tx)) => spawn_request(api.clone(), page, request, tx.clone()),
                    _ => warn!(?page, kind = ?request.kind(), "no API client; request dropped"),
                }
            }
            Effect::ShowToast {
                text,
                level,
                seconds,
            } => state.show_toast(text, level, seconds),
            Effect::CopyToClipboard { text, what } => {
                match arboard::Clipboard::new().and_then(|mut c| c.set_text(text.clone())) {
                    Ok(()) => {
                        state.show_toast(format!("{what} copied to clipboard"), ToastLevel::Success, 3)
                    }
                    Err(e) => {
                        // No clipboard (e.g. over SSH): show the text instead
                        warn!(error = %e, "clipboard unavailable");
                        state.show_toast(format!("{what}: {text}"), ToastLevel::Info, 10);
                    }
                }
            }
            Effect::ExportLogs { format, logs } => {
                let dir = state.config.export_dir.clone();
                match export_logs(format, &logs, Path::new(&dir)) {
                    Ok(path) => {
                        state.dbg(format!("exported {}", path.display()));
                        state.show_toast(
                            format!("{} saved to {}", format.label(), path.display()),
                            ToastLevel::Success,
                            3,
                        );
                    }
                    Err(e) => {
                        error!(error = %format!("{e:#}"), "log export failed");
                        state.show_toast(
                            format!("Failed to export logs: {e:#}"),
                            ToastLevel::Error,
                            5,
                        );
                    }
                }
            }
            Effect::SwitchPage(id) => {
                let effs = switch_to(state, id);
                run_effects(state, effs);
            }
        }
    }
}

fn pump_loads(state: &mut AppState) -> usize {
    let mut drained: Vec<LoadMsg> = Vec::new();
    if let Some(rx) = &state.rx {
        while let Ok(msg) = rx.try_recv() {
            drained.push(msg);
        }
    }
    let n = drained.len();
    for msg in drained {
        let effects = update(state, AppMsg::Loaded(msg));
        run_effects(state, effects);
    }
    n
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

/// Tab index for a page named by id (`valves`) or title (`Add Valve`).
fn page_index(state: &AppState, name: &str) -> Option<usize> {
    let wanted = name.trim().to_lowercase().replace(['-', ' '], "_");
    state.config.pages.iter().position(|p| {
        p.title().to_lowercase().replace(' ', "_") == wanted
            || format!("{p:?}").to_lowercase() == wanted.replace('_', "")
    })
}

pub fn run(config: ConsoleConfig) -> Result<()> {
    let api = ApiClient::new(&config.api).context("building API client")?;
    let mut state = AppState::new(config);
    state.api = Some(Arc::new(api));
    let (tx, rx) = mpsc::channel::<LoadMsg>();
    state.tx = Some(tx);
    state.rx = Some(rx);
    info!(pages = state.pages.len(), "console starting");

    // Headless smoke mode
    if env_flag("KWA_TUI_HEADLESS") {
        return run_headless(state);
    }

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let res = event_loop(&mut terminal, &mut state);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

fn event_loop<B: Backend>(terminal: &mut Terminal<B>, state: &mut AppState) -> Result<()> {
    let effs = update(state, AppMsg::OpenTab(0));
    run_effects(state, effs);
    let mut last_tick = Instant::now();
    while !state.quit {
        terminal.draw(|f| ui(f, state))?;
        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let effs = update(state, AppMsg::Key(key.code));
                    run_effects(state, effs);
                }
            }
        }
        pump_loads(state);
        if last_tick.elapsed() >= TICK_RATE {
            state.tick = state.tick.wrapping_add(1);
            last_tick = Instant::now();
        }
    }
    info!("console closed");
    Ok(())
}

fn run_headless(mut state: AppState) -> Result<()> {
    let ticks: u64 = std::env::var("KWA_TUI_TICKS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(10);
    let start = std::env::var("KWA_TUI_HEADLESS_PAGE")
        .ok()
        .and_then(|name| page_index(&state, &name))
        .unwrap_or(0);
    let backend = ratatui::backend::TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend)?;
    let effs = update(&mut state, AppMsg::OpenTab(start));
    run_effects(&mut state, effs);
    let mut loaded = 0usize;
    let mut error_seen = false;
    for _ in 0..ticks {
        terminal.draw(|f| ui(f, &mut state))?;
        loaded += pump_loads(&mut state);
        if matches!(&state.toast, Some(t) if t.level == ToastLevel::Error) {
            error_seen = true;
        }
        state.tick = state.tick.wrapping_add(1);
        std::thread::sleep(TICK_RATE);
    }
    if env_flag("KWA_TUI_SMOKE_SUMMARY") {
        let summary = serde_json::json!({
            "ok": !error_seen,
            "page": state.current_page().map(|p| p.id().title()),
            "pages": state.pages.len(),
            "loaded": loaded,
            "ticks": ticks,
        });
        println!("{summary}");
    }
    Ok(())
}

fn ui(f: &mut Frame, state: &mut AppState) {
    // Clear expired toast
    if let Some(t) = &state.toast {
        if state.tick >= t.expires_at_tick {
            state.toast = None;
        }
    }

    let screen = f.area();
    let bg = Block::default().style(Style::default().bg(state.theme.bg));
    f.render_widget(bg, screen);

    let debug_h = if state.show_debug { DEBUG_PANE_H } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(debug_h),
            Constraint::Length(1),
        ])
        .split(screen);

    draw_page_tabs(f, chunks[0], state);
    let help = match state.current_page() {
        Some(page) => {
            page.render(f, chunks[1], state.tick);
            format!("{} • {GLOBAL_HELP}", page.help_text())
        }
        None => {
            let p = Paragraph::new("No pages configured.")
                .block(crate::widgets::chrome::panel_block(&state.config.header, false));
            f.render_widget(p, chunks[1]);
            GLOBAL_HELP.to_string()
        }
    };
    if state.show_debug {
        draw_debug(f, chunks[2], state);
    }
    draw_footer_combined(f, chunks[3], state, &help);
}

fn draw_debug(f: &mut Frame, area: Rect, state: &AppState) {
    let b = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            "Debug",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        ));
    // Take last `area.height` lines
    let h = area.height as usize;
    let start = state.debug_log.len().saturating_sub(h);
    let lines: Vec<Line> = state
        .debug_log
        .iter()
        .skip(start)
        .map(|s| Line::raw(s.clone()))
        .collect();
    let p = Paragraph::new(lines)
        .style(Style::default().fg(Color::Gray))
        .block(b)
        .wrap(Wrap { trim: true });
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn screen_text(state: &mut AppState) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
        terminal.draw(|f| ui(f, state)).unwrap();
        let buf = terminal.backend().buffer().clone();
        (0..buf.area.height)
            .map(|y| (0..buf.area.width).map(|x| buf[(x, y)].symbol()).collect())
            .collect()
    }

    #[test]
    fn tabs_header_and_footer_render() {
        let mut state = AppState::new(ConsoleConfig::default());
        let lines = screen_text(&mut state);
        assert!(lines[0].contains("Kerala Water Authority"));
        assert!(lines[1].contains("[F1] Dashboard"));
        assert!(lines[1].contains("[F4] Conversions"));
        assert!(lines[23].contains("q quit"));
    }

    #[test]
    fn expired_toast_is_cleared_on_draw() {
        let mut state = AppState::new(ConsoleConfig::default());
        state.show_toast("Saved".into(), ToastLevel::Success, 1);
        assert_eq!(state.toast.as_ref().unwrap().expires_at_tick, 5);
        let lines = screen_text(&mut state);
        assert!(lines[23].contains("[OK] Saved"));
        state.tick = 5;
        screen_text(&mut state);
        assert!(state.toast.is_none());
    }

    #[test]
    fn debug_log_is_bounded() {
        let mut state = AppState::new(ConsoleConfig::default());
        for i in 0..250 {
            state.dbg(format!("line {i}"));
        }
        assert_eq!(state.debug_log.len(), 200);
        assert_eq!(state.debug_log.front().unwrap(), "line 50");
    }

    #[test]
    fn api_effects_without_client_are_dropped() {
        let mut state = AppState::new(ConsoleConfig::default());
        run_effects(
            &mut state,
            vec![Effect::Api {
                page: PageId::Valves,
                request: crate::services::loader::ApiRequest::Areas,
            }],
        );
        assert!(state.debug_log.back().unwrap().contains("Areas"));
    }

    #[test]
    fn switch_effect_opens_the_target_tab() {
        let mut state = AppState::new(ConsoleConfig::default());
        run_effects(&mut state, vec![Effect::SwitchPage(PageId::Conversions)]);
        assert_eq!(state.tab_index, 3);
    }

    #[test]
    fn export_effect_writes_into_export_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::new(ConsoleConfig {
            export_dir: dir.path().display().to_string(),
            ..ConsoleConfig::default()
        });
        run_effects(
            &mut state,
            vec![Effect::ExportLogs {
                format: crate::services::export::ExportFormat::Xlsx,
                logs: Vec::new(),
            }],
        );
        assert!(dir.path().join("valve_logs.xlsx").is_file());
        assert_eq!(state.toast.as_ref().unwrap().level, ToastLevel::Success);
    }

    #[test]
    fn page_names_resolve_to_tabs() {
        let state = AppState::new(ConsoleConfig::default());
        assert_eq!(page_index(&state, "valves"), Some(2));
        assert_eq!(page_index(&state, "Add Valve"), Some(1));
        assert_eq!(page_index(&state, "add_valve"), Some(1));
        assert_eq!(page_index(&state, "reports"), None);
    }
}
