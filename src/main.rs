mod app;
mod listing;
mod model;
mod pages;
mod permissions;
mod records;
mod services;
mod theme;
mod ui;
mod widgets;

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

// The terminal belongs to the UI, so logs only go to the configured file
fn init_logging(log_file: Option<&str>) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {path}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cfg = model::load_config()?;
    init_logging(cfg.log_file.as_deref())?;
    ui::run(cfg)
}
