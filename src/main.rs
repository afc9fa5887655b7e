#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

use anyhow::Context;
use seltrans::config::SettingsStore;
use seltrans::{logger, relay, ui};
use std::fs;
use std::sync::Arc;

fn main() {
    // Init logger first
    logger::init();
    log::info!("App starting");
    if let Err(e) = run() {
        log::error!("fatal: {:#}", e);
        eprintln!("seltrans: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    // Settings file next to exe; env vars override without being saved.
    let store = Arc::new(SettingsStore::open(SettingsStore::default_path()).with_env_overrides());
    if store.get().api_key.is_empty() {
        log::warn!("No API key configured; open Settings or set SELTRANS_API_KEY");
    }

    let relay = relay::spawn_worker().context("starting relay worker")?;

    let page = match std::env::args().nth(1) {
        Some(path) => fs::read_to_string(&path).with_context(|| format!("reading {}", path))?,
        None => ui::SAMPLE_PAGE.to_string(),
    };

    // Run UI on main thread (blocks)
    ui::run(store, relay, page)
}
