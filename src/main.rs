mod analysis;
mod composition;
mod domain;
mod empirical;
mod error;
mod excel;
mod notice;
mod periods;
mod server;
mod settings;
mod stats;
mod trend;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::{RwLock, broadcast};

use crate::excel::load_workbook;
use crate::server::{AppState, ReportData, WsMessage};
use crate::settings::Settings;
use crate::watcher::{WatcherConfig, watch_file};

/// Weight and energy balance analytics from a daily log.
#[derive(Parser, Debug)]
#[command(name = "energymodel")]
#[command(about = "Personal weight tracking analytics with caloric inference")]
#[command(version)]
struct Args {
    /// Path to the Excel file containing the weight log.
    /// Can also be set via ENERGYMODEL_FILE environment variable.
    #[arg(value_name = "FILE", env = "ENERGYMODEL_FILE")]
    file: PathBuf,

    /// Path to the JSON settings file. Created on first calibration.
    /// Can also be set via ENERGYMODEL_SETTINGS environment variable.
    #[arg(
        long,
        value_name = "SETTINGS",
        env = "ENERGYMODEL_SETTINGS",
        default_value = "energymodel.json"
    )]
    settings: PathBuf,

    /// Port number for the web server.
    /// Can also be set via ENERGYMODEL_PORT environment variable.
    #[arg(value_name = "PORT", env = "ENERGYMODEL_PORT", default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    // Get canonical file path for watching
    let file_path = args
        .file
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", args.file.display()))?;

    println!("Loading weight log from: {}", file_path.display());
    let initial_data = load_and_analyze(&file_path, &args.settings)?;

    // Create broadcast channel for WebSocket notifications
    let (ws_tx, _) = broadcast::channel::<WsMessage>(16);

    let state = Arc::new(AppState {
        data: RwLock::new(initial_data),
        file_path: file_path.clone(),
        settings_path: args.settings.clone(),
        ws_broadcast: ws_tx,
    });

    let static_dir = find_static_dir()?;
    println!();
    println!("Static files: {}", static_dir.display());

    // Spawn file watcher
    let watcher_state = state.clone();
    let watcher_path = file_path.clone();
    tokio::spawn(async move {
        let config = WatcherConfig::default();
        let retry_config = config.clone();

        if let Err(e) = watch_file(&watcher_path, config, move || {
            let state = watcher_state.clone();
            let config = retry_config.clone();
            tokio::spawn(async move {
                reload_with_retry(&state, &config).await;
            });
        })
        .await
        {
            log::error!("File watcher error: {}", e);
        }
    });

    println!();
    println!("Live reload enabled - watching for file changes");
    server::run_server(state, args.port, static_dir).await?;

    Ok(())
}

/// Loads the workbook and settings, runs the analysis pipeline, and
/// persists any calibration update the composition pass produced.
fn load_and_analyze(file_path: &Path, settings_path: &Path) -> Result<ReportData> {
    let mut settings = Settings::load(settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let loaded = load_workbook(file_path)
        .with_context(|| format!("Failed to load weight log from {}", file_path.display()))?;

    println!();
    println!("=== Weight Log Summary ===");
    println!();
    println!("Entries: {}", loaded.entries.len());
    if let (Some(first), Some(last)) = (loaded.entries.first_date(), loaded.entries.last_date()) {
        println!("Date range: {} to {}", first, last);
    }
    if !loaded.measurements.is_empty() {
        println!("Body measurements: {}", loaded.measurements.len());
    }

    let report = analysis::run(&loaded.entries, &loaded.measurements, &settings);

    println!();
    println!("=== Analysis ===");
    println!("Periods: {}", report.periods.len());
    match &report.inference {
        Some(inf) => println!(
            "Trend: {:+.3} kg/week ({})",
            inf.slope_kg_per_day * 7.0,
            if inf.reliable { "reliable" } else { "preliminary" }
        ),
        None => println!("Trend: insufficient data"),
    }
    match report.empirical.kcal_per_kg {
        Some(k) => println!(
            "Empirical conversion: {:.0} kcal/kg ({:?})",
            k, report.empirical.stability
        ),
        None => println!("Empirical conversion: insufficient data"),
    }
    if let Some(notice) = &report.notice {
        println!(
            "Intake notice: {:?} ({:+.0} kcal/day)",
            notice.direction, notice.suggested_adjustment_kcal
        );
    }

    // Commit the calibration proposal so the next cycle starts from it.
    if let Some(updated) = report.updated_calibration {
        settings.calibration = updated;
        settings
            .save(settings_path)
            .with_context(|| format!("Failed to save settings to {}", settings_path.display()))?;
        log::info!(
            "Calibration updated: muscle gain {:.2}, fat loss {:.2}",
            updated.muscle_gain_factor,
            updated.fat_loss_factor
        );
    }

    Ok(ReportData {
        log: loaded.entries,
        measurements: loaded.measurements,
        report,
        settings,
        last_reload: Utc::now(),
    })
}

/// Reloads data with retry logic for transient failures.
async fn reload_with_retry(state: &AppState, config: &WatcherConfig) {
    let mut last_error = None;

    for attempt in 0..config.retry_attempts {
        match load_and_analyze(&state.file_path, &state.settings_path) {
            Ok(new_data) => {
                let mut data = state.data.write().await;
                *data = new_data;
                drop(data);

                log::info!("Data reloaded successfully");

                let _ = state.ws_broadcast.send(WsMessage::DataUpdated);
                return;
            }
            Err(e) => {
                log::warn!("Reload attempt {} failed: {}", attempt + 1, e);
                last_error = Some(e);
                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }

    if let Some(e) = last_error {
        log::error!(
            "Failed to reload data after {} attempts: {}",
            config.retry_attempts,
            e
        );

        let _ = state
            .ws_broadcast
            .send(WsMessage::Error("Failed to reload data".into()));
    }
}

/// Finds the static directory for serving frontend files.
fn find_static_dir() -> Result<PathBuf> {
    // Try relative to current working directory
    let cwd_static = PathBuf::from("static");
    if cwd_static.is_dir() {
        return Ok(cwd_static);
    }

    // Try relative to executable
    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        let exe_static = exe_dir.join("static");
        if exe_static.is_dir() {
            return Ok(exe_static);
        }
    }

    // Default to cwd/static (will be created)
    Ok(cwd_static)
}
