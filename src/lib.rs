pub mod blocking;
pub mod console;
pub mod db;
pub mod error;
pub mod evidence;
pub mod models;
pub mod progress;
pub mod reward;
pub mod settings;
pub mod timer;
pub mod utils;
pub mod verification;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};

use blocking::LogOnlyBlocker;
use db::Database;
use settings::SettingsStore;
use timer::{ControllerConfig, ResumeOutcome, SessionController, SessionEvent};
use verification::HttpVerifier;

fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FOCUSGATE_DATA_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::data_dir()
        .map(|dir| dir.join("focusgate"))
        .context("could not determine a data directory; set FOCUSGATE_DATA_DIR")
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Heartbeat {
            remaining_seconds,
            break_remaining_seconds,
        } => match break_remaining_seconds {
            Some(on_break) => info!("{remaining_seconds}s left in session, {on_break}s of break"),
            None => info!("{remaining_seconds}s left in session"),
        },
        SessionEvent::BreakEnded { early } => {
            info!("Break over{}; back to focusing", if *early { " early" } else { "" })
        }
        SessionEvent::BlockingFailed {
            authorization,
            message,
        } => {
            if *authorization {
                warn!("App blocking needs authorization: {message}");
            } else {
                warn!("App blocking failed: {message}");
            }
        }
        SessionEvent::SessionFinished { session } => info!(
            "Session {} {} after {}",
            session.id,
            if session.completed { "completed" } else { "ended" },
            session.duration_label()
        ),
        _ => {}
    }
}

pub async fn run() -> Result<()> {
    // Reads RUST_LOG; defaults to info.
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("FocusGate starting up...");

    let data_dir = data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.settings().with_env_overrides();

    let database = Database::new(data_dir.join("focusgate.sqlite3"))?;
    let verifier = HttpVerifier::from_settings(&settings.verification)?;

    let controller = SessionController::new(
        database,
        Arc::new(verifier),
        Arc::new(LogOnlyBlocker),
        ControllerConfig::from_settings(&settings),
    );

    let mut events = controller.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event log skipped {skipped} events")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Finalise or pick up whatever was running when we last stopped.
    match controller.resume().await? {
        ResumeOutcome::CompletedWhileSuspended(session) => {
            info!("Last session finished while away ({})", session.duration_label())
        }
        ResumeOutcome::Resumed(snapshot) => info!("Resumed: {}", console::describe(&snapshot)),
        ResumeOutcome::NeedsGoal(_) => {
            warn!("A timer is still running but its goal was lost; `start` to continue it")
        }
        ResumeOutcome::NothingToResume | ResumeOutcome::AlreadyActive(_) => {}
    }

    if let Some(notice) = controller.take_pending_completion().await? {
        println!("{}", console::completion_message(&notice));
    }

    let result = console::run_console(controller.clone()).await;

    controller.shutdown().await;
    event_logger.abort();
    info!("FocusGate shutting down");
    result
}
