//! macro-keyd: turn a spare keyboard into a bank of macro keys
//!
//! Reads key events from a Linux evdev device and, per key, either prints
//! the key's name or launches the command bound to it:
//! - Event loop that waits on the device and drains every buffered event
//! - Fixed-size action table indexed by key code
//! - Macros run as detached child processes, reaped without blocking
//!
//! Key names go to stdout; all diagnostics go to stderr.

mod actions;
mod config;
mod hotkey;
mod lifecycle;
mod state;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::actions::Executor;
use crate::config::Config;
use crate::hotkey::{validate_device, EvdevAccess};
use crate::lifecycle::ShutdownSignal;
use crate::state::{run_session, LoopExit};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for key names
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = Config::load()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        device = ?config.device_path,
        grab = config.grab,
        trigger = %config.trigger,
        "macro-keyd starting"
    );

    validate_device(&config.device_path)?;

    let mut table = config
        .action_table()
        .context("failed to build action table")?;
    if config.keymap.is_some() {
        for (code, action) in table.iter() {
            info!(code, key = %hotkey::display_name(code), ?action, "key bound");
        }
    }
    if table.is_empty() {
        warn!("keymap binds no keys, nothing will happen");
    }
    info!(keys = table.len(), "action table ready");

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;
    let mut executor = Executor::stdout(config.echo_commands);

    let report = run_session(
        &EvdevAccess,
        &config.device_path,
        config.grab,
        &table,
        &mut executor,
        config.trigger,
        shutdown.wait(),
    )
    .await
    .context("failed to open input device")?;

    match report.exit {
        LoopExit::Shutdown => info!("shutdown signal received"),
        LoopExit::SourceFailed(e) => error!(%e, "input device stopped delivering events"),
    }

    // Cleanup
    info!(
        cycles = report.stats.cycles,
        events = report.stats.events,
        fired = report.stats.fired,
        macros = executor.children().spawned(),
        "event loop finished"
    );

    executor.shutdown(config.kill_children).await;
    table.teardown();

    info!("macro-keyd stopped");

    Ok(())
}
