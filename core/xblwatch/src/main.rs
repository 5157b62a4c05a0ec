//! xblwatch: real-time monitor of a single Xbox Live gamertag.
//!
//! Polls the presence API on a status-dependent cadence, detects status
//! and game transitions, accounts per-session play time, and notifies via
//! log lines, CSV rows, and email.

mod logging;
mod notify;
mod runner;
mod signals;
mod xbox;

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use xblwatch_core::config::{self, RuntimeKnobs};
use xblwatch_core::store::StatusStore;
use xblwatch_core::timefmt::format_duration;
use xblwatch_core::Result;

use crate::notify::{CsvSink, EmailSink, Notifier};
use crate::runner::Runner;
use crate::xbox::XboxClient;

#[derive(Parser)]
#[command(name = "xblwatch")]
#[command(about = "Xbox Live presence monitor")]
#[command(version)]
struct Cli {
    /// Xbox gamertag to monitor
    #[arg(value_name = "GAMERTAG")]
    gamertag: String,

    /// Path to the TOML config file (defaults to ~/.config/xblwatch/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the OAuth tokens file path from the config
    #[arg(long, value_name = "PATH")]
    tokens_file: Option<PathBuf>,

    /// Write all status and game changes to this CSV file
    #[arg(short = 'b', long, value_name = "CSV_FILE")]
    csv_file: Option<PathBuf>,

    /// Email when the user toggles between active and inactive
    #[arg(short = 'a', long)]
    active_inactive_notification: bool,

    /// Email on every game change
    #[arg(short = 'g', long)]
    game_change_notification: bool,

    /// Email on every status change
    #[arg(short = 's', long)]
    status_notification: bool,

    /// Disable error emails (invalid auth keys and the like)
    #[arg(short = 'e', long)]
    no_error_notification: bool,

    /// Seconds between checks while the user is offline
    #[arg(short = 'c', long, value_name = "SECS")]
    check_interval: Option<u64>,

    /// Seconds between checks while the user is online
    #[arg(short = 'k', long, value_name = "SECS")]
    active_check_interval: Option<u64>,

    /// Do not write the per-gamertag log file
    #[arg(short = 'd', long)]
    disable_logging: bool,
}

fn main() {
    let cli = Cli::parse();
    let _logging_guard = logging::init(&cli.gamertag, cli.disable_logging);

    info!("xblwatch {} starting", env!("CARGO_PKG_VERSION"));
    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "Fatal error");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = config::load_file_config(cli.config.clone())?;
    if let Some(secs) = cli.check_interval {
        config.monitor.check_interval_secs = secs;
    }
    if let Some(secs) = cli.active_check_interval {
        config.monitor.active_check_interval_secs = secs;
    }
    if let Some(path) = &cli.tokens_file {
        config.auth.tokens_file = path.clone();
    }

    let zone = match config.monitor.timezone() {
        Ok(zone) => zone,
        Err(_) => {
            warn!(
                zone = %config.monitor.local_timezone,
                "Unknown timezone, falling back to UTC"
            );
            chrono_tz::UTC
        }
    };

    info!(
        "Xbox timers: check interval {}, active check interval {}",
        format_duration(config.monitor.check_interval_secs as i64, 2),
        format_duration(config.monitor.active_check_interval_secs as i64, 2),
    );
    info!(
        "Email notifications: active/inactive={} game-change={} all-statuses={} errors={}",
        cli.active_inactive_notification,
        cli.game_change_notification,
        cli.status_notification,
        !cli.no_error_notification,
    );

    info!("Checking internet connectivity");
    xbox::check_connectivity(Duration::from_secs(config.monitor.connect_timeout_secs))?;

    let knobs = Arc::new(RuntimeKnobs::new(
        config.monitor.active_check_interval_secs,
        config.monitor.interval_step_secs,
        cli.active_inactive_notification,
        cli.game_change_notification,
        cli.status_notification,
        !cli.no_error_notification,
    ));
    let shutdown = Arc::new(AtomicBool::new(false));
    signals::install(Arc::clone(&knobs), Arc::clone(&shutdown))?;

    let client = XboxClient::connect(&config.auth)?;
    let profile = client.resolve_profile(&cli.gamertag)?;

    let store = StatusStore::load(&StatusStore::path_for(&cli.gamertag))?;

    let csv = match &cli.csv_file {
        Some(path) => Some(CsvSink::create(path)?),
        None => None,
    };
    let email = if config.smtp.is_configured() {
        match EmailSink::from_config(&config.smtp) {
            Ok(sink) => Some(sink),
            Err(err) => {
                warn!(error = %err, "Email notifications disabled");
                None
            }
        }
    } else {
        None
    };
    let notifier = Notifier::new(cli.gamertag.clone(), zone, Arc::clone(&knobs), csv, email);

    let mut runner = Runner::new(
        client,
        cli.gamertag.clone(),
        profile.xuid,
        zone,
        &config.monitor,
        store,
        notifier,
        knobs,
        shutdown,
    );

    info!("Monitoring user with Xbox gamertag {}", cli.gamertag);
    runner.initialize(&profile)?;
    runner.run()
}
