//! Out-of-band runtime control.
//!
//! Operator signals adjust the notification toggles and the active polling
//! cadence while the monitor runs; none of them interrupts an in-flight
//! poll. SIGINT/SIGTERM only raise the termination flag, which the driver
//! honors at its next suspension point.

use signal_hook::consts::signal::{SIGABRT, SIGCONT, SIGINT, SIGTERM, SIGTRAP, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use tracing::info;

use xblwatch_core::config::RuntimeKnobs;
use xblwatch_core::timefmt::format_duration;
use xblwatch_core::{Result, WatchError};

pub fn install(knobs: Arc<RuntimeKnobs>, shutdown: Arc<AtomicBool>) -> Result<()> {
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown)).map_err(register_error)?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown)).map_err(register_error)?;

    let mut signals =
        Signals::new([SIGUSR1, SIGUSR2, SIGCONT, SIGTRAP, SIGABRT]).map_err(register_error)?;
    thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGUSR1 => {
                    let enabled = knobs.toggle_active_inactive();
                    info!(enabled, "Toggled active/inactive email notifications");
                }
                SIGUSR2 => {
                    let enabled = knobs.toggle_title_change();
                    info!(enabled, "Toggled game-change email notifications");
                }
                SIGCONT => {
                    let enabled = knobs.toggle_all_statuses();
                    info!(enabled, "Toggled all-status email notifications");
                }
                SIGTRAP => {
                    let secs = knobs.increase_active_interval();
                    info!(
                        "Active check interval increased to {}",
                        format_duration(secs as i64, 2)
                    );
                }
                SIGABRT => {
                    let secs = knobs.decrease_active_interval();
                    info!(
                        "Active check interval decreased to {}",
                        format_duration(secs as i64, 2)
                    );
                }
                _ => {}
            }
        }
    });
    Ok(())
}

fn register_error(err: std::io::Error) -> WatchError {
    WatchError::io("register signal handlers", err)
}
