//! Poll loop driver.
//!
//! Sequences fetch, normalize, observe, notify, sleep. Four phases:
//! initialization (fatal on failure), steady polling, per-poll error
//! backoff (retry at the cadence of the last known status), and clean
//! termination on interrupt. One poll is in flight at a time; the sleep
//! between polls is the only suspension point and is cut short only by
//! the termination flag.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use xblwatch_core::config::{MonitorConfig, RuntimeKnobs};
use xblwatch_core::session::SessionTracker;
use xblwatch_core::snapshot::normalize;
use xblwatch_core::store::StatusStore;
use xblwatch_core::timefmt::{format_date, format_duration};
use xblwatch_core::types::{PresenceStatus, TransitionEvent};
use xblwatch_core::{Result, WatchError};

use crate::notify::Notifier;
use crate::xbox::{ProfileInfo, XboxClient};

pub struct Runner {
    client: XboxClient,
    gamertag: String,
    xuid: u64,
    zone: Tz,
    tracker: SessionTracker,
    store: StatusStore,
    notifier: Notifier,
    knobs: Arc<RuntimeKnobs>,
    shutdown: Arc<AtomicBool>,
    offline_interval_secs: u64,
    /// Offline-cadence polls without a change before an "alive" line.
    alive_after_polls: u32,
}

impl Runner {
    pub fn new(
        client: XboxClient,
        gamertag: String,
        xuid: u64,
        zone: Tz,
        monitor: &MonitorConfig,
        store: StatusStore,
        notifier: Notifier,
        knobs: Arc<RuntimeKnobs>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let alive_after_polls =
            (monitor.alive_interval_secs / monitor.check_interval_secs.max(1)).max(1) as u32;
        Runner {
            client,
            gamertag,
            xuid,
            zone,
            tracker: SessionTracker::new(monitor.offline_interrupt_secs),
            store,
            notifier,
            knobs,
            shutdown,
            offline_interval_secs: monitor.check_interval_secs,
            alive_after_polls,
        }
    }

    /// First fetch and bootstrap. Unlike steady-state polling, a failure
    /// here is fatal: a monitor that cannot complete one poll is
    /// misconfigured, not unlucky.
    pub fn initialize(&mut self, profile: &ProfileInfo) -> Result<()> {
        let raw = self.client.presence(self.xuid)?;
        let snapshot = normalize(&raw)?;

        info!("Xbox user gamertag: {}", self.gamertag);
        info!("Xbox XUID: {}", self.xuid);
        if let Some(name) = &profile.real_name {
            info!("Real name: {}", name);
        }
        if let Some(location) = &profile.location {
            info!("Location: {}", location);
        }
        if let Some(bio) = &profile.bio {
            info!("Bio: {}", bio);
        }
        info!("Status: {}", snapshot.status.as_str().to_uppercase());
        if let Some(platform) = &snapshot.platform {
            info!("Platform: {}", platform);
        }
        if let Some(title) = &snapshot.title {
            info!("Playing: {}", title);
        }
        if snapshot.status.is_offline() {
            if let Some(seen) = snapshot
                .last_online_at
                .filter(|ts| *ts > DateTime::UNIX_EPOCH)
            {
                info!("Last seen: {}", format_date(&seen.with_timezone(&self.zone)));
            }
        }

        let persisted = self.store.record();
        let now = Utc::now();
        let events = self.tracker.observe(&snapshot, now, &mut self.store);
        for event in &events {
            self.notifier.dispatch(event, &snapshot);
        }

        // Seed a CSV row when the status moved while the monitor was down
        // (or on the very first run).
        if persisted.map_or(true, |record| record.status != snapshot.status) {
            self.notifier
                .csv_row(now, snapshot.status, snapshot.title.as_deref());
        }

        let held_for = (now - self.tracker.status_since()).num_seconds();
        if held_for > 0 {
            info!(
                "User is {} for {}",
                snapshot.status.as_str().to_uppercase(),
                format_duration(held_for, 2)
            );
        }
        Ok(())
    }

    /// Steady-state loop. Returns `Ok(())` on a clean interrupt.
    pub fn run(&mut self) -> Result<()> {
        let mut alive_counter: u32 = 0;
        let mut failure_alerted = false;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Interrupt received, terminating");
                return Ok(());
            }

            let sleep_secs = match self
                .client
                .presence(self.xuid)
                .and_then(|raw| normalize(&raw))
            {
                Ok(snapshot) => {
                    failure_alerted = false;
                    let now = Utc::now();
                    let events = self.tracker.observe(&snapshot, now, &mut self.store);
                    let status_changed = events
                        .iter()
                        .any(|event| matches!(event, TransitionEvent::StatusChanged(_)));
                    for event in &events {
                        self.notifier.dispatch(event, &snapshot);
                    }

                    if status_changed {
                        alive_counter = 0;
                    } else {
                        alive_counter = alive_counter.saturating_add(1);
                    }
                    if snapshot.status.is_offline() && alive_counter >= self.alive_after_polls {
                        info!("Alive check, still monitoring {}", self.gamertag);
                        alive_counter = 0;
                    }

                    self.interval_for(snapshot.status)
                }
                Err(err) => {
                    // Tracker state is untouched; retry at the cadence of
                    // the last known status.
                    let retry_secs = self.interval_for(self.tracker.status());
                    warn!(
                        error = %err,
                        "Presence check failed, retrying in {}",
                        format_duration(retry_secs as i64, 2)
                    );
                    if is_auth_error(&err) && !failure_alerted {
                        warn!("Xbox auth credentials might not be valid anymore");
                        self.notifier.error_alert(
                            &format!("xblwatch: auth error (user: {})", self.gamertag),
                            &format!(
                                "Xbox auth credentials might not be valid anymore: {}\n\nTimestamp: {}",
                                err,
                                format_date(&Utc::now().with_timezone(&self.zone)),
                            ),
                        );
                        failure_alerted = true;
                    }
                    retry_secs
                }
            };

            self.sleep_interruptible(Duration::from_secs(sleep_secs));
        }
    }

    fn interval_for(&self, status: PresenceStatus) -> u64 {
        if status.is_offline() {
            self.offline_interval_secs
        } else {
            self.knobs.active_interval_secs()
        }
    }

    /// Sleeps in one-second slices so a termination signal is honored
    /// promptly without interrupting an in-flight poll.
    fn sleep_interruptible(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_secs(1)));
        }
    }
}

/// Heuristic for surfacing credential trouble: transient network blips
/// retry quietly, but errors that look auth-shaped get one alert per
/// failure streak.
fn is_auth_error(err: &WatchError) -> bool {
    let text = err.to_string().to_lowercase();
    ["auth", "token", "validation"]
        .iter()
        .any(|needle| text.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_shaped_errors_are_flagged() {
        assert!(is_auth_error(&WatchError::TokenRefresh(
            "invalid_grant".to_string()
        )));
        assert!(is_auth_error(&WatchError::Api {
            context: "XSTS authorization".to_string(),
            details: "401".to_string(),
        }));
    }

    #[test]
    fn plain_network_errors_are_not_flagged() {
        assert!(!is_auth_error(&WatchError::Api {
            context: "presence fetch".to_string(),
            details: "connection reset by peer".to_string(),
        }));
    }
}
