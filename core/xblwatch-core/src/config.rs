//! Monitor configuration.
//!
//! Two layers: a TOML file (credentials, SMTP, cadence defaults; missing
//! file means defaults) merged with CLI overrides by the binary, and
//! [`RuntimeKnobs`], the handful of values the operator can adjust while
//! the monitor runs via control signals.

use chrono_tz::Tz;
use fs_err as fs;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Result, WatchError};

fn default_tokens_file() -> PathBuf {
    PathBuf::from("xblwatch_tokens.json")
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_check_interval() -> u64 {
    150
}

fn default_active_check_interval() -> u64 {
    60
}

fn default_offline_interrupt() -> i64 {
    420
}

fn default_alive_interval() -> u64 {
    21_600
}

fn default_interval_step() -> u64 {
    30
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Azure AD application credentials plus the OAuth tokens file produced by
/// the one-time authentication flow.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_tokens_file")]
    pub tokens_file: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            client_id: String::new(),
            client_secret: String::new(),
            tokens_file: default_tokens_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub starttls: bool,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        SmtpConfig {
            host: String::new(),
            port: default_smtp_port(),
            user: String::new(),
            password: String::new(),
            starttls: default_true(),
            sender: String::new(),
            receiver: String::new(),
        }
    }
}

impl SmtpConfig {
    /// Email is optional; without a host and receiver the sink is disabled.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.receiver.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between presence checks while the user is offline.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Seconds between presence checks while the user is online or away.
    #[serde(default = "default_active_check_interval")]
    pub active_check_interval_secs: u64,
    /// Offline gaps up to this long count as an interruption of one online
    /// session rather than two sessions.
    #[serde(default = "default_offline_interrupt")]
    pub offline_interrupt_secs: i64,
    /// Cadence of the observational "alive" log line while nothing changes.
    #[serde(default = "default_alive_interval")]
    pub alive_interval_secs: u64,
    /// Step applied by the interval up/down control signals.
    #[serde(default = "default_interval_step")]
    pub interval_step_secs: u64,
    /// IANA zone name used when rendering timestamps.
    #[serde(default = "default_timezone")]
    pub local_timezone: String,
    /// Timeout for the startup connectivity probe.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            check_interval_secs: default_check_interval(),
            active_check_interval_secs: default_active_check_interval(),
            offline_interrupt_secs: default_offline_interrupt(),
            alive_interval_secs: default_alive_interval(),
            interval_step_secs: default_interval_step(),
            local_timezone: default_timezone(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl MonitorConfig {
    /// Parses the configured zone name. The caller decides how to degrade;
    /// a typo should cost timestamps their zone, not the monitor its life.
    pub fn timezone(&self) -> std::result::Result<Tz, String> {
        self.local_timezone.parse::<Tz>().map_err(|e| e.to_string())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("xblwatch").join("config.toml"))
}

/// Loads the TOML config. A missing file (or an unresolvable default path)
/// yields defaults; a present but malformed file is an error.
pub fn load_file_config(path: Option<PathBuf>) -> Result<FileConfig> {
    let path = match path.or_else(default_config_path) {
        Some(path) => path,
        None => return Ok(FileConfig::default()),
    };
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|err| WatchError::io(format!("read {}", path.display()), err))?;
    toml::from_str(&content).map_err(|err| WatchError::ConfigMalformed {
        path,
        details: err.to_string(),
    })
}

/// Values the operator can adjust at runtime via control signals.
///
/// Written from the signal-handling thread, read once per loop iteration.
/// Relaxed ordering is sufficient at polling frequency: a poll using the
/// value from just before or just after an adjustment is acceptable.
#[derive(Debug)]
pub struct RuntimeKnobs {
    active_interval_secs: AtomicU64,
    step_secs: u64,
    notify_active_inactive: AtomicBool,
    notify_title_change: AtomicBool,
    notify_all_statuses: AtomicBool,
    notify_errors: AtomicBool,
}

impl RuntimeKnobs {
    pub fn new(
        active_interval_secs: u64,
        step_secs: u64,
        notify_active_inactive: bool,
        notify_title_change: bool,
        notify_all_statuses: bool,
        notify_errors: bool,
    ) -> Self {
        RuntimeKnobs {
            active_interval_secs: AtomicU64::new(active_interval_secs),
            step_secs,
            notify_active_inactive: AtomicBool::new(notify_active_inactive),
            notify_title_change: AtomicBool::new(notify_title_change),
            notify_all_statuses: AtomicBool::new(notify_all_statuses),
            notify_errors: AtomicBool::new(notify_errors),
        }
    }

    pub fn active_interval_secs(&self) -> u64 {
        self.active_interval_secs.load(Ordering::Relaxed)
    }

    /// Returns the new value.
    pub fn increase_active_interval(&self) -> u64 {
        self.active_interval_secs
            .fetch_add(self.step_secs, Ordering::Relaxed)
            + self.step_secs
    }

    /// Returns the new value. Refuses to drop below one step.
    pub fn decrease_active_interval(&self) -> u64 {
        let result = self
            .active_interval_secs
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (current > self.step_secs).then(|| current - self.step_secs)
            });
        match result {
            Ok(previous) => previous - self.step_secs,
            Err(unchanged) => unchanged,
        }
    }

    pub fn notify_active_inactive(&self) -> bool {
        self.notify_active_inactive.load(Ordering::Relaxed)
    }

    pub fn notify_title_change(&self) -> bool {
        self.notify_title_change.load(Ordering::Relaxed)
    }

    pub fn notify_all_statuses(&self) -> bool {
        self.notify_all_statuses.load(Ordering::Relaxed)
    }

    pub fn notify_errors(&self) -> bool {
        self.notify_errors.load(Ordering::Relaxed)
    }

    /// Flip one of the notification toggles; returns the new value.
    pub fn toggle_active_inactive(&self) -> bool {
        !self.notify_active_inactive.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn toggle_title_change(&self) -> bool {
        !self.notify_title_change.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn toggle_all_statuses(&self) -> bool {
        !self.notify_all_statuses.fetch_xor(true, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_when_file_missing() {
        let temp = tempdir().unwrap();
        let config = load_file_config(Some(temp.path().join("missing.toml"))).unwrap();
        assert_eq!(config.monitor.check_interval_secs, 150);
        assert_eq!(config.monitor.active_check_interval_secs, 60);
        assert_eq!(config.monitor.offline_interrupt_secs, 420);
        assert!(!config.smtp.is_configured());
    }

    #[test]
    fn load_parses_partial_file_with_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[monitor]
active_check_interval_secs = 30
local_timezone = "Europe/Warsaw"

[smtp]
host = "smtp.example.com"
receiver = "ops@example.com"
"#,
        )
        .unwrap();

        let config = load_file_config(Some(path)).unwrap();
        assert_eq!(config.monitor.active_check_interval_secs, 30);
        assert_eq!(config.monitor.check_interval_secs, 150);
        assert!(config.monitor.timezone().is_ok());
        assert!(config.smtp.is_configured());
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "monitor = 42").unwrap();
        assert!(matches!(
            load_file_config(Some(path)),
            Err(WatchError::ConfigMalformed { .. })
        ));
    }

    #[test]
    fn bad_timezone_surfaces_for_caller_to_degrade() {
        let config = MonitorConfig {
            local_timezone: "Atlantis/Lost".to_string(),
            ..Default::default()
        };
        assert!(config.timezone().is_err());
    }

    #[test]
    fn interval_adjustment_respects_floor() {
        let knobs = RuntimeKnobs::new(60, 30, false, false, false, true);
        assert_eq!(knobs.increase_active_interval(), 90);
        assert_eq!(knobs.decrease_active_interval(), 60);
        assert_eq!(knobs.decrease_active_interval(), 30);
        // One step is the floor.
        assert_eq!(knobs.decrease_active_interval(), 30);
    }

    #[test]
    fn toggles_flip_and_report_new_value() {
        let knobs = RuntimeKnobs::new(60, 30, false, false, false, true);
        assert!(knobs.toggle_active_inactive());
        assert!(knobs.notify_active_inactive());
        assert!(!knobs.toggle_active_inactive());
        assert!(knobs.toggle_title_change());
        assert!(knobs.toggle_all_statuses());
    }
}
