//! Notification sinks: log lines, CSV rows, email.
//!
//! Transitions always produce log lines. CSV and email are optional and
//! best-effort: a failing sink is logged and never stops the monitor.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fs_err as fs;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use xblwatch_core::config::{RuntimeKnobs, SmtpConfig};
use xblwatch_core::timefmt::{format_date, format_duration, format_range};
use xblwatch_core::types::{PresenceSnapshot, PresenceStatus, StatusChange, TransitionEvent};
use xblwatch_core::{Result, WatchError};

const CSV_HEADER: [&str; 3] = ["Date", "Status", "Game name"];

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Email building error: {0}")]
    Build(#[from] lettre::error::Error),
}

pub struct EmailSink {
    transport: SmtpTransport,
    sender: Mailbox,
    receiver: Mailbox,
}

impl EmailSink {
    pub fn from_config(config: &SmtpConfig) -> std::result::Result<Self, EmailError> {
        let mut builder = if config.starttls {
            SmtpTransport::starttls_relay(&config.host)?
        } else {
            SmtpTransport::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);
        if !config.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ));
        }

        Ok(EmailSink {
            transport: builder.build(),
            sender: config.sender.parse()?,
            receiver: config.receiver.parse()?,
        })
    }

    pub fn send(&self, subject: &str, body: &str) -> std::result::Result<(), EmailError> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(self.receiver.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        self.transport.send(&message)?;
        Ok(())
    }
}

pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Opens (or creates, writing the header) the CSV file. Unlike later
    /// appends, an unopenable file here is an init-time error.
    pub fn create(path: &Path) -> Result<Self> {
        let exists = path.exists();
        let file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|err| WatchError::io(format!("open {}", path.display()), err))?;
        if !exists {
            let mut writer = Self::writer(file);
            writer
                .write_record(CSV_HEADER)
                .and_then(|_| writer.flush().map_err(csv::Error::from))
                .map_err(|err| csv_error(path, err))?;
        }
        Ok(CsvSink {
            path: path.to_path_buf(),
        })
    }

    pub fn append(&self, date: &str, status: &str, title: &str) -> Result<()> {
        let file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|err| WatchError::io(format!("open {}", self.path.display()), err))?;
        let mut writer = Self::writer(file);
        writer
            .write_record([date, status, title])
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|err| csv_error(&self.path, err))
    }

    fn writer(file: fs::File) -> csv::Writer<fs::File> {
        csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::NonNumeric)
            .from_writer(file)
    }
}

fn csv_error(path: &Path, err: csv::Error) -> WatchError {
    WatchError::io(format!("csv {}", path.display()), std::io::Error::other(err))
}

/// Routes tracker events to the configured sinks, applying the runtime
/// notification toggles to the email channel only. Log lines are
/// unconditional.
pub struct Notifier {
    gamertag: String,
    zone: Tz,
    knobs: Arc<RuntimeKnobs>,
    csv: Option<CsvSink>,
    email: Option<EmailSink>,
}

impl Notifier {
    pub fn new(
        gamertag: String,
        zone: Tz,
        knobs: Arc<RuntimeKnobs>,
        csv: Option<CsvSink>,
        email: Option<EmailSink>,
    ) -> Self {
        Notifier {
            gamertag,
            zone,
            knobs,
            csv,
            email,
        }
    }

    pub fn dispatch(&self, event: &TransitionEvent, snapshot: &PresenceSnapshot) {
        match event {
            TransitionEvent::StatusChanged(change) => self.on_status_change(change, snapshot),
            TransitionEvent::TitleStarted { name, at } => {
                info!("Xbox user {} started playing {}", self.gamertag, name);
                self.csv_row(*at, snapshot.status, Some(name));
                if self.knobs.notify_title_change() {
                    self.email(
                        &format!("xblwatch: {} is playing {}", self.gamertag, name),
                        &format!(
                            "Xbox user {} started playing {}\n\nTimestamp: {}",
                            self.gamertag,
                            name,
                            format_date(&self.local(*at)),
                        ),
                    );
                }
            }
            TransitionEvent::TitleChanged {
                from,
                to,
                at,
                played_secs,
            } => {
                info!(
                    "Xbox user {} changed game from {} (played {}) to {}",
                    self.gamertag,
                    from,
                    format_duration(*played_secs, 2),
                    to
                );
                self.csv_row(*at, snapshot.status, Some(to));
                if self.knobs.notify_title_change() {
                    self.email(
                        &format!("xblwatch: {} is playing {}", self.gamertag, to),
                        &format!(
                            "Xbox user {} changed game from {} to {}\n\nPlayed {}: {}\n\nTimestamp: {}",
                            self.gamertag,
                            from,
                            to,
                            from,
                            format_duration(*played_secs, 2),
                            format_date(&self.local(*at)),
                        ),
                    );
                }
            }
            TransitionEvent::TitleEnded {
                name,
                at,
                played_secs,
            } => {
                info!(
                    "Xbox user {} stopped playing {} (played {})",
                    self.gamertag,
                    name,
                    format_duration(*played_secs, 2)
                );
                self.csv_row(*at, snapshot.status, None);
                if self.knobs.notify_title_change() {
                    self.email(
                        &format!("xblwatch: {} stopped playing {}", self.gamertag, name),
                        &format!(
                            "Xbox user {} stopped playing {}\n\nPlayed for {}\n\nTimestamp: {}",
                            self.gamertag,
                            name,
                            format_duration(*played_secs, 2),
                            format_date(&self.local(*at)),
                        ),
                    );
                }
            }
        }
    }

    fn on_status_change(&self, change: &StatusChange, snapshot: &PresenceSnapshot) {
        let range = format_range(
            &self.local(change.previous_status_since),
            &self.local(change.at),
            true,
        );
        info!(
            "Xbox user {} changed status from {} to {}",
            self.gamertag, change.from, change.to
        );
        info!(
            "User was {} for {} ({})",
            change.from,
            format_duration(change.previous_status_secs, 3),
            range
        );

        let mut after = format_duration(change.previous_status_secs, 2);
        let mut session_lines = String::new();
        if change.went_online() {
            if change.resumed {
                info!(
                    "User got ACTIVE (short interruption of {}, session resumed)",
                    format_duration(change.previous_status_secs, 2)
                );
            } else {
                info!(
                    "User got ACTIVE (was offline since {})",
                    format_date(&self.local(change.previous_status_since))
                );
            }
        }
        if change.went_offline() {
            if let Some(session) = change.session {
                let session_range = format_range(
                    &self.local(session.started_at),
                    &self.local(change.at),
                    true,
                );
                after = format_duration(session.duration_secs, 2);
                info!(
                    "User got OFFLINE (after {}: {})",
                    format_duration(session.duration_secs, 2),
                    session_range
                );
                info!(
                    "User played {} game(s) for {} this session",
                    session.titles_count,
                    format_duration(session.play_secs, 2)
                );
                session_lines = format!(
                    "\n\nUser was available for {} ({})\nGames played: {} ({})",
                    format_duration(session.duration_secs, 2),
                    session_range,
                    session.titles_count,
                    format_duration(session.play_secs, 2),
                );
            } else {
                info!("User got OFFLINE");
            }
        }

        self.csv_row(change.at, change.to, snapshot.title.as_deref());

        let wanted = self.knobs.notify_all_statuses()
            || (self.knobs.notify_active_inactive()
                && (change.went_online() || change.went_offline()));
        if wanted {
            self.email(
                &format!(
                    "xblwatch: {} is now {} (after {}, was {}: {})",
                    self.gamertag, change.to, after, change.from, range
                ),
                &format!(
                    "Xbox user {} changed status from {} to {}\n\nUser was {} for {} ({}){}\n\nTimestamp: {}",
                    self.gamertag,
                    change.from,
                    change.to,
                    change.from,
                    format_duration(change.previous_status_secs, 3),
                    range,
                    session_lines,
                    format_date(&self.local(change.at)),
                ),
            );
        }
    }

    /// Appends a CSV row for a moment in time. Also used by the driver to
    /// seed a row at startup when the live status differs from the
    /// persisted one.
    pub fn csv_row(&self, at: DateTime<Utc>, status: PresenceStatus, title: Option<&str>) {
        if let Some(csv) = &self.csv {
            let date = self.local(at).format("%Y-%m-%d %H:%M:%S").to_string();
            if let Err(err) = csv.append(&date, status.as_str(), title.unwrap_or_default()) {
                warn!(error = %err, "Cannot write CSV entry");
            }
        }
    }

    /// One-off alert email (auth trouble and the like), honoring the error
    /// notification toggle.
    pub fn error_alert(&self, subject: &str, body: &str) {
        if self.knobs.notify_errors() {
            self.email(subject, body);
        }
    }

    fn email(&self, subject: &str, body: &str) {
        if let Some(email) = &self.email {
            info!(subject = %subject, "Sending email notification");
            if let Err(err) = email.send(subject, body) {
                warn!(error = %err, "Error sending email");
            }
        }
    }

    fn local(&self, at: DateTime<Utc>) -> DateTime<Tz> {
        at.with_timezone(&self.zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn csv_sink_writes_header_once() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log.csv");

        let sink = CsvSink::create(&path).unwrap();
        sink.append("2024-04-21 15:08:45", "online", "Halo Infinite")
            .unwrap();
        drop(sink);

        // Reopening an existing file must not duplicate the header.
        let sink = CsvSink::create(&path).unwrap();
        sink.append("2024-04-21 16:00:00", "offline", "").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "\"Date\",\"Status\",\"Game name\"");
        assert_eq!(lines[1], "\"2024-04-21 15:08:45\",\"online\",\"Halo Infinite\"");
        assert_eq!(lines[2], "\"2024-04-21 16:00:00\",\"offline\",\"\"");
    }

    #[test]
    fn csv_sink_quotes_embedded_commas() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log.csv");
        let sink = CsvSink::create(&path).unwrap();
        sink.append("2024-04-21 15:08:45", "online", "Warhammer 40,000")
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"Warhammer 40,000\""));
    }
}
