//! Logging setup: stdout always, plus a per-gamertag log file unless the
//! operator disabled it. The file mirrors what the console shows so a
//! long-running monitor leaves a reviewable trail.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keep this alive for the process lifetime; dropping it loses buffered
/// file output.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(gamertag: &str, disable_file: bool) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if disable_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return LoggingGuard { _file_guard: None };
    }

    let appender = tracing_appender::rolling::never(".", format!("xblwatch_{}.log", gamertag));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();
    LoggingGuard {
        _file_guard: Some(guard),
    }
}
