//! Error types for xblwatch operations.

use std::path::PathBuf;

/// All errors that can occur while monitoring a gamertag.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Auth Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Auth tokens file not found: {0} (run the authentication flow first)")]
    TokensNotFound(PathBuf),

    #[error("Auth token refresh rejected: {0}")]
    TokenRefresh(String),

    // ─────────────────────────────────────────────────────────────────────
    // Xbox Live API Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Gamertag not found: {0}")]
    GamertagNotFound(String),

    #[error("Presence payload carries no status")]
    StatusUnavailable,

    #[error("Xbox Live request failed: {context}: {details}")]
    Api { context: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl WatchError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WatchError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        WatchError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using WatchError.
pub type Result<T> = std::result::Result<T, WatchError>;
