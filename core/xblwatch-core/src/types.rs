//! Core types shared across the monitor: the canonical presence snapshot,
//! the raw Xbox Live payload shapes it is distilled from, and the events
//! the session tracker emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Presence state of the monitored gamertag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
    Unknown,
}

impl PresenceStatus {
    pub fn is_offline(&self) -> bool {
        matches!(self, PresenceStatus::Offline)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Offline => "offline",
            PresenceStatus::Unknown => "unknown",
        }
    }

    /// Maps the lower-cased `state` field of a presence payload. Anything
    /// unrecognized (but non-empty) is `Unknown`; an absent or empty field
    /// is a soft failure handled by the normalizer, never a status.
    pub fn from_api(value: &str) -> PresenceStatus {
        match value {
            "online" => PresenceStatus::Online,
            "away" => PresenceStatus::Away,
            "offline" => PresenceStatus::Offline,
            _ => PresenceStatus::Unknown,
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Raw payload shapes (userpresence.xboxlive.com)
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw presence document as returned by the API. Every field is optional;
/// downstream logic only ever sees the normalized [`PresenceSnapshot`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPresence {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub last_seen: Option<RawLastSeen>,
    #[serde(default)]
    pub devices: Vec<RawDevice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLastSeen {
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub title_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDevice {
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub titles: Vec<RawTitle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTitle {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub placement: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Canonical snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// Canonical snapshot produced once per poll by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSnapshot {
    pub status: PresenceStatus,
    /// Foreground title (game) name, with dashboard pseudo-titles filtered out.
    pub title: Option<String>,
    /// Short human label for the device the user was last seen on.
    pub platform: Option<String>,
    /// Only meaningful when `status` is offline. A failed timestamp parse
    /// degrades to the Unix epoch; callers must not treat that as a real time.
    pub last_online_at: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Transition events
// ═══════════════════════════════════════════════════════════════════════════════

/// Figures for a finished (or finishing) online session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub duration_secs: i64,
    /// Accumulated foreground-title time over the session.
    pub play_secs: i64,
    /// Number of distinct titles started during the session.
    pub titles_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub from: PresenceStatus,
    pub to: PresenceStatus,
    pub at: DateTime<Utc>,
    pub previous_status_since: DateTime<Utc>,
    pub previous_status_secs: i64,
    /// Present when the change ends an online session.
    pub session: Option<SessionSummary>,
    /// True when a short offline interruption was bridged and the previous
    /// session was resumed instead of a fresh one starting.
    pub resumed: bool,
}

impl StatusChange {
    pub fn went_online(&self) -> bool {
        self.from.is_offline() && !self.to.is_offline()
    }

    pub fn went_offline(&self) -> bool {
        !self.from.is_offline() && self.to.is_offline()
    }
}

/// What the session tracker observed in one poll. A single poll may yield
/// both a status change and a title change.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEvent {
    StatusChanged(StatusChange),
    TitleStarted {
        name: String,
        at: DateTime<Utc>,
    },
    TitleChanged {
        from: String,
        to: String,
        at: DateTime<Utc>,
        played_secs: i64,
    },
    TitleEnded {
        name: String,
        at: DateTime<Utc>,
        played_secs: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_api_strings() {
        for status in [
            PresenceStatus::Online,
            PresenceStatus::Away,
            PresenceStatus::Offline,
        ] {
            assert_eq!(PresenceStatus::from_api(status.as_str()), status);
        }
    }

    #[test]
    fn unrecognized_status_maps_to_unknown() {
        assert_eq!(
            PresenceStatus::from_api("cloaked"),
            PresenceStatus::Unknown
        );
    }

    #[test]
    fn raw_presence_tolerates_minimal_payload() {
        let raw: RawPresence = serde_json::from_str(r#"{"state":"Online"}"#).unwrap();
        assert_eq!(raw.state.as_deref(), Some("Online"));
        assert!(raw.devices.is_empty());
        assert!(raw.last_seen.is_none());
    }

    #[test]
    fn raw_presence_parses_devices_and_last_seen() {
        let raw: RawPresence = serde_json::from_str(
            r#"{
                "state": "Offline",
                "lastSeen": {
                    "deviceType": "Scarlett",
                    "titleName": "Home",
                    "timestamp": "2024-04-21T12:34:56.789Z"
                },
                "devices": [
                    {"type": "Scarlett", "titles": [{"name": "Halo Infinite", "placement": "Full"}]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            raw.last_seen.as_ref().and_then(|l| l.device_type.as_deref()),
            Some("Scarlett")
        );
        assert_eq!(raw.devices[0].titles[0].name.as_deref(), Some("Halo Infinite"));
    }
}
