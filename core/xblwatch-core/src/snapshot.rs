//! Maps raw Xbox Live presence payloads to canonical snapshots.
//! All downstream logic operates on [`PresenceSnapshot`], never on the raw
//! payload shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{Result, WatchError};
use crate::types::{PresenceSnapshot, PresenceStatus, RawPresence};

/// Dashboard pseudo-titles reported alongside (or instead of) actual games.
const PLACEHOLDER_TITLES: &[&str] = &["Online", "Home", "Xbox App"];

/// Device-type codes the API reports, mapped to short human labels.
/// Unrecognized codes pass through unchanged.
static PLATFORM_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Scarlett", "Xbox Series X/S"),
        ("XboxSeries", "Xbox Series X/S"),
        ("XboxOne", "Xbox One"),
        ("Durango", "Xbox One"),
        ("Xbox360", "Xbox 360"),
        ("WindowsOneCore", "Windows"),
        ("Win32", "Windows"),
        ("iOS", "iOS"),
        ("Android", "Android"),
    ])
});

/// Distills a raw presence payload into a [`PresenceSnapshot`].
///
/// An absent or empty `state` field is a soft failure
/// ([`WatchError::StatusUnavailable`]): the poll is treated as errored and
/// retried, it never produces a snapshot.
pub fn normalize(raw: &RawPresence) -> Result<PresenceSnapshot> {
    let state = raw
        .state
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(WatchError::StatusUnavailable)?;
    let status = PresenceStatus::from_api(&state.to_lowercase());

    let (title, title_device) = foreground_title(raw);
    let platform = title_device
        .or_else(|| {
            raw.last_seen
                .as_ref()
                .and_then(|seen| seen.device_type.as_deref())
        })
        .map(platform_label);

    let last_online_at = if status.is_offline() {
        raw.last_seen
            .as_ref()
            .and_then(|seen| seen.timestamp.as_deref())
            .map(parse_last_seen)
    } else {
        None
    };

    Ok(PresenceSnapshot {
        status,
        title,
        platform,
        last_online_at,
    })
}

/// First title across all devices that is an actual foreground game:
/// placeholder names and background placements are skipped. Returns the
/// title together with the device type it was found on.
fn foreground_title(raw: &RawPresence) -> (Option<String>, Option<&str>) {
    for device in &raw.devices {
        for title in &device.titles {
            let name = match title.name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => name,
                _ => continue,
            };
            if PLACEHOLDER_TITLES.contains(&name) {
                continue;
            }
            if title
                .placement
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case("background"))
            {
                continue;
            }
            return (Some(name.to_string()), device.device_type.as_deref());
        }
    }
    (None, None)
}

pub fn platform_label(code: &str) -> String {
    PLATFORM_LABELS
        .get(code)
        .map(|label| label.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Parses the API's last-seen timestamp (`2024-04-21T12:34:56.789Z`, UTC).
/// Fractional seconds and the zone suffix are stripped before parsing. A
/// parse failure degrades to the Unix epoch rather than erroring; callers
/// guard against the sentinel.
fn parse_last_seen(value: &str) -> DateTime<Utc> {
    let sanitized = value
        .trim()
        .trim_end_matches('Z')
        .split('.')
        .next()
        .unwrap_or_default();
    match NaiveDateTime::parse_from_str(sanitized, "%Y-%m-%dT%H:%M:%S") {
        Ok(naive) => naive.and_utc(),
        Err(_) => DateTime::UNIX_EPOCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawDevice, RawLastSeen, RawTitle};
    use chrono::TimeZone;

    fn title(name: &str, placement: &str) -> RawTitle {
        RawTitle {
            name: Some(name.to_string()),
            placement: Some(placement.to_string()),
            state: Some("Active".to_string()),
        }
    }

    #[test]
    fn missing_status_is_a_soft_failure() {
        let raw = RawPresence::default();
        assert!(matches!(
            normalize(&raw),
            Err(WatchError::StatusUnavailable)
        ));
    }

    #[test]
    fn blank_status_is_a_soft_failure() {
        let raw = RawPresence {
            state: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            normalize(&raw),
            Err(WatchError::StatusUnavailable)
        ));
    }

    #[test]
    fn status_is_lowercased() {
        let raw = RawPresence {
            state: Some("Online".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize(&raw).unwrap().status, PresenceStatus::Online);
    }

    #[test]
    fn placeholder_and_background_titles_are_skipped() {
        let raw = RawPresence {
            state: Some("Online".to_string()),
            devices: vec![RawDevice {
                device_type: Some("Scarlett".to_string()),
                titles: vec![
                    title("Home", "Full"),
                    title("Spotify", "Background"),
                    title("Halo Infinite", "Full"),
                ],
            }],
            ..Default::default()
        };
        let snapshot = normalize(&raw).unwrap();
        assert_eq!(snapshot.title.as_deref(), Some("Halo Infinite"));
        assert_eq!(snapshot.platform.as_deref(), Some("Xbox Series X/S"));
    }

    #[test]
    fn no_qualifying_title_yields_none() {
        let raw = RawPresence {
            state: Some("Online".to_string()),
            devices: vec![RawDevice {
                device_type: Some("XboxOne".to_string()),
                titles: vec![title("Online", "Full"), title("Xbox App", "Full")],
            }],
            ..Default::default()
        };
        assert!(normalize(&raw).unwrap().title.is_none());
    }

    #[test]
    fn unknown_platform_code_passes_through() {
        assert_eq!(platform_label("HoloDeck"), "HoloDeck");
        assert_eq!(platform_label("Durango"), "Xbox One");
    }

    #[test]
    fn last_seen_only_populated_when_offline() {
        let last_seen = RawLastSeen {
            device_type: Some("Scarlett".to_string()),
            title_name: Some("Home".to_string()),
            timestamp: Some("2024-04-21T12:34:56.789Z".to_string()),
        };
        let offline = RawPresence {
            state: Some("Offline".to_string()),
            last_seen: Some(last_seen.clone()),
            ..Default::default()
        };
        let expected = chrono::Utc.with_ymd_and_hms(2024, 4, 21, 12, 34, 56).unwrap();
        assert_eq!(normalize(&offline).unwrap().last_online_at, Some(expected));

        let online = RawPresence {
            state: Some("Online".to_string()),
            last_seen: Some(last_seen),
            ..Default::default()
        };
        assert_eq!(normalize(&online).unwrap().last_online_at, None);
    }

    #[test]
    fn unparseable_last_seen_degrades_to_epoch() {
        let raw = RawPresence {
            state: Some("Offline".to_string()),
            last_seen: Some(RawLastSeen {
                timestamp: Some("yesterday-ish".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            normalize(&raw).unwrap().last_online_at,
            Some(DateTime::UNIX_EPOCH)
        );
    }

    #[test]
    fn platform_falls_back_to_last_seen_device() {
        let raw = RawPresence {
            state: Some("Offline".to_string()),
            last_seen: Some(RawLastSeen {
                device_type: Some("WindowsOneCore".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            normalize(&raw).unwrap().platform.as_deref(),
            Some("Windows")
        );
    }
}
