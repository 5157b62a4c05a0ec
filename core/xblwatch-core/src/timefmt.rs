//! Human-readable time formatting for log lines, emails, and CSV rows.

use chrono::{DateTime, TimeZone};

/// Interval table for [`format_duration`]. Year and month are calendar
/// approximations, matching what people expect from "user was away for
/// 2 months".
const INTERVALS: &[(&str, i64)] = &[
    ("year", 31_556_952),
    ("month", 2_629_746),
    ("week", 604_800),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
    ("second", 1),
];

/// Converts a span in seconds into a readable string, keeping at most
/// `granularity` leading components: `format_duration(7384, 2)` is
/// `"2 hours, 3 minutes"`. Non-positive spans render as `"0 seconds"`.
pub fn format_duration(secs: i64, granularity: usize) -> String {
    if secs <= 0 {
        return "0 seconds".to_string();
    }
    let mut remaining = secs;
    let mut parts = Vec::new();
    for (name, span) in INTERVALS {
        let value = remaining / span;
        if value > 0 {
            remaining -= value * span;
            if value == 1 {
                parts.push(format!("1 {}", name));
            } else {
                parts.push(format!("{} {}s", value, name));
            }
        }
    }
    parts.truncate(granularity.max(1));
    parts.join(", ")
}

/// `Sun 21 Apr 2024, 15:08:45`
pub fn format_date<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%a %d %b %Y, %H:%M:%S").to_string()
}

/// `Sun 21 Apr 15:08`
pub fn format_short_date<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%a %d %b %H:%M").to_string()
}

/// `15:08` or `15:08:45`
pub fn format_clock<Tz: TimeZone>(dt: &DateTime<Tz>, with_seconds: bool) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let fmt = if with_seconds { "%H:%M:%S" } else { "%H:%M" };
    dt.format(fmt).to_string()
}

/// Renders the span between two timestamps, collapsing the right side to a
/// bare clock when both fall on the same calendar day:
/// `Sun 21 Apr 14:09 - 14:15` (short) or
/// `Sun 21 Apr 2024, 14:09:12 - 14:15:40` (long).
pub fn format_range<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>, short: bool) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let same_day = start.date_naive() == end.date_naive();
    if same_day {
        if short {
            format!("{} - {}", format_short_date(start), format_clock(end, false))
        } else {
            format!("{} - {}", format_date(start), format_clock(end, true))
        }
    } else if short {
        format!("{} - {}", format_short_date(start), format_short_date(end))
    } else {
        format!("{} - {}", format_date(start), format_date(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn zero_and_negative_durations_render_as_zero_seconds() {
        assert_eq!(format_duration(0, 2), "0 seconds");
        assert_eq!(format_duration(-5, 2), "0 seconds");
    }

    #[test]
    fn duration_respects_granularity() {
        // 1 day, 2 hours, 3 minutes, 4 seconds
        let secs = 86_400 + 2 * 3_600 + 3 * 60 + 4;
        assert_eq!(format_duration(secs, 2), "1 day, 2 hours");
        assert_eq!(format_duration(secs, 4), "1 day, 2 hours, 3 minutes, 4 seconds");
    }

    #[test]
    fn duration_singular_units_drop_the_s() {
        assert_eq!(format_duration(3_661, 3), "1 hour, 1 minute, 1 second");
    }

    #[test]
    fn duration_granularity_floor_is_one() {
        assert_eq!(format_duration(90, 0), "1 minute");
    }

    #[test]
    fn range_collapses_same_day() {
        let start = Utc.with_ymd_and_hms(2024, 4, 21, 14, 9, 12).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 4, 21, 14, 15, 40).unwrap();
        assert_eq!(format_range(&start, &end, true), "Sun 21 Apr 14:09 - 14:15");
        assert_eq!(
            format_range(&start, &end, false),
            "Sun 21 Apr 2024, 14:09:12 - 14:15:40"
        );
    }

    #[test]
    fn range_spells_out_different_days() {
        let start = Utc.with_ymd_and_hms(2024, 4, 21, 23, 50, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 4, 22, 0, 10, 0).unwrap();
        assert_eq!(
            format_range(&start, &end, true),
            "Sun 21 Apr 23:50 - Mon 22 Apr 00:10"
        );
    }
}
