//! Formatting helpers shared across UIs.

use crate::types::Outline;
use chrono::{DateTime, Utc};

/// Format a timestamp relative to now (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    format_relative_to(ts, Utc::now())
}

/// Format `ts` relative to `now`.
pub fn format_relative_to(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Label of a status id in an outline. Empty ids render empty; ids with no
/// definition render as themselves.
pub fn status_label<'a>(outline: Option<&'a Outline>, status_id: &'a str) -> &'a str {
    outline
        .and_then(|o| o.status_def(status_id))
        .map(|d| d.label.as_str())
        .unwrap_or(status_id)
}

/// Child progress such as "2/3"; empty when there is nothing to count.
pub fn format_progress(done: usize, total: usize) -> String {
    if total == 0 {
        String::new()
    } else {
        format!("{}/{}", done, total)
    }
}

/// Human-readable byte size (e.g., "1.5 MiB").
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusDef;
    use chrono::Duration;

    #[test]
    fn test_relative_time() {
        let now = Utc::now();
        assert_eq!(format_relative_to(now - Duration::seconds(5), now), "5s ago");
        assert_eq!(format_relative_to(now - Duration::minutes(3), now), "3m ago");
        assert_eq!(format_relative_to(now - Duration::hours(2), now), "2h ago");
        assert_eq!(format_relative_to(now - Duration::days(3), now), "3d ago");
        assert_eq!(format_relative_to(now + Duration::seconds(5), now), "just now");
    }

    #[test]
    fn test_status_label() {
        let outline = Outline {
            status_defs: vec![StatusDef::new("in-review", "In review", false)],
            ..Default::default()
        };
        assert_eq!(status_label(Some(&outline), "in-review"), "In review");
        assert_eq!(status_label(Some(&outline), "gone"), "gone");
        assert_eq!(status_label(None, ""), "");
    }

    #[test]
    fn test_progress_and_bytes() {
        assert_eq!(format_progress(0, 0), "");
        assert_eq!(format_progress(2, 3), "2/3");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
