use chrono::{DateTime, Utc};

/// Render the age of `start` relative to `now` as `42s ago`, `5m ago` or `3h ago`.
pub fn format_age(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(start).num_seconds().max(0);
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
