use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch. Upstream push and job timestamps are
/// expressed in the same unit.
pub fn get_epoch_time_in_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Seconds elapsed between an epoch timestamp and `now`. A timestamp from
/// the future clamps to zero rather than going negative.
pub fn secs_since(epoch_secs: u64, now_secs: u64) -> u64 {
    now_secs.saturating_sub(epoch_secs)
}

/// Renders a duration as "N days, N hours, N minutes", skipping units with
/// a zero leading value and pluralizing the rest. Durations under a minute
/// render as "0 minutes".
pub fn human_duration(total_secs: u64) -> String {
    const UNITS: [(&str, u64); 3] = [("day", 86400), ("hour", 3600), ("minute", 60)];

    let mut secs = total_secs;
    let mut parts = Vec::new();
    for (unit, mul) in UNITS {
        if secs >= mul {
            let n = secs / mul;
            secs -= n * mul;
            parts.push(format!("{} {}{}", n, unit, if n == 1 { "" } else { "s" }));
        }
    }
    if parts.is_empty() {
        parts.push("0 minutes".to_string());
    }
    parts.join(", ")
}
