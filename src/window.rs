//! Time-window filter — keeps items created within the trailing 24 hours.

use chrono::{DateTime, Duration, Utc};

use crate::model::TrackedItem;

/// Keep only items whose `created_at` falls within `[now - 24h, now]`,
/// with `now` evaluated once at call time. Both boundaries are inclusive
/// and input order is preserved. No dedup happens here — that is the
/// caller's job via watermark comparison.
pub fn filter_last_day(items: Vec<TrackedItem>) -> Vec<TrackedItem> {
    filter_within_day_of(items, Utc::now())
}

/// [`filter_last_day`] with an explicit `now`, for deterministic tests.
pub fn filter_within_day_of(items: Vec<TrackedItem>, now: DateTime<Utc>) -> Vec<TrackedItem> {
    let cutoff = now - Duration::hours(24);
    items
        .into_iter()
        .filter(|item| cutoff <= item.created_at && item.created_at <= now)
        .collect()
}
