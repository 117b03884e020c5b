// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 with millisecond precision and a `Z`
/// suffix. Fixed width, so lexical order matches time order.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `start` / `end` query bounds covering a whole calendar day.
pub fn day_bounds(date: NaiveDate) -> (String, String) {
    let day = date.format("%Y-%m-%d");
    (
        format!("{}T00:00:00.000Z", day),
        format!("{}T23:59:59.999Z", day),
    )
}
