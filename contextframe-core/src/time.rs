// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Timestamp helpers. Record timestamps are stored as ISO-8601 strings
//! (per the record model) but compared and refreshed as `DateTime<Utc>`.

use chrono::{DateTime, Utc};

/// Current wall-clock time, formatted as the canonical ISO-8601 string
/// used for `created_at`/`updated_at`.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp string into a `DateTime<Utc>`.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid ISO-8601 timestamp {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_roundtrips_through_parse() {
        let ts = now_iso8601();
        let parsed = parse_iso8601(&ts).unwrap();
        assert_eq!(parsed.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), ts);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_iso8601("not a timestamp").is_err());
    }
}
