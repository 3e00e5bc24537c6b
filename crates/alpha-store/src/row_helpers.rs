use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a JSON column into `T`, returning CorruptRow on parse failure.
pub fn parse_json<T: DeserializeOwned>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so that lexical order in SQL matches time order.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp {raw:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_json_success() {
        let v: Vec<u32> = parse_json("[1,2]", "t", "c").unwrap();
        assert_eq!(v, vec![1, 2]);
    }

    #[test]
    fn parse_json_failure() {
        let err = parse_json::<Vec<u32>>("not json", "conversations", "messages").unwrap_err();
        assert!(matches!(
            err,
            StoreError::CorruptRow {
                table: "conversations",
                column: "messages",
                ..
            }
        ));
    }

    #[test]
    fn timestamps_round_trip_and_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (fa, fb) = (format_ts(&a), format_ts(&b));
        assert!(fa < fb);
        assert_eq!(fa.len(), fb.len());
        assert_eq!(parse_ts(&fa, "t", "c").unwrap(), a);
    }

    #[test]
    fn now_survives_storage() {
        let t = now();
        assert_eq!(parse_ts(&format_ts(&t), "t", "c").unwrap(), t);
    }

    #[test]
    fn parse_ts_failure() {
        assert!(matches!(
            parse_ts("yesterday", "context", "updated_at"),
            Err(StoreError::CorruptRow { .. })
        ));
    }
}
