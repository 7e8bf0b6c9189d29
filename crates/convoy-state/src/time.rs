//! Epoch-millisecond timestamps and day/month bucket strings.
//!
//! Buckets feed the deployment-history secondary indexes; a history
//! read walks the current bucket plus the two before it.

use chrono::{DateTime, Days, Months, Utc};

/// Current time as epoch milliseconds.
pub fn epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn to_datetime(epoch_ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(epoch_ms as i64).unwrap_or_default()
}

/// Day bucket ("2026-08-29") for a timestamp, `back` days earlier.
pub fn day_bucket(epoch_ms: u64, back: u64) -> String {
    let dt = to_datetime(epoch_ms)
        .checked_sub_days(Days::new(back))
        .unwrap_or_else(|| to_datetime(epoch_ms));
    dt.format("%Y-%m-%d").to_string()
}

/// Month bucket ("2026-08") for a timestamp, `back` months earlier.
pub fn month_bucket(epoch_ms: u64, back: u32) -> String {
    let dt = to_datetime(epoch_ms)
        .checked_sub_months(Months::new(back))
        .unwrap_or_else(|| to_datetime(epoch_ms));
    dt.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-08-29T00:00:00Z
    const TS: u64 = 1_787_961_600_000;

    #[test]
    fn buckets_format() {
        assert_eq!(day_bucket(TS, 0), "2026-08-29");
        assert_eq!(day_bucket(TS, 1), "2026-08-28");
        assert_eq!(month_bucket(TS, 0), "2026-08");
        assert_eq!(month_bucket(TS, 1), "2026-07");
        assert_eq!(month_bucket(TS, 8), "2025-12");
    }
}
