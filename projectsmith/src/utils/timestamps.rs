//! Timestamp helpers for run naming and logs.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Compact, filesystem-safe stamp: `YYYYmmdd_HHMMSS`.
#[must_use]
pub fn run_stamp(dt: &Timestamp) -> String {
    dt.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_stamp() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(run_stamp(&dt), "20240307_090501");
    }
}
