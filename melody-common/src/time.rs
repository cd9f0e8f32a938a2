//! Timestamp utilities

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole milliseconds of `duration` for log fields, saturating at `u64::MAX`
pub fn as_millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_as_millis_u64_saturates() {
        assert_eq!(as_millis_u64(Duration::from_millis(300)), 300);
        assert_eq!(as_millis_u64(Duration::ZERO), 0);
        assert_eq!(as_millis_u64(Duration::MAX), u64::MAX);
    }
}
