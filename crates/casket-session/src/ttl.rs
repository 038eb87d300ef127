//! TTL policy for session sub-records.
//!
//! Header and data are always written with the TTL derived from the same
//! `timeout_minutes`, so under normal operation they expire together.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, SessionError};

/// Longest accepted session timeout (one year).
pub const MAX_TIMEOUT_MINUTES: u32 = 525_600;

/// Convert a session timeout into a cache TTL.
pub fn ttl_for(timeout_minutes: u32) -> Duration {
    Duration::from_secs(u64::from(timeout_minutes) * 60)
}

/// Reject timeouts the store won't write.
pub fn validate_timeout(timeout_minutes: u32) -> Result<()> {
    if (1..=MAX_TIMEOUT_MINUTES).contains(&timeout_minutes) {
        Ok(())
    } else {
        Err(SessionError::InvalidTimeout(timeout_minutes))
    }
}

/// Age of a lock taken at `locked_at`, as of `now`. Clock skew between
/// processes can put `locked_at` in the future; that reads as zero.
pub fn lock_age(locked_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - locked_at).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_ttl_for_minutes() {
        assert_eq!(ttl_for(20), Duration::from_secs(1200));
        assert_eq!(ttl_for(1), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_timeout() {
        assert!(validate_timeout(20).is_ok());
        assert!(validate_timeout(MAX_TIMEOUT_MINUTES).is_ok());
        assert!(matches!(
            validate_timeout(0),
            Err(SessionError::InvalidTimeout(0))
        ));
        assert!(validate_timeout(MAX_TIMEOUT_MINUTES + 1).is_err());
    }

    #[test]
    fn test_lock_age() {
        let now = Utc::now();
        assert_eq!(
            lock_age(now - TimeDelta::seconds(90), now),
            Duration::from_secs(90)
        );
        // Lock stamped by a process with a fast clock.
        assert_eq!(lock_age(now + TimeDelta::seconds(5), now), Duration::ZERO);
    }
}
