//! Session storage backends
//!
//! In-memory, file and SQLite implementations of the session storage contract.
//! Every backend keeps at most one session per type ID.

mod file;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use file::FileSessionStorage;
pub use memory::MemorySessionStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStorage;

use apisession_core::TokenSession;
use serde::{Deserialize, Serialize};

/// Stored session together with its storage-side bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession<S> {
    pub session: S,
    /// Unix timestamp after which the entry counts as expired, set by `expire`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_expiry: Option<i64>,
}

impl<S: TokenSession> StoredSession<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            scheduled_expiry: None,
        }
    }

    /// Expired when the credential has expired or the scheduled instant passed
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.session.has_expired_at(now)
            || self.scheduled_expiry.map_or(false, |at| at <= now)
    }

    pub fn schedule_expiry(&mut self, now: i64, interval: u64) {
        self.scheduled_expiry = Some(expiry_after(now, interval));
    }
}

/// Instant `interval` seconds after `now`, saturating at `i64::MAX`
pub(crate) fn expiry_after(now: i64, interval: u64) -> i64 {
    i64::try_from(interval).map_or(i64::MAX, |interval| now.saturating_add(interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessTokenSession;
    use apisession_core::AccessToken;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_scheduled_expiry_saturates() {
        assert_eq!(expiry_after(NOW, 60), NOW + 60);
        assert_eq!(expiry_after(NOW, u64::MAX), i64::MAX);
        assert_eq!(expiry_after(NOW, i64::MAX as u64), i64::MAX);

        let mut entry = StoredSession::new(AccessTokenSession::new(
            "default",
            AccessToken::new("tok"),
        ));
        entry.schedule_expiry(NOW, u64::MAX);
        assert!(!entry.is_expired_at(NOW));

        entry.schedule_expiry(NOW, 0);
        assert!(entry.is_expired_at(NOW));
    }
}
