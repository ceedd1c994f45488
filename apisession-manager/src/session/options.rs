//! Per-call option snapshot

use apisession_core::{AccessToken, GrantParams, ManagerOptions, SessionError, SessionResult};

/// Options of a single `connect` call with the duration start resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub type_id: String,
    pub interval: Option<u64>,
    pub limit: Option<u64>,
    /// Reference instant for `interval`, Unix seconds
    pub start: Option<i64>,
    pub grant: GrantParams,
    /// Instant the snapshot was taken, Unix seconds
    pub now: i64,
}

impl ResolvedOptions {
    pub fn resolve(options: &ManagerOptions, now: i64) -> Self {
        Self {
            type_id: options.effective_type_id().to_string(),
            interval: options.duration.interval,
            limit: options.duration.limit,
            start: options.duration.start.map(|start| start.resolve(now)),
            grant: options.grant.clone(),
            now,
        }
    }

    /// Check that the requested duration can be guaranteed at all
    pub fn validate(&self) -> SessionResult<()> {
        if self.type_id.is_empty() {
            return Err(SessionError::invalid_configuration(
                "Session type ID must not be empty",
                Some("type_id"),
            ));
        }

        let Some(interval) = self.interval else {
            return Ok(());
        };

        if self.start.is_none() {
            return Err(SessionError::connection(format!(
                "Cannot guarantee a session duration of {}s without a start time",
                interval
            )));
        }

        if let Some(limit) = self.limit {
            if interval > limit {
                return Err(SessionError::connection(format!(
                    "Requested session duration of {}s exceeds the provider limit of {}s",
                    interval, limit
                )));
            }
        }

        Ok(())
    }

    /// Whether the token stays valid for `interval` seconds counted from `start`
    ///
    /// An interval beyond `i64::MAX` seconds is only met by a token without
    /// expiration.
    pub fn is_sufficient(&self, token: &AccessToken) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };
        let Some(start) = self.start else {
            return false;
        };

        match token.remaining_from(start) {
            None => true,
            Some(remaining) => {
                i64::try_from(interval).is_ok_and(|interval| remaining >= interval)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apisession_core::DurationStart;

    const T0: i64 = 1_700_000_000;

    #[test]
    fn test_call_time_start_resolves_to_now() {
        let options = ManagerOptions::default()
            .with_interval(60)
            .with_start(DurationStart::CallTime);
        let resolved = ResolvedOptions::resolve(&options, T0);

        assert_eq!(resolved.start, Some(T0));
        assert_eq!(resolved.type_id, "default");
        assert!(resolved.validate().is_ok());
    }

    #[test]
    fn test_interval_without_start_is_connection_error() {
        let options = ManagerOptions::default().with_interval(60);
        let error = ResolvedOptions::resolve(&options, T0).validate().unwrap_err();
        assert!(error.is_connection());
    }

    #[test]
    fn test_interval_above_limit_is_connection_error() {
        let options = ManagerOptions::default()
            .with_interval(100)
            .with_limit(50)
            .with_start(DurationStart::CallTime);
        let error = ResolvedOptions::resolve(&options, T0).validate().unwrap_err();
        assert!(error.is_connection());
    }

    #[test]
    fn test_no_interval_is_always_sufficient() {
        let resolved = ResolvedOptions::resolve(&ManagerOptions::default(), T0);
        assert!(resolved.validate().is_ok());
        assert!(resolved.is_sufficient(&AccessToken::new("t").with_expires(T0 - 10)));
    }

    #[test]
    fn test_sufficiency_boundary() {
        let options = ManagerOptions::default()
            .with_interval(300)
            .with_start(DurationStart::At(T0));
        let resolved = ResolvedOptions::resolve(&options, T0 + 5);

        assert!(!resolved.is_sufficient(&AccessToken::new("t").with_expires(T0 + 299)));
        assert!(resolved.is_sufficient(&AccessToken::new("t").with_expires(T0 + 300)));
        assert!(resolved.is_sufficient(&AccessToken::new("t")));
    }

    #[test]
    fn test_huge_interval_is_never_met_by_expiring_token() {
        let options = ManagerOptions::default()
            .with_interval(u64::MAX)
            .with_start(DurationStart::At(T0));
        let resolved = ResolvedOptions::resolve(&options, T0);

        assert!(!resolved.is_sufficient(&AccessToken::new("t").with_expires(T0 + 10)));
        assert!(!resolved.is_sufficient(&AccessToken::new("t").with_expires(i64::MAX)));
        assert!(resolved.is_sufficient(&AccessToken::new("t")));

        // Far-past start must not overflow the remaining lifetime
        let ancient = ManagerOptions::default()
            .with_interval(60)
            .with_start(DurationStart::At(i64::MIN));
        let resolved = ResolvedOptions::resolve(&ancient, T0);
        assert!(resolved.is_sufficient(&AccessToken::new("t").with_expires(T0)));
    }
}
