//! Session Types and Structures
//!
//! Access token sessions in two flavours: immutable sessions, where every new
//! token is a new session, and renewable sessions, which keep their identity
//! while their token is replaced.

use apisession_core::{AccessToken, Session, SessionWithExpiration, TokenSession};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Immutable access token session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenSession {
    session_id: String,
    type_id: String,
    access_token: AccessToken,
    created_at: DateTime<Utc>,
}

impl AccessTokenSession {
    pub fn new<S: Into<String>>(type_id: S, access_token: AccessToken) -> Self {
        Self {
            session_id: new_session_id(),
            type_id: type_id.into(),
            access_token,
            created_at: Utc::now(),
        }
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Session for AccessTokenSession {
    fn session_type(&self) -> &str {
        &self.type_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl SessionWithExpiration for AccessTokenSession {
    fn expires(&self) -> Option<i64> {
        self.access_token.expires()
    }

    fn has_expired_at(&self, now: i64) -> bool {
        self.access_token.has_expired_at(now)
    }
}

impl TokenSession for AccessTokenSession {
    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn open(type_id: &str, token: AccessToken) -> Self {
        Self::new(type_id, token)
    }
}

/// Access token session that is renewed in place
///
/// Use this when the application considers a fresh token to be the same
/// session continuing, e.g. to correlate logs across token refreshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewableAccessTokenSession {
    session_id: String,
    type_id: String,
    access_token: AccessToken,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    renewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    renewals: u32,
}

impl RenewableAccessTokenSession {
    pub fn new<S: Into<String>>(type_id: S, access_token: AccessToken) -> Self {
        Self {
            session_id: new_session_id(),
            type_id: type_id.into(),
            access_token,
            created_at: Utc::now(),
            renewed_at: None,
            renewals: 0,
        }
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn renewed_at(&self) -> Option<DateTime<Utc>> {
        self.renewed_at
    }

    /// Number of times the token has been replaced
    pub fn renewals(&self) -> u32 {
        self.renewals
    }

    /// Replace the access token, keeping the session identity
    pub fn set_access_token(&mut self, access_token: AccessToken) {
        self.access_token = access_token;
        self.renewed_at = Some(Utc::now());
        self.renewals += 1;
    }
}

impl Session for RenewableAccessTokenSession {
    fn session_type(&self) -> &str {
        &self.type_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl SessionWithExpiration for RenewableAccessTokenSession {
    fn expires(&self) -> Option<i64> {
        self.access_token.expires()
    }

    fn has_expired_at(&self, now: i64) -> bool {
        self.access_token.has_expired_at(now)
    }
}

impl TokenSession for RenewableAccessTokenSession {
    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn open(type_id: &str, token: AccessToken) -> Self {
        Self::new(type_id, token)
    }

    fn renew(previous: Option<Self>, type_id: &str, token: AccessToken) -> Self {
        match previous {
            Some(mut session) if session.type_id == type_id => {
                session.set_access_token(token);
                session
            }
            _ => Self::open(type_id, token),
        }
    }
}

/// Session information for external consumption
///
/// Never carries the token itself, only a masked preview of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub type_id: String,
    pub token_preview: String,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_seconds: Option<i64>,
    pub has_expired: bool,
    pub has_refresh_token: bool,
}

impl SessionInfo {
    pub fn from_session<S: TokenSession>(session: &S, now: i64) -> Self {
        let token = session.access_token();

        Self {
            session_id: session.session_id().to_string(),
            type_id: session.session_type().to_string(),
            token_preview: mask_token(token.token()),
            token_type: token.token_type().map(str::to_string),
            scope: token.scope().map(str::to_string),
            expires_at: token
                .expires()
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            expires_in_seconds: token.remaining_from(now),
            has_expired: session.has_expired_at(now),
            has_refresh_token: token.refresh_token().is_some(),
        }
    }
}

/// Keep the first four characters of a token
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immutable_session_renewal_creates_new_identity() {
        let first = AccessTokenSession::new("default", AccessToken::new("one"));
        let renewed =
            AccessTokenSession::renew(Some(first.clone()), "default", AccessToken::new("two"));

        assert_ne!(first.session_id(), renewed.session_id());
        assert_eq!(renewed.access_token().token(), "two");
        assert_eq!(first.access_token().token(), "one");
    }

    #[test]
    fn test_renewable_session_keeps_identity() {
        let first = RenewableAccessTokenSession::new("default", AccessToken::new("one"));
        let renewed = RenewableAccessTokenSession::renew(
            Some(first.clone()),
            "default",
            AccessToken::new("two"),
        );

        assert_eq!(first.session_id(), renewed.session_id());
        assert_eq!(renewed.access_token().token(), "two");
        assert_eq!(renewed.renewals(), 1);
        assert!(renewed.renewed_at().is_some());
        assert_eq!(renewed.created_at(), first.created_at());
    }

    #[test]
    fn test_renewable_session_without_previous_opens_new() {
        let session =
            RenewableAccessTokenSession::renew(None, "app.export", AccessToken::new("tok"));
        assert_eq!(session.session_type(), "app.export");
        assert_eq!(session.renewals(), 0);
    }

    #[test]
    fn test_session_expiration_follows_token() {
        let session = AccessTokenSession::new("default", AccessToken::new("t").with_expires(100));
        assert_eq!(session.expires(), Some(100));
        assert!(!session.has_expired_at(100));
        assert!(session.has_expired_at(101));
    }

    #[test]
    fn test_session_info_masks_token() {
        let session = AccessTokenSession::new(
            "default",
            AccessToken::new("abcdef123456")
                .with_expires(1_000)
                .with_refresh_token("r"),
        );
        let info = SessionInfo::from_session(&session, 400);

        assert_eq!(info.token_preview, "abcd****");
        assert_eq!(info.expires_in_seconds, Some(600));
        assert!(!info.has_expired);
        assert!(info.has_refresh_token);
        assert_eq!(mask_token("abc"), "****");
    }
}
