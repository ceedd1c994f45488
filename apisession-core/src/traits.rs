//! Core trait definitions

use crate::error::{ProviderError, SessionResult};
use crate::types::{now_timestamp, AccessToken, GrantParams, GrantType};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// API client session
///
/// The type ID names the purpose of a session, not a specific credential. It
/// never changes once the session exists.
pub trait Session: Debug + Clone + Send + Sync + 'static {
    /// Session type ID
    fn session_type(&self) -> &str;

    /// Unique ID of this concrete session instance
    fn session_id(&self) -> &str;
}

/// Session with an expiration time
pub trait SessionWithExpiration {
    /// Expiration time as a Unix timestamp in seconds, `None` if not defined
    fn expires(&self) -> Option<i64>;

    fn has_expired_at(&self, now: i64) -> bool;

    fn has_expired(&self) -> bool {
        self.has_expired_at(now_timestamp())
    }
}

/// Session backed by an OAuth2 access token
///
/// Implementations decide what renewing means: either a new session carrying
/// the new token, or the previous session updated in place.
pub trait TokenSession: Session + SessionWithExpiration + Serialize + DeserializeOwned {
    fn access_token(&self) -> &AccessToken;

    /// Create a brand new session for the given type
    fn open(type_id: &str, token: AccessToken) -> Self;

    /// Produce the session that carries a freshly issued token
    ///
    /// `previous` is the last stored session of the same type, possibly expired.
    fn renew(previous: Option<Self>, type_id: &str, token: AccessToken) -> Self {
        let _ = previous;
        Self::open(type_id, token)
    }
}

/// Whether storage reads treat expired sessions as absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpiryFilter {
    #[default]
    SkipExpired,
    IncludeExpired,
}

impl ExpiryFilter {
    pub fn skips_expired(&self) -> bool {
        matches!(self, ExpiryFilter::SkipExpired)
    }
}

/// Session storage contract
///
/// Reads with [`ExpiryFilter::SkipExpired`] must behave as if expired sessions
/// do not exist, even when they are still physically present.
#[async_trait]
pub trait SessionStorage<S: TokenSession>: Send + Sync {
    /// Store a session, replacing any session of the same type
    async fn set(&self, session: &S) -> SessionResult<()>;

    async fn get(&self, type_id: &str, filter: ExpiryFilter) -> SessionResult<Option<S>>;

    async fn exists(&self, type_id: &str, filter: ExpiryFilter) -> SessionResult<bool> {
        Ok(self.get(type_id, filter).await?.is_some())
    }

    /// Delete the session of the given type; absent sessions are not an error
    async fn delete(&self, type_id: &str) -> SessionResult<()>;

    async fn count(&self, filter: ExpiryFilter) -> SessionResult<usize>;
}

/// Storage that can schedule expiration and collect expired sessions
///
/// When the scheduled expiration is applied physically depends on the
/// backend; logically the session is expired as soon as the instant passes.
#[async_trait]
pub trait ExpiringSessionStorage<S: TokenSession>: SessionStorage<S> {
    /// Schedule the session of the given type to expire `interval` seconds from now
    async fn expire(&self, type_id: &str, interval: u64) -> SessionResult<()>;

    /// Delete expired sessions of one type, or of all types when `None`
    async fn delete_expired(&self, type_id: Option<&str>) -> SessionResult<usize>;
}

/// Authorization server access
///
/// Performs one token request for the given grant. Transport, timeout and
/// response parsing are entirely the provider's business.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn request_token(
        &self,
        grant_type: GrantType,
        params: &GrantParams,
    ) -> Result<AccessToken, ProviderError>;
}
