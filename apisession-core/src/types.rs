//! Core data type definitions

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Session type ID used when an application maintains a single session
///
/// Applications that keep several independent sessions should namespace their
/// own IDs instead, e.g. `my_app.user_import` and `my_app.user_export`.
pub const DEFAULT_SESSION_TYPE_ID: &str = "default";

/// Grant parameters keyed by their OAuth2 form field name
pub type GrantParams = BTreeMap<String, String>;

/// Current time as a Unix timestamp in seconds
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Access token issued by an authorization server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    /// Expiration as a Unix timestamp in seconds, `None` for non-expiring tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    /// Additional provider-specific response values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, serde_json::Value>,
}

impl AccessToken {
    pub fn new<S: Into<String>>(access_token: S) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
            expires: None,
            refresh_token: None,
            scope: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with_expires(mut self, expires: i64) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set the expiration relative to now
    pub fn expiring_in(self, seconds: i64) -> Self {
        self.with_expires(now_timestamp().saturating_add(seconds))
    }

    pub fn with_refresh_token<S: Into<String>>(mut self, refresh_token: S) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_token_type<S: Into<String>>(mut self, token_type: S) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    pub fn with_scope<S: Into<String>>(mut self, scope: S) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_value<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn token(&self) -> &str {
        &self.access_token
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    pub fn expires(&self) -> Option<i64> {
        self.expires
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn values(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.values
    }

    /// A token without an expiration never expires
    pub fn has_expired_at(&self, now: i64) -> bool {
        self.expires.map_or(false, |expires| expires < now)
    }

    pub fn has_expired(&self) -> bool {
        self.has_expired_at(now_timestamp())
    }

    /// Seconds of validity left counting from `start`, `None` when unbounded
    pub fn remaining_from(&self, start: i64) -> Option<i64> {
        self.expires.map(|expires| expires.saturating_sub(start))
    }
}

/// OAuth2 grant types supported by the session managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantType {
    /// Value of the `grant_type` form field
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "password" => Ok(GrantType::Password),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(format!("Unknown grant type: {}", other)),
        }
    }
}

/// Reference instant for measuring the requested session duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationStart {
    /// The moment `connect` is called, resolved separately for every call
    CallTime,
    /// A fixed Unix timestamp in seconds
    At(i64),
}

impl DurationStart {
    pub fn resolve(&self, now: i64) -> i64 {
        match self {
            DurationStart::CallTime => now,
            DurationStart::At(timestamp) => *timestamp,
        }
    }
}

/// Minimum session duration requirements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationOptions {
    /// Minimum remaining lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Maximum lifetime supported by the provider in seconds, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DurationStart>,
}

/// Session manager options
///
/// Every field is optional so that caller-supplied options can be merged over
/// a manager's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    pub duration: DurationOptions,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub grant: GrantParams,
}

impl ManagerOptions {
    pub fn with_type_id<S: Into<String>>(mut self, type_id: S) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    pub fn with_interval(mut self, interval: u64) -> Self {
        self.duration.interval = Some(interval);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.duration.limit = Some(limit);
        self
    }

    pub fn with_start(mut self, start: DurationStart) -> Self {
        self.duration.start = Some(start);
        self
    }

    pub fn with_grant_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.grant.insert(key.into(), value.into());
        self
    }

    /// Merge these options over `defaults`
    ///
    /// Scalar values set here win; grant parameters are merged key by key.
    pub fn merged_over(&self, defaults: &ManagerOptions) -> ManagerOptions {
        let mut grant = defaults.grant.clone();
        grant.extend(self.grant.iter().map(|(k, v)| (k.clone(), v.clone())));

        ManagerOptions {
            type_id: self.type_id.clone().or_else(|| defaults.type_id.clone()),
            duration: DurationOptions {
                interval: self.duration.interval.or(defaults.duration.interval),
                limit: self.duration.limit.or(defaults.duration.limit),
                start: self.duration.start.or(defaults.duration.start),
            },
            grant,
        }
    }

    /// The session type ID these options select
    pub fn effective_type_id(&self) -> &str {
        self.type_id.as_deref().unwrap_or(DEFAULT_SESSION_TYPE_ID)
    }
}

/// How the client authenticates itself against the token endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// HTTP Basic authentication (`client_secret_basic`)
    #[default]
    Basic,
    /// Credentials sent as form fields (`client_secret_post`)
    Post,
}

/// Authorization server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub token_url: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub auth_method: ClientAuthMethod,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("apisession/{}", env!("CARGO_PKG_VERSION"))
}

/// Available session storage backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

/// Session storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory for the file backend, database file for SQLite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Whether a renewed credential keeps the session identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionVariant {
    /// Every new credential is a new session
    #[default]
    Immutable,
    /// The session is renewed in place and keeps its ID
    Renewable,
}

/// Session settings of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub grant_type: GrantType,
    #[serde(default)]
    pub variant: SessionVariant,
    #[serde(default)]
    pub options: ManagerOptions,
}

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSessionConfig {
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub session: SessionSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_without_expiration_never_expires() {
        let token = AccessToken::new("abc");
        assert!(!token.has_expired_at(i64::MAX));
        assert_eq!(token.remaining_from(0), None);
    }

    #[test]
    fn test_token_expires_strictly_after_timestamp() {
        let token = AccessToken::new("abc").with_expires(1_000);
        assert!(!token.has_expired_at(999));
        assert!(!token.has_expired_at(1_000));
        assert!(token.has_expired_at(1_001));
        assert_eq!(token.remaining_from(900), Some(100));
    }

    #[test]
    fn test_merge_keeps_defaults_and_overrides_scalars() {
        let defaults = ManagerOptions::default()
            .with_start(DurationStart::CallTime)
            .with_grant_param("scope", "read")
            .with_grant_param("username", "svc");
        let overrides = ManagerOptions::default()
            .with_interval(600)
            .with_type_id("app.user_import")
            .with_grant_param("scope", "write");

        let merged = overrides.merged_over(&defaults);
        assert_eq!(merged.duration.interval, Some(600));
        assert_eq!(merged.duration.start, Some(DurationStart::CallTime));
        assert_eq!(merged.grant.get("scope").map(String::as_str), Some("write"));
        assert_eq!(merged.grant.get("username").map(String::as_str), Some("svc"));
        assert_eq!(merged.effective_type_id(), "app.user_import");
    }

    #[test]
    fn test_effective_type_id_defaults() {
        assert_eq!(
            ManagerOptions::default().effective_type_id(),
            DEFAULT_SESSION_TYPE_ID
        );
    }

    #[test]
    fn test_options_toml_round_trip() {
        let toml_src = r#"
            type_id = "app.export"

            [duration]
            interval = 300
            limit = 3600
            start = "call_time"

            [grant]
            scope = "api"
        "#;

        let options: ManagerOptions = toml::from_str(toml_src).unwrap();
        assert_eq!(options.duration.interval, Some(300));
        assert_eq!(options.duration.limit, Some(3600));
        assert_eq!(options.duration.start, Some(DurationStart::CallTime));
        assert_eq!(options.grant.get("scope").map(String::as_str), Some("api"));

        let fixed: ManagerOptions =
            toml::from_str("[duration]\nstart = { at = 1700000000 }\n").unwrap();
        assert_eq!(fixed.duration.start, Some(DurationStart::At(1_700_000_000)));
    }

    #[test]
    fn test_grant_type_parsing() {
        assert_eq!("password".parse::<GrantType>(), Ok(GrantType::Password));
        assert_eq!(GrantType::RefreshToken.to_string(), "refresh_token");
        assert!("implicit".parse::<GrantType>().is_err());
    }
}
