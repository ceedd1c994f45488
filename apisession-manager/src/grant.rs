//! Grant strategies
//!
//! A grant strategy knows which parameters its OAuth2 grant needs and how to
//! obtain a token for it. New grants can be added by implementing
//! [`GrantStrategy`] without touching the session manager.

use apisession_core::{
    invalid_configuration, AccessToken, GrantParams, GrantType, ProviderError, SessionError,
    SessionResult, TokenProvider,
};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Strategy for one OAuth2 grant type
#[async_trait]
pub trait GrantStrategy: Debug + Send + Sync {
    fn grant_type(&self) -> GrantType;

    /// Grant parameters that must be present and non-empty at authentication
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// Structural check applied when options are set
    ///
    /// Required parameters may still be missing at this point; only a
    /// required parameter that is present but empty is rejected.
    fn check_options(&self, params: &GrantParams) -> SessionResult<()> {
        for name in self.required_params() {
            if params.get(*name).is_some_and(|value| value.is_empty()) {
                return Err(SessionError::invalid_configuration(
                    format!("Grant parameter '{}' must not be empty", name),
                    Some(&format!("grant.{}", name)),
                ));
            }
        }
        Ok(())
    }

    /// Build the parameters sent to the provider
    ///
    /// `previous` is the credential of the last stored session of the same
    /// type, expired or not.
    fn derive_params(
        &self,
        params: &GrantParams,
        previous: Option<&AccessToken>,
    ) -> SessionResult<GrantParams> {
        let _ = previous;
        require_params(self.required_params(), params)?;
        Ok(params.clone())
    }

    /// Request a token for the prepared parameters
    async fn authenticate(
        &self,
        provider: &dyn TokenProvider,
        params: &GrantParams,
    ) -> Result<AccessToken, ProviderError> {
        provider.request_token(self.grant_type(), params).await
    }
}

fn require_params(required: &[&str], params: &GrantParams) -> SessionResult<()> {
    for name in required {
        let field = format!("grant.{}", name);
        match params.get(*name) {
            Some(value) if !value.is_empty() => {}
            Some(_) => {
                return Err(invalid_configuration!(
                    format!("Grant parameter '{}' must not be empty", name),
                    &field
                ))
            }
            None => {
                return Err(invalid_configuration!(
                    format!("Missing required grant parameter '{}'", name),
                    &field
                ))
            }
        }
    }
    Ok(())
}

/// Client credentials grant; only the client itself is authenticated
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientCredentialsGrant;

impl GrantStrategy for ClientCredentialsGrant {
    fn grant_type(&self) -> GrantType {
        GrantType::ClientCredentials
    }
}

/// Resource owner password credentials grant
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordGrant;

impl GrantStrategy for PasswordGrant {
    fn grant_type(&self) -> GrantType {
        GrantType::Password
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["username", "password"]
    }
}

/// Refresh token grant
///
/// Without an explicit `refresh_token` parameter the refresh token of the
/// previously stored session is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshTokenGrant;

impl GrantStrategy for RefreshTokenGrant {
    fn grant_type(&self) -> GrantType {
        GrantType::RefreshToken
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["refresh_token"]
    }

    fn derive_params(
        &self,
        params: &GrantParams,
        previous: Option<&AccessToken>,
    ) -> SessionResult<GrantParams> {
        if params.contains_key("refresh_token") {
            require_params(self.required_params(), params)?;
            return Ok(params.clone());
        }

        let Some(previous) = previous else {
            return Err(SessionError::invalid_configuration(
                "No refresh token configured and no stored session to take one from",
                Some("grant.refresh_token"),
            ));
        };

        let refresh_token = previous
            .refresh_token()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SessionError::invalid_configuration(
                    "No refresh token configured and the stored session has none",
                    Some("grant.refresh_token"),
                )
            })?;

        let mut derived = params.clone();
        derived.insert("refresh_token".to_string(), refresh_token.to_string());
        Ok(derived)
    }
}

/// Strategy for a grant type tag
pub fn strategy_for(grant_type: GrantType) -> Arc<dyn GrantStrategy> {
    match grant_type {
        GrantType::ClientCredentials => Arc::new(ClientCredentialsGrant),
        GrantType::Password => Arc::new(PasswordGrant),
        GrantType::RefreshToken => Arc::new(RefreshTokenGrant),
    }
}
