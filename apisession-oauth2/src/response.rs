//! Token endpoint response parsing

use apisession_core::{AccessToken, ProviderError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// `expires` values above this instant (2012-10-01, the publication of
/// RFC 6749) are absolute timestamps; smaller values are relative seconds.
pub const EXPIRES_TIMESTAMP_THRESHOLD: i64 = 1_349_067_600;

/// Successful token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    expires: Option<Value>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// RFC 6749 error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Some servers send numbers as strings
fn as_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn expiration(response: &TokenResponse, now: i64) -> Result<Option<i64>, ProviderError> {
    if let Some(value) = &response.expires_in {
        let seconds = as_seconds(value)
            .ok_or_else(|| ProviderError::malformed(format!("invalid expires_in: {}", value)))?;
        return relative_to(now, seconds).map(Some);
    }

    if let Some(value) = &response.expires {
        let expires = as_seconds(value)
            .ok_or_else(|| ProviderError::malformed(format!("invalid expires: {}", value)))?;
        if expires > EXPIRES_TIMESTAMP_THRESHOLD {
            return Ok(Some(expires));
        }
        return relative_to(now, expires).map(Some);
    }

    Ok(None)
}

fn relative_to(now: i64, seconds: i64) -> Result<i64, ProviderError> {
    now.checked_add(seconds).ok_or_else(|| {
        ProviderError::malformed(format!("token lifetime out of range: {}s", seconds))
    })
}

/// Parse a successful token response body
pub fn parse_token_response(body: &str, now: i64) -> Result<AccessToken, ProviderError> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::malformed(format!("invalid token response: {}", e)))?;

    if response.access_token.is_empty() {
        return Err(ProviderError::malformed("access_token is empty"));
    }

    let expires = expiration(&response, now)?;

    let mut token = AccessToken::new(response.access_token);
    if let Some(expires) = expires {
        token = token.with_expires(expires);
    }
    if let Some(token_type) = response.token_type {
        token = token.with_token_type(token_type);
    }
    if let Some(refresh_token) = response.refresh_token {
        token = token.with_refresh_token(refresh_token);
    }
    if let Some(scope) = response.scope {
        token = token.with_scope(scope);
    }
    for (key, value) in response.extra {
        token = token.with_value(key, value);
    }

    Ok(token)
}

/// Turn a non-success response into a provider error
///
/// Bodies that are not RFC 6749 errors are reported with the HTTP status as
/// the error code.
pub fn parse_error_response(status: u16, body: &str) -> ProviderError {
    let (error, description) = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(response) => (response.error, response.error_description),
        Err(_) => {
            let text = body.trim();
            let description = (!text.is_empty()).then(|| text.chars().take(200).collect());
            (format!("http_{}", status), description)
        }
    };

    ProviderError::Rejected {
        error,
        description,
        status: Some(status),
    }
}
