//! HTTP client for an OAuth2 token endpoint

use crate::response::{parse_error_response, parse_token_response};
use apisession_core::{
    now_timestamp, AccessToken, ClientAuthMethod, ErrorContext, GrantParams, GrantType,
    ProviderConfig, ProviderError, SessionError, SessionResult, TokenProvider,
};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Token endpoint client
///
/// Sends `application/x-www-form-urlencoded` token requests and authenticates
/// the client either with HTTP Basic or with form fields.
pub struct TokenEndpointClient {
    client: reqwest::Client,
    config: ProviderConfig,
    token_url: url::Url,
}

fn client_error(message: String, suggestion: &str) -> SessionError {
    SessionError::InvalidConfiguration {
        message,
        field: None,
        context: ErrorContext::new("token_endpoint_client")
            .with_operation("create_client")
            .with_suggestion(suggestion),
    }
}

/// Create the HTTP client with common configuration
fn create_http_client(config: &ProviderConfig) -> SessionResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            client_error(
                format!("Invalid user agent: {}", e),
                "Use printable ASCII in provider.user_agent",
            )
        })?,
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| {
            client_error(
                format!("Failed to create HTTP client: {}", e),
                "Check the TLS setup of this system",
            )
        })
}

impl TokenEndpointClient {
    /// Create a new token endpoint client
    pub fn new(config: ProviderConfig) -> SessionResult<Self> {
        let token_url = url::Url::parse(&config.token_url).map_err(|e| {
            SessionError::invalid_configuration(
                format!("Token URL is not a valid URL: {}", e),
                Some("provider.token_url"),
            )
        })?;
        let client = create_http_client(&config)?;

        info!("Created token endpoint client for {}", token_url);

        Ok(Self {
            client,
            config,
            token_url,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Form fields of a token request
    fn form(&self, grant_type: GrantType, params: &GrantParams) -> Vec<(String, String)> {
        let mut form = vec![("grant_type".to_string(), grant_type.as_str().to_string())];
        form.extend(
            params
                .iter()
                .filter(|(key, _)| key.as_str() != "grant_type")
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let basic = self.config.auth_method == ClientAuthMethod::Basic
            && self.config.client_secret.is_some();
        if !basic {
            form.push(("client_id".to_string(), self.config.client_id.clone()));
            if let Some(secret) = &self.config.client_secret {
                form.push(("client_secret".to_string(), secret.clone()));
            }
        }

        form
    }

    fn request(&self, grant_type: GrantType, params: &GrantParams) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(self.token_url.clone())
            .form(&self.form(grant_type, params));

        if let (ClientAuthMethod::Basic, Some(secret)) =
            (self.config.auth_method, &self.config.client_secret)
        {
            // RFC 6749 section 2.3.1: credentials are form-encoded first
            request = request.basic_auth(
                urlencoding::encode(&self.config.client_id),
                Some(urlencoding::encode(secret)),
            );
        }

        request
    }
}

#[async_trait]
impl TokenProvider for TokenEndpointClient {
    async fn request_token(
        &self,
        grant_type: GrantType,
        params: &GrantParams,
    ) -> Result<AccessToken, ProviderError> {
        debug!(
            "Requesting {} token from {}",
            grant_type.as_str(),
            self.token_url
        );

        let response = self
            .request(grant_type, params)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                message: format!("Failed to reach token endpoint {}", self.token_url),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transport {
            message: "Failed to read token response".to_string(),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            let error = parse_error_response(status.as_u16(), &body);
            warn!("Token endpoint returned HTTP {}: {}", status.as_u16(), error);
            return Err(error);
        }

        let token = parse_token_response(&body, now_timestamp())?;
        debug!("Received {} token, expires {:?}", grant_type.as_str(), token.expires());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth_method: ClientAuthMethod, secret: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            token_url: "https://auth.example.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: secret.map(str::to_string),
            auth_method,
            timeout_secs: 5,
            user_agent: "apisession-test".to_string(),
        }
    }

    #[test]
    fn test_invalid_token_url_is_rejected() {
        let mut config = config(ClientAuthMethod::Basic, None);
        config.token_url = "::".to_string();

        assert!(TokenEndpointClient::new(config)
            .err()
            .is_some_and(|e| e.is_invalid_configuration()));
    }

    #[test]
    fn test_post_auth_sends_credentials_in_form() {
        let client =
            TokenEndpointClient::new(config(ClientAuthMethod::Post, Some("secret"))).unwrap();
        let mut params = GrantParams::new();
        params.insert("scope".to_string(), "api".to_string());

        let form = client.form(GrantType::ClientCredentials, &params);
        assert_eq!(form[0], ("grant_type".into(), "client_credentials".into()));
        assert!(form.contains(&("scope".into(), "api".into())));
        assert!(form.contains(&("client_id".into(), "client".into())));
        assert!(form.contains(&("client_secret".into(), "secret".into())));
    }

    #[test]
    fn test_basic_auth_keeps_secret_out_of_form() {
        let client =
            TokenEndpointClient::new(config(ClientAuthMethod::Basic, Some("secret"))).unwrap();
        let form = client.form(GrantType::Password, &GrantParams::new());

        assert!(!form.iter().any(|(k, _)| k == "client_secret"));
        assert!(!form.iter().any(|(k, _)| k == "client_id"));

        // Public clients identify themselves in the form
        let public = TokenEndpointClient::new(config(ClientAuthMethod::Basic, None)).unwrap();
        let form = public.form(GrantType::Password, &GrantParams::new());
        assert!(form.contains(&("client_id".into(), "client".into())));
    }
}
