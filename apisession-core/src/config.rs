//! Configuration management

use crate::error::{ErrorContext, SessionError, SessionResult};
use crate::types::{
    ApiSessionConfig, ClientAuthMethod, DurationStart, GrantType, ManagerOptions, ProviderConfig,
    SessionSettings, SessionVariant, StorageBackend, StorageConfig,
};

use std::path::Path;

impl Default for ApiSessionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                token_url: "https://auth.example.com/oauth2/token".to_string(),
                client_id: "my-client-id".to_string(),
                client_secret: None,
                auth_method: ClientAuthMethod::Basic,
                timeout_secs: 30,
                user_agent: format!("apisession/{}", env!("CARGO_PKG_VERSION")),
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                path: Some("~/.apisession/sessions".to_string()),
            },
            session: SessionSettings {
                grant_type: GrantType::ClientCredentials,
                variant: SessionVariant::Immutable,
                options: ManagerOptions::default().with_start(DurationStart::CallTime),
            },
        }
    }
}

fn config_error(message: String, operation: &str, suggestion: &str) -> SessionError {
    SessionError::InvalidConfiguration {
        message,
        field: None,
        context: ErrorContext::new("config")
            .with_operation(operation)
            .with_suggestion(suggestion),
    }
}

fn field_error(message: &str, field: &str, suggestion: &str) -> SessionError {
    SessionError::InvalidConfiguration {
        message: message.to_string(),
        field: Some(field.to_string()),
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_metadata("field", field)
            .with_suggestion(suggestion),
    }
}

impl ApiSessionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            config_error(
                format!("Failed to read config file: {}", e),
                "read_file",
                "Check if the config file exists and is readable",
            )
        })?;

        let config: ApiSessionConfig = toml::from_str(&content).map_err(|e| {
            config_error(
                format!("Failed to parse config: {}", e),
                "parse_toml",
                "Check TOML syntax in config file",
            )
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> SessionResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            config_error(
                format!("Failed to serialize config: {}", e),
                "serialize_toml",
                "Report this as a bug",
            )
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| {
            config_error(
                format!("Failed to write config file: {}", e),
                "write_file",
                "Check if the directory exists and is writable",
            )
        })?;

        Ok(())
    }

    /// Validate the configuration structure
    ///
    /// Duration consistency and grant completeness are checked by the session
    /// manager when it connects.
    pub fn validate(&self) -> SessionResult<()> {
        url::Url::parse(&self.provider.token_url).map_err(|e| {
            field_error(
                &format!("Token URL is not a valid URL: {}", e),
                "provider.token_url",
                "Set provider.token_url to the absolute URL of the token endpoint",
            )
        })?;

        if self.provider.client_id.trim().is_empty() {
            return Err(field_error(
                "Client ID must not be empty",
                "provider.client_id",
                "Set provider.client_id to the ID issued by the authorization server",
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(field_error(
                "Request timeout must be greater than 0",
                "provider.timeout_secs",
                "Set provider.timeout_secs to a positive value",
            ));
        }

        let needs_path = matches!(
            self.storage.backend,
            StorageBackend::File | StorageBackend::Sqlite
        );
        if needs_path
            && self
                .storage
                .path
                .as_deref()
                .map_or(true, |p| p.trim().is_empty())
        {
            return Err(field_error(
                "Storage path is required for the file and sqlite backends",
                "storage.path",
                "Set storage.path to a directory (file) or database file (sqlite)",
            ));
        }

        if let Some(type_id) = &self.session.options.type_id {
            if type_id.trim().is_empty() {
                return Err(field_error(
                    "Session type ID must not be empty",
                    "session.options.type_id",
                    "Remove type_id to use the default session type",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ApiSessionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_token_url_is_rejected() {
        let mut config = ApiSessionConfig::default();
        config.provider.token_url = "not a url".to_string();

        match config.validate() {
            Err(SessionError::InvalidConfiguration { field, .. }) => {
                assert_eq!(field.as_deref(), Some("provider.token_url"));
            }
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn test_file_backend_requires_path() {
        let mut config = ApiSessionConfig::default();
        config.storage.path = None;
        assert!(config.validate().is_err());

        config.storage.backend = StorageBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ApiSessionConfig::default();
        config.session.grant_type = GrantType::Password;
        config.session.options = config
            .session
            .options
            .clone()
            .with_interval(600)
            .with_grant_param("username", "svc-account");

        config.save_to_file(&path).unwrap();
        let loaded = ApiSessionConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
