//! Integration tests for apisession-core infrastructure

use apisession_core::{
    connection_error, init_logging, invalid_configuration, performance, storage_error,
    AccessToken, ApiSessionConfig, ErrorContext, LogFormat, LoggingConfig, ProviderError,
    SessionError,
};

#[tokio::test]
async fn test_error_macros() {
    let error = invalid_configuration!("Missing password", "grant.password");

    match &error {
        SessionError::InvalidConfiguration {
            message,
            field,
            context,
        } => {
            assert_eq!(message, "Missing password");
            assert_eq!(field.as_deref(), Some("grant.password"));
            assert_eq!(context.component, "session_manager");
            assert!(!context.error_id.is_empty());
            assert!(!context.recovery_suggestions.is_empty());
        }
        other => panic!("Expected InvalidConfiguration error, got {:?}", other),
    }

    // Should not panic
    error.log();

    let wrapped = connection_error!(
        "Token request failed",
        "test",
        ProviderError::transport("connection refused")
    );
    assert!(wrapped.is_connection());
    assert!(wrapped.is_recoverable());
    assert_eq!(
        std::error::Error::source(&wrapped).map(|s| s.to_string()),
        Some("Transport error: connection refused".to_string())
    );

    let storage = storage_error!("Disk full", "file_storage");
    assert_eq!(storage.category(), "storage");
    assert!(storage.is_recoverable());
}

#[tokio::test]
async fn test_error_context_builder() {
    let context = ErrorContext::new("sqlite_storage")
        .with_operation("set")
        .with_metadata("type_id", "app.user_import")
        .with_suggestion("Check database permissions");

    assert_eq!(context.operation.as_deref(), Some("set"));
    assert_eq!(
        context.metadata.get("type_id").map(String::as_str),
        Some("app.user_import")
    );
    assert_eq!(context.recovery_suggestions.len(), 1);
}

#[tokio::test]
async fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        include_location: false,
        include_thread: false,
        log_file_path: None,
        enable_performance_monitoring: false,
        filter_directives: vec!["apisession_core=debug".to_string()],
    };

    // A global subscriber can only be installed once per process; the second
    // attempt reports an error instead of panicking.
    let _ = init_logging(&config);
    assert!(init_logging(&config).is_err());
}

#[tokio::test]
async fn test_measure_async_returns_inner_value() {
    let value = performance::measure_async("compute", async { 21 * 2 }).await;
    assert_eq!(value, 42);
}

#[tokio::test]
async fn test_config_validation() {
    let mut config = ApiSessionConfig::default();
    assert!(config.validate().is_ok());

    config.provider.client_id = "  ".to_string();
    match config.validate().unwrap_err() {
        SessionError::InvalidConfiguration { message, field, .. } => {
            assert!(message.contains("Client ID"));
            assert_eq!(field.as_deref(), Some("provider.client_id"));
        }
        other => panic!("Expected InvalidConfiguration, got {:?}", other),
    }
}

#[tokio::test]
async fn test_access_token_serialization_skips_empty_fields() {
    let token = AccessToken::new("abc").with_expires(1_700_000_000);
    let json = serde_json::to_value(&token).unwrap();

    assert_eq!(
        json,
        serde_json::json!({ "access_token": "abc", "expires": 1_700_000_000 })
    );

    let parsed: AccessToken = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, token);
}
