//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and proper error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type SessionResult<T> = Result<T, SessionError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for session management
///
/// Callers that only care whether a working session could be obtained match on
/// [`SessionError::Connection`]; configuration mistakes surface as
/// [`SessionError::InvalidConfiguration`] before any storage or network access.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Create a configuration error for the given option key
    pub fn invalid_configuration<S: Into<String>>(message: S, field: Option<&str>) -> Self {
        let mut context = ErrorContext::new("session_manager").with_operation("validate_options");
        if let Some(field) = field {
            context = context.with_metadata("field", field);
        }

        Self::InvalidConfiguration {
            message: message.into(),
            field: field.map(str::to_string),
            context,
        }
    }

    /// Create a connection error without an underlying cause
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
            context: ErrorContext::new("session_manager").with_operation("connect"),
        }
    }

    /// Create a connection error wrapping a collaborator failure
    pub fn connection_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
            context: ErrorContext::new("session_manager").with_operation("authenticate"),
        }
    }

    /// Create a storage error for a backend component
    pub fn storage<S, E>(message: S, component: &str, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
            context: ErrorContext::new(component),
        }
    }

    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            SessionError::InvalidConfiguration { context, .. } => Some(context),
            SessionError::Connection { context, .. } => Some(context),
            SessionError::Storage { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, SessionError::InvalidConfiguration { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, SessionError::Connection { .. })
    }

    /// Check if error is recoverable
    ///
    /// A connection failure caused by a transport problem may succeed on a
    /// later attempt; a rejected grant or a duration that cannot be guaranteed
    /// will not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::InvalidConfiguration { .. } => false,
            SessionError::Connection {
                source: Some(source),
                ..
            } => {
                if let Some(provider) = source.downcast_ref::<ProviderError>() {
                    provider.is_recoverable()
                } else if let Some(inner) = source.downcast_ref::<SessionError>() {
                    inner.is_recoverable()
                } else {
                    false
                }
            }
            SessionError::Connection { .. } => false,
            SessionError::Storage { .. } => true,
            SessionError::Io(_) => true,
            SessionError::Serialization(_) => false,
        }
    }

    /// Get error category for logs and CLI output
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::InvalidConfiguration { .. } => "invalid_configuration",
            SessionError::Connection { .. } => "connection",
            SessionError::Storage { .. } => "storage",
            SessionError::Io(_) => "io",
            SessionError::Serialization(_) => "serialization",
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            SessionError::InvalidConfiguration { field, .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    field = ?field,
                    error = %self,
                    "Configuration error"
                );
            }
            SessionError::Connection { .. } if self.is_recoverable() => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Connection error (may be recoverable)"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    category = self.category(),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Failure reported by a [`crate::TokenProvider`]
///
/// The session manager never surfaces these directly; they arrive wrapped as
/// the source of a [`SessionError::Connection`].
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Authorization server rejected the request: {error}{}", describe(.description))]
    Rejected {
        error: String,
        description: Option<String>,
        status: Option<u16>,
    },

    #[error("Malformed token response: {message}")]
    MalformedResponse { message: String },
}

impl ProviderError {
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn rejected<S: Into<String>>(error: S, description: Option<String>) -> Self {
        Self::Rejected {
            error: error.into(),
            description,
            status: None,
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            ProviderError::Transport { .. } => true,
            ProviderError::Rejected { status, .. } => matches!(status, Some(s) if *s >= 500),
            ProviderError::MalformedResponse { .. } => false,
        }
    }
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! invalid_configuration {
    ($msg:expr) => {
        $crate::SessionError::InvalidConfiguration {
            message: $msg.to_string(),
            field: None,
            context: $crate::ErrorContext::new("session_manager")
                .with_suggestion("Check the session manager options"),
        }
    };
    ($msg:expr, $field:expr) => {
        $crate::SessionError::InvalidConfiguration {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new("session_manager")
                .with_metadata("field", $field)
                .with_suggestion("Check the session manager options"),
        }
    };
}

#[macro_export]
macro_rules! connection_error {
    ($msg:expr, $component:expr) => {
        $crate::SessionError::Connection {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::SessionError::Connection {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::SessionError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the session store is reachable and writable"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::SessionError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the session store is reachable and writable"),
        }
    };
}
