//! Session Manager - connect, reuse and refresh token sessions
//!
//! On every `connect` the manager decides whether the stored session of its
//! type can be handed out, or whether a fresh token has to be requested.

use super::options::ResolvedOptions;
use crate::grant::{
    strategy_for, ClientCredentialsGrant, GrantStrategy, PasswordGrant, RefreshTokenGrant,
};
use apisession_core::{
    connection_error, log_operation_error, log_operation_start, log_operation_success,
    now_timestamp, DurationStart, ExpiryFilter, GrantType, ManagerOptions, SessionError, SessionResult,
    SessionStorage, TokenProvider, TokenSession,
};
use std::sync::Arc;
use tracing::{debug, info};

const COMPONENT: &str = "session_manager";

/// Session manager for one session type
///
/// Holds no state besides its configuration; concurrent `connect` calls may
/// both authenticate, in which case the last stored session wins.
pub struct SessionManager<S: TokenSession> {
    provider: Arc<dyn TokenProvider>,
    storage: Arc<dyn SessionStorage<S>>,
    grant: Arc<dyn GrantStrategy>,
    /// Options that `set_options` merges over
    defaults: ManagerOptions,
    /// Effective options
    options: ManagerOptions,
}

impl<S: TokenSession> SessionManager<S> {
    /// Create a new session manager with the built-in default options
    pub fn new(
        provider: Arc<dyn TokenProvider>,
        storage: Arc<dyn SessionStorage<S>>,
        grant: Arc<dyn GrantStrategy>,
    ) -> Self {
        let defaults = Self::default_options();

        Self {
            provider,
            storage,
            grant,
            options: defaults.clone(),
            defaults,
        }
    }

    /// Create a manager for the given grant type tag
    pub fn for_grant(
        grant_type: GrantType,
        provider: Arc<dyn TokenProvider>,
        storage: Arc<dyn SessionStorage<S>>,
    ) -> Self {
        Self::new(provider, storage, strategy_for(grant_type))
    }

    pub fn client_credentials(
        provider: Arc<dyn TokenProvider>,
        storage: Arc<dyn SessionStorage<S>>,
    ) -> Self {
        Self::new(provider, storage, Arc::new(ClientCredentialsGrant))
    }

    pub fn password(
        provider: Arc<dyn TokenProvider>,
        storage: Arc<dyn SessionStorage<S>>,
    ) -> Self {
        Self::new(provider, storage, Arc::new(PasswordGrant))
    }

    pub fn refresh_token(
        provider: Arc<dyn TokenProvider>,
        storage: Arc<dyn SessionStorage<S>>,
    ) -> Self {
        Self::new(provider, storage, Arc::new(RefreshTokenGrant))
    }

    /// Built-in defaults: the duration is measured from each `connect` call
    pub fn default_options() -> ManagerOptions {
        ManagerOptions::default().with_start(DurationStart::CallTime)
    }

    /// Replace the defaults that options are merged over
    ///
    /// The effective options are reset to the new defaults.
    pub fn with_defaults(mut self, defaults: ManagerOptions) -> Self {
        self.options = defaults.clone();
        self.defaults = defaults;
        self
    }

    /// Merge `options` over the defaults and make them effective
    ///
    /// Missing grant parameters are only reported by `connect`.
    pub fn set_options(&mut self, options: ManagerOptions) -> SessionResult<()> {
        let merged = options.merged_over(&self.defaults);

        if merged.type_id.as_deref().is_some_and(str::is_empty) {
            return Err(SessionError::invalid_configuration(
                "Session type ID must not be empty",
                Some("type_id"),
            ));
        }
        self.grant.check_options(&merged.grant)?;

        debug!(
            type_id = merged.effective_type_id(),
            grant_type = %self.grant.grant_type(),
            "Session manager options updated"
        );
        self.options = merged;
        Ok(())
    }

    /// Current effective options
    pub fn options(&self) -> ManagerOptions {
        self.options.clone()
    }

    pub fn grant_type(&self) -> GrantType {
        self.grant.grant_type()
    }

    /// Get a session that satisfies the configured duration
    ///
    /// Reuses the stored session when possible, otherwise authenticates and
    /// stores the result.
    pub async fn connect(&self) -> SessionResult<S> {
        let resolved = ResolvedOptions::resolve(&self.options, now_timestamp());
        log_operation_start!("connect", type_id = %resolved.type_id);

        match self.connect_resolved(&resolved).await {
            Ok(session) => {
                log_operation_success!(
                    "connect",
                    type_id = %resolved.type_id,
                    session_id = session.session_id()
                );
                Ok(session)
            }
            Err(e) => {
                log_operation_error!("connect", e, type_id = %resolved.type_id);
                Err(e)
            }
        }
    }

    async fn connect_resolved(&self, resolved: &ResolvedOptions) -> SessionResult<S> {
        resolved.validate()?;

        let type_id = resolved.type_id.as_str();
        let current = self
            .storage
            .get(type_id, ExpiryFilter::SkipExpired)
            .await
            .map_err(|e| connection_error!("Failed to load stored session", COMPONENT, e))?;

        let previous = match current {
            None => {
                debug!(type_id, "No usable session stored");
                self.storage
                    .get(type_id, ExpiryFilter::IncludeExpired)
                    .await
                    .map_err(|e| {
                        connection_error!("Failed to load previous session", COMPONENT, e)
                    })?
            }
            Some(session) if session.has_expired_at(resolved.now) => {
                info!(
                    type_id,
                    session_id = session.session_id(),
                    "Stored session has expired"
                );
                Some(session)
            }
            Some(session) if !resolved.is_sufficient(session.access_token()) => {
                info!(
                    type_id,
                    session_id = session.session_id(),
                    interval = resolved.interval,
                    "Stored session does not last long enough"
                );
                Some(session)
            }
            Some(session) => {
                debug!(
                    type_id,
                    session_id = session.session_id(),
                    "Reusing stored session"
                );
                return Ok(session);
            }
        };

        self.authenticate(resolved, previous).await
    }

    async fn authenticate(
        &self,
        resolved: &ResolvedOptions,
        previous: Option<S>,
    ) -> SessionResult<S> {
        let grant_type = self.grant.grant_type();
        let params = self.grant.derive_params(
            &resolved.grant,
            previous.as_ref().map(|session| session.access_token()),
        )?;

        debug!(type_id = %resolved.type_id, grant_type = %grant_type, "Requesting access token");

        let token = self
            .grant
            .authenticate(self.provider.as_ref(), &params)
            .await
            .map_err(|e| {
                SessionError::connection_with_source(
                    format!("Failed to obtain access token with {} grant", grant_type),
                    e,
                )
            })?;

        if !resolved.is_sufficient(&token) {
            return Err(SessionError::connection(format!(
                "Issued access token does not last the requested {}s",
                resolved.interval.unwrap_or_default()
            )));
        }

        let renewing = previous.is_some();
        let session = S::renew(previous, &resolved.type_id, token);
        self.storage
            .set(&session)
            .await
            .map_err(|e| connection_error!("Failed to store new session", COMPONENT, e))?;

        info!(
            type_id = %resolved.type_id,
            session_id = session.session_id(),
            renewed = renewing,
            expires = ?session.expires(),
            "Stored new access token session"
        );
        Ok(session)
    }
}
