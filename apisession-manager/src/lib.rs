//! apisession manager - keeps OAuth2 access token sessions alive
//!
//! Builds on the abstractions of `apisession-core`:
//!
//! - Token session variants (immutable and renewable)
//! - Grant strategies for client credentials, password and refresh token grants
//! - The session manager with its reuse / refresh decision
//! - In-memory, file and SQLite session storage backends
//!
//! ```no_run
//! use std::sync::Arc;
//! use apisession_core::{ManagerOptions, TokenProvider, TokenSession};
//! use apisession_manager::{AccessTokenSession, MemorySessionStorage, SessionManager};
//!
//! # async fn run(provider: Arc<dyn TokenProvider>) -> apisession_core::SessionResult<()> {
//! let storage = Arc::new(MemorySessionStorage::<AccessTokenSession>::new());
//! let mut manager: SessionManager<AccessTokenSession> =
//!     SessionManager::client_credentials(provider, storage);
//! manager.set_options(ManagerOptions::default().with_interval(300))?;
//!
//! let session = manager.connect().await?;
//! println!("token: {}", session.access_token().token());
//! # Ok(())
//! # }
//! ```

pub mod grant;
pub mod session;
pub mod storage;

pub use grant::{
    strategy_for, ClientCredentialsGrant, GrantStrategy, PasswordGrant, RefreshTokenGrant,
};
pub use session::{
    mask_token, AccessTokenSession, RenewableAccessTokenSession, ResolvedOptions, SessionInfo,
    SessionManager,
};
#[cfg(feature = "sqlite")]
pub use storage::SqliteSessionStorage;
pub use storage::{FileSessionStorage, MemorySessionStorage, StoredSession};
