use apisession_core::{
    now_timestamp, storage_error, ExpiringSessionStorage, ExpiryFilter, SessionResult,
    SessionStorage, TokenSession,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

const COMPONENT: &str = "sqlite_storage";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS api_sessions (
    type_id TEXT PRIMARY KEY NOT NULL,
    session_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    expires_at INTEGER,
    scheduled_expiry INTEGER,
    updated_at INTEGER NOT NULL
)
"#;

/// Rows that are not expired at the bound instant (bound twice)
const LIVE: &str = "(expires_at IS NULL OR expires_at >= ?) \
                    AND (scheduled_expiry IS NULL OR scheduled_expiry > ?)";

/// SQLite session storage
///
/// Expiry filtering happens in SQL, so expired rows are never loaded for
/// filtered reads.
#[derive(Debug, Clone)]
pub struct SqliteSessionStorage {
    pool: SqlitePool,
}

impl SqliteSessionStorage {
    /// Wrap an existing pool; call [`SqliteSessionStorage::migrate`] before use
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a database URL and create the schema
    pub async fn from_url(database_url: &str) -> SessionResult<Self> {
        let pool = SqlitePool::connect(database_url).await.map_err(|e| {
            storage_error!("Failed to connect to SQLite database", COMPONENT, e)
        })?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Open a database file, creating it when missing
    pub async fn open<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            storage_error!(
                format!("Failed to open SQLite database {}", path.as_ref().display()),
                COMPONENT,
                e
            )
        })?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Private in-memory database
    ///
    /// Every SQLite connection to `:memory:` sees its own database, so the
    /// pool is pinned to a single connection that is never recycled.
    pub async fn in_memory() -> SessionResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| storage_error!("Failed to create in-memory database", COMPONENT, e))?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Create the sessions table
    pub async fn migrate(&self) -> SessionResult<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error!("Database migration failed", COMPONENT, e))?;

        info!("Session database schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl<S: TokenSession> SessionStorage<S> for SqliteSessionStorage {
    async fn set(&self, session: &S) -> SessionResult<()> {
        let payload = serde_json::to_string(session)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO api_sessions
            (type_id, session_id, payload, expires_at, scheduled_expiry, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(session.session_type())
        .bind(session.session_id())
        .bind(payload)
        .bind(session.expires())
        .bind(now_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error!("Failed to save session to database", COMPONENT, e))?;

        debug!(
            "Saved session {} for type {} to SQLite storage",
            session.session_id(),
            session.session_type()
        );
        Ok(())
    }

    async fn get(&self, type_id: &str, filter: ExpiryFilter) -> SessionResult<Option<S>> {
        let row = if filter.skips_expired() {
            let now = now_timestamp();
            sqlx::query(&format!(
                "SELECT payload FROM api_sessions WHERE type_id = ? AND {}",
                LIVE
            ))
            .bind(type_id)
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
        } else {
            sqlx::query("SELECT payload FROM api_sessions WHERE type_id = ?")
                .bind(type_id)
                .fetch_optional(&self.pool)
                .await
        }
        .map_err(|e| storage_error!("Failed to load session from database", COMPONENT, e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row
            .try_get("payload")
            .map_err(|e| storage_error!("Failed to get payload column", COMPONENT, e))?;
        let session = serde_json::from_str(&payload)?;

        Ok(Some(session))
    }

    async fn delete(&self, type_id: &str) -> SessionResult<()> {
        let result = sqlx::query("DELETE FROM api_sessions WHERE type_id = ?")
            .bind(type_id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error!("Failed to delete session from database", COMPONENT, e))?;

        if result.rows_affected() > 0 {
            debug!("Deleted session of type {} from SQLite storage", type_id);
        }
        Ok(())
    }

    async fn count(&self, filter: ExpiryFilter) -> SessionResult<usize> {
        let count: i64 = if filter.skips_expired() {
            let now = now_timestamp();
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM api_sessions WHERE {}", LIVE))
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool)
                .await
        } else {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_sessions")
                .fetch_one(&self.pool)
                .await
        }
        .map_err(|e| storage_error!("Failed to count sessions", COMPONENT, e))?;

        Ok(count as usize)
    }
}

#[async_trait]
impl<S: TokenSession> ExpiringSessionStorage<S> for SqliteSessionStorage {
    async fn expire(&self, type_id: &str, interval: u64) -> SessionResult<()> {
        let at = super::expiry_after(now_timestamp(), interval);

        sqlx::query("UPDATE api_sessions SET scheduled_expiry = ? WHERE type_id = ?")
            .bind(at)
            .bind(type_id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error!("Failed to schedule session expiry", COMPONENT, e))?;

        debug!("Session of type {} expires in {}s", type_id, interval);
        Ok(())
    }

    async fn delete_expired(&self, type_id: Option<&str>) -> SessionResult<usize> {
        let now = now_timestamp();

        let result = match type_id {
            Some(type_id) => {
                sqlx::query(&format!(
                    "DELETE FROM api_sessions WHERE type_id = ? AND NOT ({})",
                    LIVE
                ))
                .bind(type_id)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("DELETE FROM api_sessions WHERE NOT ({})", LIVE))
                    .bind(now)
                    .bind(now)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(|e| storage_error!("Failed to delete expired sessions", COMPONENT, e))?;

        let removed = result.rows_affected() as usize;
        if removed > 0 {
            debug!("Removed {} expired sessions from SQLite storage", removed);
        }
        Ok(removed)
    }
}
