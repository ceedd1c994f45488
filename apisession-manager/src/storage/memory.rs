use super::StoredSession;
use apisession_core::{
    now_timestamp, ExpiringSessionStorage, ExpiryFilter, SessionResult, SessionStorage,
    TokenSession,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory session storage
///
/// Sessions live as long as the storage value; clones share the same map.
#[derive(Debug, Clone)]
pub struct MemorySessionStorage<S> {
    sessions: Arc<RwLock<HashMap<String, StoredSession<S>>>>,
}

impl<S: TokenSession> MemorySessionStorage<S> {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<S: TokenSession> Default for MemorySessionStorage<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: TokenSession> SessionStorage<S> for MemorySessionStorage<S> {
    async fn set(&self, session: &S) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session.session_type().to_string(),
            StoredSession::new(session.clone()),
        );
        debug!(
            "Stored session {} for type {} in memory",
            session.session_id(),
            session.session_type()
        );
        Ok(())
    }

    async fn get(&self, type_id: &str, filter: ExpiryFilter) -> SessionResult<Option<S>> {
        let now = now_timestamp();
        let sessions = self.sessions.read().await;

        Ok(sessions
            .get(type_id)
            .filter(|entry| !(filter.skips_expired() && entry.is_expired_at(now)))
            .map(|entry| entry.session.clone()))
    }

    async fn delete(&self, type_id: &str) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(type_id).is_some() {
            debug!("Deleted session of type {} from memory", type_id);
        }
        Ok(())
    }

    async fn count(&self, filter: ExpiryFilter) -> SessionResult<usize> {
        let now = now_timestamp();
        let sessions = self.sessions.read().await;

        Ok(sessions
            .values()
            .filter(|entry| !(filter.skips_expired() && entry.is_expired_at(now)))
            .count())
    }
}

#[async_trait]
impl<S: TokenSession> ExpiringSessionStorage<S> for MemorySessionStorage<S> {
    async fn expire(&self, type_id: &str, interval: u64) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(type_id) {
            entry.schedule_expiry(now_timestamp(), interval);
            debug!("Session of type {} expires in {}s", type_id, interval);
        }
        Ok(())
    }

    async fn delete_expired(&self, type_id: Option<&str>) -> SessionResult<usize> {
        let now = now_timestamp();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|key, entry| {
            let selected = type_id.map_or(true, |t| t == key);
            !(selected && entry.is_expired_at(now))
        });

        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Removed {} expired sessions from memory", removed);
        }
        Ok(removed)
    }
}
