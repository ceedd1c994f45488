use super::StoredSession;
use apisession_core::{
    now_timestamp, storage_error, ExpiringSessionStorage, ExpiryFilter, SessionResult,
    SessionStorage, TokenSession,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const COMPONENT: &str = "file_storage";

/// File based session storage
///
/// Keeps one pretty-printed JSON file per session type in a directory. File
/// names are the URL-encoded type ID, so any type ID maps to a valid name.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    storage_dir: PathBuf,
}

impl FileSessionStorage {
    /// Create a new file storage, creating the directory when missing
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> SessionResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&storage_dir).map_err(|e| {
            storage_error!(
                format!(
                    "Failed to create storage directory {}",
                    storage_dir.display()
                ),
                COMPONENT,
                e
            )
        })?;

        Ok(Self { storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn session_file(&self, type_id: &str) -> PathBuf {
        self.storage_dir
            .join(format!("{}.json", urlencoding::encode(type_id)))
    }

    async fn read_entry<S: TokenSession>(
        &self,
        path: &Path,
    ) -> SessionResult<Option<StoredSession<S>>> {
        let json_data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(storage_error!(
                    format!("Failed to read session file {}", path.display()),
                    COMPONENT,
                    e
                ))
            }
        };

        let entry = serde_json::from_str(&json_data).map_err(|e| {
            storage_error!(
                format!("Failed to parse session file {}", path.display()),
                COMPONENT,
                e
            )
        })?;

        Ok(Some(entry))
    }

    /// Write the entry to a temporary file and rename it over the session
    /// file, so readers see either the old or the new entry
    async fn write_entry<S: TokenSession>(
        &self,
        type_id: &str,
        entry: &StoredSession<S>,
    ) -> SessionResult<()> {
        let session_file = self.session_file(type_id);
        let temp_file = self.storage_dir.join(format!(
            ".{}.{}.tmp",
            urlencoding::encode(type_id),
            uuid::Uuid::new_v4()
        ));
        let json_data = serde_json::to_string_pretty(entry)?;

        tokio::fs::write(&temp_file, json_data).await.map_err(|e| {
            storage_error!(
                format!("Failed to write session file {}", temp_file.display()),
                COMPONENT,
                e
            )
        })?;

        if let Err(e) = tokio::fs::rename(&temp_file, &session_file).await {
            let _ = tokio::fs::remove_file(&temp_file).await;
            return Err(storage_error!(
                format!("Failed to replace session file {}", session_file.display()),
                COMPONENT,
                e
            ));
        }

        debug!("Saved session of type {} to {}", type_id, session_file.display());
        Ok(())
    }

    /// All session files with their decoded type IDs
    async fn session_files(&self) -> SessionResult<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.storage_dir).await.map_err(|e| {
            storage_error!("Failed to list storage directory", COMPONENT, e)
        })?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match urlencoding::decode(stem) {
                Ok(type_id) => files.push((type_id.into_owned(), path)),
                Err(e) => warn!("Skipping session file {}: {}", path.display(), e),
            }
        }

        Ok(files)
    }

    async fn remove_file(&self, path: &Path) -> SessionResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error!(
                format!("Failed to delete session file {}", path.display()),
                COMPONENT,
                e
            )),
        }
    }
}

#[async_trait]
impl<S: TokenSession> SessionStorage<S> for FileSessionStorage {
    async fn set(&self, session: &S) -> SessionResult<()> {
        self.write_entry(session.session_type(), &StoredSession::new(session.clone()))
            .await
    }

    async fn get(&self, type_id: &str, filter: ExpiryFilter) -> SessionResult<Option<S>> {
        let now = now_timestamp();
        let entry: Option<StoredSession<S>> = self.read_entry(&self.session_file(type_id)).await?;

        Ok(entry
            .filter(|entry| !(filter.skips_expired() && entry.is_expired_at(now)))
            .map(|entry| entry.session))
    }

    async fn delete(&self, type_id: &str) -> SessionResult<()> {
        let session_file = self.session_file(type_id);
        if self.remove_file(&session_file).await? {
            debug!("Deleted session file: {}", session_file.display());
        }
        Ok(())
    }

    async fn count(&self, filter: ExpiryFilter) -> SessionResult<usize> {
        let now = now_timestamp();
        let mut count = 0;

        for (type_id, path) in self.session_files().await? {
            if !filter.skips_expired() {
                count += 1;
                continue;
            }

            match self.read_entry::<S>(&path).await {
                Ok(Some(entry)) if !entry.is_expired_at(now) => count += 1,
                Ok(_) => {}
                Err(e) => warn!("Failed to load session of type {}: {}", type_id, e),
            }
        }

        Ok(count)
    }
}

#[async_trait]
impl<S: TokenSession> ExpiringSessionStorage<S> for FileSessionStorage {
    async fn expire(&self, type_id: &str, interval: u64) -> SessionResult<()> {
        let entry: Option<StoredSession<S>> = self.read_entry(&self.session_file(type_id)).await?;

        if let Some(mut entry) = entry {
            entry.schedule_expiry(now_timestamp(), interval);
            self.write_entry(type_id, &entry).await?;
            debug!("Session of type {} expires in {}s", type_id, interval);
        }
        Ok(())
    }

    async fn delete_expired(&self, type_id: Option<&str>) -> SessionResult<usize> {
        let now = now_timestamp();
        let candidates = match type_id {
            Some(type_id) => vec![(type_id.to_string(), self.session_file(type_id))],
            None => self.session_files().await?,
        };

        let mut removed = 0;
        for (type_id, path) in candidates {
            match self.read_entry::<S>(&path).await {
                Ok(Some(entry)) if entry.is_expired_at(now) => {
                    if self.remove_file(&path).await? {
                        removed += 1;
                        debug!("Removed expired session of type {}", type_id);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to load session of type {}: {}", type_id, e),
            }
        }

        Ok(removed)
    }
}
