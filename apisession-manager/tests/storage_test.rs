//! Session storage contract tests, run against every backend

use apisession_core::{
    now_timestamp, AccessToken, ExpiringSessionStorage, ExpiryFilter, Session, SessionStorage,
    TokenSession,
};
use apisession_manager::{
    AccessTokenSession, FileSessionStorage, MemorySessionStorage, RenewableAccessTokenSession,
};

fn live_session(type_id: &str, token: &str) -> AccessTokenSession {
    AccessTokenSession::new(type_id, AccessToken::new(token).expiring_in(3600))
}

fn expired_session(type_id: &str) -> AccessTokenSession {
    AccessTokenSession::new(
        type_id,
        AccessToken::new("expired").with_expires(now_timestamp() - 60),
    )
}

async fn check_set_get_delete(storage: &dyn ExpiringSessionStorage<AccessTokenSession>) {
    assert!(storage
        .get("default", ExpiryFilter::SkipExpired)
        .await
        .unwrap()
        .is_none());

    let first = live_session("default", "one");
    storage.set(&first).await.unwrap();
    let loaded = storage
        .get("default", ExpiryFilter::SkipExpired)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, first);

    // One session per type: set overwrites
    let second = live_session("default", "two");
    storage.set(&second).await.unwrap();
    let loaded = storage
        .get("default", ExpiryFilter::SkipExpired)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.access_token().token(), "two");
    assert_eq!(storage.count(ExpiryFilter::IncludeExpired).await.unwrap(), 1);

    assert!(storage
        .exists("default", ExpiryFilter::SkipExpired)
        .await
        .unwrap());
    storage.delete("default").await.unwrap();
    assert!(!storage
        .exists("default", ExpiryFilter::IncludeExpired)
        .await
        .unwrap());

    // Deleting an absent session is not an error
    storage.delete("default").await.unwrap();
}

async fn check_expired_credentials(storage: &dyn ExpiringSessionStorage<AccessTokenSession>) {
    storage.set(&expired_session("app.stale")).await.unwrap();
    storage.set(&live_session("app.fresh", "fresh")).await.unwrap();

    assert!(storage
        .get("app.stale", ExpiryFilter::SkipExpired)
        .await
        .unwrap()
        .is_none());
    assert!(storage
        .get("app.stale", ExpiryFilter::IncludeExpired)
        .await
        .unwrap()
        .is_some());
    assert_eq!(storage.count(ExpiryFilter::SkipExpired).await.unwrap(), 1);
    assert_eq!(storage.count(ExpiryFilter::IncludeExpired).await.unwrap(), 2);

    assert_eq!(storage.delete_expired(None).await.unwrap(), 1);
    assert_eq!(storage.count(ExpiryFilter::IncludeExpired).await.unwrap(), 1);
    assert!(storage
        .get("app.fresh", ExpiryFilter::SkipExpired)
        .await
        .unwrap()
        .is_some());
}

async fn check_scheduled_expiry(storage: &dyn ExpiringSessionStorage<AccessTokenSession>) {
    storage.set(&live_session("app.a", "a")).await.unwrap();
    storage.set(&live_session("app.b", "b")).await.unwrap();

    // Scheduling far ahead keeps the session visible
    storage.expire("app.a", 3600).await.unwrap();
    assert!(storage
        .exists("app.a", ExpiryFilter::SkipExpired)
        .await
        .unwrap());
    storage.expire("app.a", u64::MAX).await.unwrap();
    assert!(storage
        .exists("app.a", ExpiryFilter::SkipExpired)
        .await
        .unwrap());

    storage.expire("app.a", 0).await.unwrap();
    assert!(!storage
        .exists("app.a", ExpiryFilter::SkipExpired)
        .await
        .unwrap());
    assert!(storage
        .exists("app.a", ExpiryFilter::IncludeExpired)
        .await
        .unwrap());

    // Absent sessions can be expired without error
    storage.expire("app.missing", 0).await.unwrap();

    // Only the selected type is collected
    storage.expire("app.b", 0).await.unwrap();
    assert_eq!(storage.delete_expired(Some("app.a")).await.unwrap(), 1);
    assert!(storage
        .exists("app.b", ExpiryFilter::IncludeExpired)
        .await
        .unwrap());

    // Storing again clears the schedule
    storage.set(&live_session("app.b", "b2")).await.unwrap();
    assert!(storage
        .exists("app.b", ExpiryFilter::SkipExpired)
        .await
        .unwrap());
    assert_eq!(storage.delete_expired(None).await.unwrap(), 0);
}

async fn check_contract(storage: &dyn ExpiringSessionStorage<AccessTokenSession>) {
    check_set_get_delete(storage).await;
    check_expired_credentials(storage).await;
    storage.delete("app.fresh").await.unwrap();
    check_scheduled_expiry(storage).await;
}

#[tokio::test]
async fn test_memory_storage_contract() {
    let storage = MemorySessionStorage::<AccessTokenSession>::new();
    check_contract(&storage).await;
}

#[tokio::test]
async fn test_file_storage_contract() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileSessionStorage::new(dir.path().join("sessions")).unwrap();
    check_contract(&storage).await;
}

#[tokio::test]
async fn test_file_storage_encodes_type_ids() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileSessionStorage::new(dir.path()).unwrap();
    let session = live_session("acme/user import", "tok");

    SessionStorage::<AccessTokenSession>::set(&storage, &session)
        .await
        .unwrap();

    assert!(dir.path().join("acme%2Fuser%20import.json").exists());

    let loaded: Option<AccessTokenSession> =
        SessionStorage::<AccessTokenSession>::get(
            &storage,
            "acme/user import",
            ExpiryFilter::SkipExpired,
        )
        .await
        .unwrap();
    assert_eq!(loaded.unwrap().session_type(), "acme/user import");
}

#[tokio::test]
async fn test_file_storage_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let session = RenewableAccessTokenSession::new("default", AccessToken::new("tok"));

    {
        let storage = FileSessionStorage::new(dir.path()).unwrap();
        SessionStorage::<RenewableAccessTokenSession>::set(&storage, &session)
            .await
            .unwrap();
    }

    let storage = FileSessionStorage::new(dir.path()).unwrap();
    let loaded: Option<RenewableAccessTokenSession> =
        SessionStorage::<RenewableAccessTokenSession>::get(
            &storage,
            "default",
            ExpiryFilter::SkipExpired,
        )
        .await
        .unwrap();
    assert_eq!(loaded.unwrap().session_id(), session.session_id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_storage_readers_never_see_partial_writes() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileSessionStorage::new(dir.path()).unwrap();
    SessionStorage::<AccessTokenSession>::set(&storage, &live_session("default", "tok-0"))
        .await
        .unwrap();

    let writer = {
        let storage = storage.clone();
        tokio::spawn(async move {
            for i in 1..=300 {
                let session = live_session("default", &format!("tok-{}", i));
                SessionStorage::<AccessTokenSession>::set(&storage, &session)
                    .await
                    .unwrap();
                if i % 3 == 0 {
                    ExpiringSessionStorage::<AccessTokenSession>::expire(
                        &storage, "default", 3600,
                    )
                    .await
                    .unwrap();
                }
            }
        })
    };

    let mut reads = 0;
    loop {
        let loaded: Option<AccessTokenSession> = SessionStorage::<AccessTokenSession>::get(
            &storage,
            "default",
            ExpiryFilter::SkipExpired,
        )
        .await
        .unwrap();
        assert!(loaded.is_some());
        reads += 1;
        if writer.is_finished() {
            break;
        }
    }
    writer.await.unwrap();

    assert!(reads > 0);
    assert_eq!(
        SessionStorage::<AccessTokenSession>::count(&storage, ExpiryFilter::IncludeExpired)
            .await
            .unwrap(),
        1
    );
    // No temporary files are left behind
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use apisession_manager::SqliteSessionStorage;

    #[tokio::test]
    async fn test_sqlite_storage_contract() {
        let storage = SqliteSessionStorage::in_memory().await.unwrap();
        check_contract(&storage).await;
    }

    #[tokio::test]
    async fn test_sqlite_storage_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let session = live_session("default", "tok");

        {
            let storage = SqliteSessionStorage::open(&path).await.unwrap();
            SessionStorage::<AccessTokenSession>::set(&storage, &session)
                .await
                .unwrap();
        }

        let storage = SqliteSessionStorage::open(&path).await.unwrap();
        let loaded: Option<AccessTokenSession> =
            SessionStorage::<AccessTokenSession>::get(
                &storage,
                "default",
                ExpiryFilter::SkipExpired,
            )
            .await
            .unwrap();
        assert_eq!(loaded, Some(session));
    }
}
