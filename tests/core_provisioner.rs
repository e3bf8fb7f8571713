//! 账号开通编排测试

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use fixtures::{expired_invite, limited_invite, request, spawn_slow_media_server, FakeBackend};
use wizarr::core::backend::{BackendError, BackendRegistry};
use wizarr::core::provisioner::AccountProvisioner;
use wizarr::core::store::{InviteStore, MemoryStore};
use wizarr::domain::{FailureReason, ProvisioningResult, ServerType};
use wizarr::infrastructure::media::EmbyBackend;
use wizarr::infrastructure::store::SqliteStore;

fn provisioner_with(store: Arc<dyn InviteStore>, backends: Vec<Arc<FakeBackend>>) -> AccountProvisioner {
    let registry = BackendRegistry::new();
    for backend in backends {
        registry.register(backend).unwrap();
    }
    AccountProvisioner::new(store, Arc::new(registry))
}

#[tokio::test]
async fn test_single_use_code_redeems_once() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    store
        .save_invite(&limited_invite("WZRD1", ServerType::Jellyfin, 1))
        .await
        .unwrap();
    let backend = FakeBackend::succeeding(ServerType::Jellyfin);
    let provisioner = provisioner_with(store.clone(), vec![backend.clone()]);

    let first = provisioner
        .provision(request("alice", "WZRD1", ServerType::Jellyfin))
        .await;
    assert_eq!(
        first,
        ProvisioningResult::Success {
            user_id: "jellyfin-alice".to_string(),
            server_type: ServerType::Jellyfin,
        }
    );
    assert_eq!(store.lookup("WZRD1").await.unwrap().uses_remaining, 0);

    let second = provisioner
        .provision(request("bob", "WZRD1", ServerType::Jellyfin))
        .await;
    assert_eq!(second.reason(), Some(&FailureReason::InviteExhausted));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_expired_code_is_rejected_without_change() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    store
        .save_invite(&expired_invite("EXPIRED", ServerType::Emby))
        .await
        .unwrap();
    let backend = FakeBackend::succeeding(ServerType::Emby);
    let provisioner = provisioner_with(store.clone(), vec![backend.clone()]);

    let result = provisioner
        .provision(request("alice", "EXPIRED", ServerType::Emby))
        .await;

    assert_eq!(result.reason(), Some(&FailureReason::InviteExpired));
    assert_eq!(store.lookup("EXPIRED").await.unwrap().uses_remaining, 1);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_unknown_code_is_invalid() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    let provisioner = provisioner_with(store, vec![FakeBackend::succeeding(ServerType::Emby)]);

    let result = provisioner
        .provision(request("alice", "GHOST", ServerType::Emby))
        .await;
    assert_eq!(result.reason(), Some(&FailureReason::InviteInvalid));
}

#[tokio::test]
async fn test_duplicate_user_restores_use() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    store
        .save_invite(&limited_invite("DUP", ServerType::Emby, 2))
        .await
        .unwrap();
    let backend = FakeBackend::failing(ServerType::Emby, BackendError::DuplicateUser);
    let provisioner = provisioner_with(store.clone(), vec![backend.clone()]);

    let result = provisioner
        .provision(request("alice", "DUP", ServerType::Emby))
        .await;

    assert_eq!(result.reason(), Some(&FailureReason::DuplicateUser));
    assert_eq!(store.lookup("DUP").await.unwrap().uses_remaining, 2);
    assert_eq!(backend.calls(), 1);
    assert!(store.load_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_every_backend_failure_is_compensated() {
    let failures = [
        BackendError::DuplicateUser,
        BackendError::InvalidCredentials,
        BackendError::BackendUnavailable,
        BackendError::Unknown("boom".to_string()),
    ];

    for error in failures {
        let store: Arc<dyn InviteStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        store
            .save_invite(&limited_invite("ONE", ServerType::Jellyfin, 1))
            .await
            .unwrap();
        let provisioner = provisioner_with(
            store.clone(),
            vec![FakeBackend::failing(ServerType::Jellyfin, error.clone())],
        );

        let result = provisioner
            .provision(request("alice", "ONE", ServerType::Jellyfin))
            .await;

        assert_eq!(result.reason(), Some(&FailureReason::from(error)));
        assert_eq!(store.lookup("ONE").await.unwrap().uses_remaining, 1);
    }
}

#[tokio::test]
async fn test_server_type_mismatch_skips_backend() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    store
        .save_invite(&limited_invite("JF", ServerType::Jellyfin, 1))
        .await
        .unwrap();
    let emby = FakeBackend::succeeding(ServerType::Emby);
    let jellyfin = FakeBackend::succeeding(ServerType::Jellyfin);
    let provisioner = provisioner_with(store.clone(), vec![emby.clone(), jellyfin.clone()]);

    let result = provisioner
        .provision(request("alice", "JF", ServerType::Emby))
        .await;

    assert_eq!(
        result.reason(),
        Some(&FailureReason::ServerTypeMismatch {
            invite: ServerType::Jellyfin,
            requested: ServerType::Emby,
        })
    );
    assert_eq!(emby.calls(), 0);
    assert_eq!(jellyfin.calls(), 0);
    assert_eq!(store.lookup("JF").await.unwrap().uses_remaining, 1);
}

#[tokio::test]
async fn test_timeout_maps_to_unavailable_and_releases() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    store
        .save_invite(&limited_invite("SLOW", ServerType::Emby, 1))
        .await
        .unwrap();
    let provisioner = provisioner_with(
        store.clone(),
        vec![FakeBackend::slow(ServerType::Emby, Duration::from_secs(5))],
    )
    .with_timeout(Duration::from_millis(50));

    let result = provisioner
        .provision(request("alice", "SLOW", ServerType::Emby))
        .await;

    assert_eq!(result.reason(), Some(&FailureReason::BackendUnavailable));
    assert_eq!(store.lookup("SLOW").await.unwrap().uses_remaining, 1);
}

#[tokio::test]
async fn test_account_created_after_timeout_is_removed() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    store
        .save_invite(&limited_invite("LATE", ServerType::Emby, 1))
        .await
        .unwrap();
    let backend = FakeBackend::slow(ServerType::Emby, Duration::from_millis(300));
    let provisioner = provisioner_with(store.clone(), vec![backend.clone()])
        .with_timeout(Duration::from_millis(50));

    let result = provisioner
        .provision(request("alice", "LATE", ServerType::Emby))
        .await;
    assert_eq!(result.reason(), Some(&FailureReason::BackendUnavailable));
    assert_eq!(store.lookup("LATE").await.unwrap().uses_remaining, 1);

    // 后端最终完成创建后，账号被删除
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(backend.accounts(), vec!["alice".to_string()]);
    assert_eq!(backend.removed(), vec!["emby-alice".to_string()]);
    assert!(store.load_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stalled_emby_setup_leaves_no_upstream_account() {
    let (url, server) =
        spawn_slow_media_server("X-Emby-Token", "emby-key", Duration::from_millis(800)).await;
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    store
        .save_invite(&limited_invite("STALL", ServerType::Emby, 1))
        .await
        .unwrap();

    let registry = BackendRegistry::new();
    registry
        .register(Arc::new(
            EmbyBackend::new(&url, "emby-key", Duration::from_secs(5)).unwrap(),
        ))
        .unwrap();
    let provisioner = AccountProvisioner::new(store.clone(), Arc::new(registry))
        .with_timeout(Duration::from_millis(200));

    let result = provisioner
        .provision(request("alice", "STALL", ServerType::Emby))
        .await;
    assert_eq!(result.reason(), Some(&FailureReason::BackendUnavailable));
    assert_eq!(store.lookup("STALL").await.unwrap().uses_remaining, 1);
    assert!(server.find("POST", "/Users/New").is_some());

    let mut deleted = false;
    for _ in 0..30 {
        if server.find("DELETE", "/Users/uid-alice").is_some() {
            deleted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(deleted, "upstream user was not removed");
}

#[tokio::test]
async fn test_missing_backend_does_not_reserve() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    store
        .save_invite(&limited_invite("NOEMBY", ServerType::Emby, 1))
        .await
        .unwrap();
    let provisioner = provisioner_with(store.clone(), vec![]);

    let result = provisioner
        .provision(request("alice", "NOEMBY", ServerType::Emby))
        .await;

    assert_eq!(result.reason(), Some(&FailureReason::BackendUnavailable));
    assert_eq!(store.lookup("NOEMBY").await.unwrap().uses_remaining, 1);
}

#[tokio::test]
async fn test_success_records_user_and_local_duplicate_is_rejected() {
    let store: Arc<dyn InviteStore> = Arc::new(MemoryStore::new());
    let invite = limited_invite("MULTI", ServerType::Jellyfin, 3).with_duration_days(7);
    store.save_invite(&invite).await.unwrap();
    let backend = FakeBackend::succeeding(ServerType::Jellyfin);
    let provisioner = provisioner_with(store.clone(), vec![backend.clone()]);

    assert!(provisioner
        .provision(request("alice", "MULTI", ServerType::Jellyfin))
        .await
        .is_success());

    let users = store.load_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].external_user_id, "jellyfin-alice");
    assert_eq!(users[0].invite_code, "MULTI");
    assert!(users[0].expires_at.is_some());

    // 同名用户在本地已存在，不预留也不调用后端
    let again = provisioner
        .provision(request("alice", "MULTI", ServerType::Jellyfin))
        .await;
    assert_eq!(again.reason(), Some(&FailureReason::DuplicateUser));
    assert_eq!(backend.calls(), 1);
    assert_eq!(store.lookup("MULTI").await.unwrap().uses_remaining, 2);
}

async fn race(store: Arc<dyn InviteStore>, uses: u32, attempts: usize) {
    store
        .save_invite(&limited_invite("RACE", ServerType::Jellyfin, uses))
        .await
        .unwrap();
    let backend = FakeBackend::slow(ServerType::Jellyfin, Duration::from_millis(10));
    let provisioner = Arc::new(provisioner_with(store.clone(), vec![backend.clone()]));

    let handles: Vec<_> = (0..attempts)
        .map(|i| {
            let provisioner = provisioner.clone();
            tokio::spawn(async move {
                provisioner
                    .provision(request(&format!("user{}", i), "RACE", ServerType::Jellyfin))
                    .await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let mut successes = 0;
    for result in results {
        match result.unwrap() {
            ProvisioningResult::Success { .. } => successes += 1,
            ProvisioningResult::Failure { reason } => {
                assert_eq!(reason, FailureReason::InviteExhausted)
            }
        }
    }

    assert_eq!(successes, uses as usize);
    assert_eq!(backend.calls(), uses as usize);
    assert_eq!(store.lookup("RACE").await.unwrap().uses_remaining, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemptions_memory_store() {
    race(Arc::new(MemoryStore::new()), 3, 20).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemptions_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    race(Arc::new(SqliteStore::new(dir.path().join("race.db")).unwrap()), 1, 12).await;
}
