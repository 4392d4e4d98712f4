mod common;

use common::*;
use opentdf_client::{SessionState, StorageKind};
use std::sync::Arc;

#[test]
fn test_every_storage_kind_releases_without_leaks() {
    let (backend, client) = connect();
    let dir = tempfile::tempdir().unwrap();
    let baseline = backend.live_handles();

    let handles = vec![
        client.file_storage(dir.path().join("payload.txt")).unwrap(),
        client.string_storage(TEST_PLAINTEXT).unwrap(),
        client.string_storage("").unwrap(),
        client.bytes_storage(vec![0u8; 128]).unwrap(),
        client.bytes_storage(Vec::new()).unwrap(),
        client
            .remote_storage("https://s3.example.com/b/k", "AKIA", "secret", "us-west-2")
            .unwrap(),
    ];
    assert_eq!(backend.live_handles().storages, baseline.storages + 6);

    for mut handle in handles {
        let kind = handle.kind();
        handle.release().unwrap_or_else(|e| panic!("{} storage: {}", kind, e));
        assert!(handle.is_released());
        assert_eq!(handle.pending_allocations(), 0);
    }
    assert_eq!(backend.live_handles(), baseline);
}

#[test]
fn test_storage_kinds_are_reported() {
    let (_backend, client) = connect();
    assert_eq!(client.string_storage("x").unwrap().kind(), StorageKind::StringBuffer);
    assert_eq!(client.bytes_storage(vec![1]).unwrap().kind(), StorageKind::ByteBuffer);
    assert_eq!(StorageKind::RemoteObject.to_string(), "remote object");
}

#[test]
fn test_double_release_is_rejected() {
    let (backend, client) = connect();
    let mut storage = client.string_storage(TEST_PLAINTEXT).unwrap();
    storage.release().unwrap();

    let err = storage.release().unwrap_err();
    assert!(matches!(err, TdfClientError::AlreadyReleased { .. }));
    assert!(err.is_lifecycle_error());
    assert_eq!(backend.live_handles().storages, 0);
}

#[test]
fn test_released_storage_is_not_usable() {
    let (_backend, mut client) = connect();
    let mut storage = client.string_storage(TEST_PLAINTEXT).unwrap();
    storage.release().unwrap();

    let err = client
        .encrypt_to_string(&storage, "", &ATTRIBUTES)
        .unwrap_err();
    assert!(matches!(err, TdfClientError::StorageReleased));
}

#[test]
fn test_double_close_is_rejected() {
    let (backend, mut client) = connect();
    assert_eq!(client.state(), SessionState::Ready);
    assert!(client.pending_allocations() > 0);

    client.close().unwrap();
    assert_eq!(client.state(), SessionState::Closed);
    assert_eq!(client.pending_allocations(), 0);
    assert!(backend.live_handles().is_empty());

    let err = client.close().unwrap_err();
    assert!(matches!(err, TdfClientError::AlreadyReleased { .. }));
}

#[test]
fn test_operations_after_close_are_rejected() {
    let (_backend, mut client) = connect();
    let encrypted = encrypt(&mut client, TEST_PLAINTEXT, "", &ATTRIBUTES);
    let plaintext = client.string_storage(TEST_PLAINTEXT).unwrap();
    let container = client.bytes_storage(encrypted).unwrap();
    client.close().unwrap();

    let errors = vec![
        client
            .encrypt_to_string(&plaintext, "", &ATTRIBUTES)
            .unwrap_err(),
        client.decrypt_tdf(&container).unwrap_err(),
        client.decrypt_tdf_partial(&container, 0, 1).unwrap_err(),
        client.get_encrypted_metadata(&container).unwrap_err(),
        client.get_policy_from_tdf(&container).unwrap_err(),
        client
            .set_native_log_level(opentdf_client::NativeLogLevel::Debug)
            .unwrap_err(),
    ];
    for err in errors {
        assert!(matches!(err, TdfClientError::SessionClosed), "{:?}", err);
    }
}

#[test]
fn test_drop_releases_everything() {
    init_logging();
    let backend = Arc::new(LoopbackBackend::new());
    {
        let mut client = TdfClient::connect(Arc::clone(&backend), client_secret(), KAS_URL).unwrap();
        let _storage = client.string_storage(TEST_PLAINTEXT).unwrap();
        let encrypted = encrypt(&mut client, TEST_PLAINTEXT, "", &ATTRIBUTES);
        let _container = client.bytes_storage(encrypted).unwrap();

        let live = backend.live_handles();
        assert_eq!((live.credentials, live.clients, live.storages), (1, 1, 2));
    }
    assert!(backend.live_handles().is_empty());
}

#[test]
fn test_storage_from_another_backend_is_rejected() {
    let (_backend, mut client) = connect();
    let other = Arc::new(LoopbackBackend::new());
    let foreign = TdfStorage::string(&other, TEST_PLAINTEXT).unwrap();

    let err = client
        .encrypt_to_string(&foreign, "", &ATTRIBUTES)
        .unwrap_err();
    assert!(matches!(err, TdfClientError::BackendMismatch));
    assert_eq!(err.error_code(), "OPENTDF_E_LIFECYCLE_BACKEND_MISMATCH");
}

#[test]
fn test_invalid_oidc_endpoint_fails_construction() {
    init_logging();
    let backend = Arc::new(LoopbackBackend::new());
    let credentials = Credentials::ClientSecret {
        user: USER.to_string(),
        organization: "example".to_string(),
        client_id: "tdf-client".to_string(),
        client_secret: "123-456".to_string(),
        oidc_url: "not a url".to_string(),
    };

    let err = TdfClient::connect(Arc::clone(&backend), credentials, KAS_URL).unwrap_err();
    assert!(matches!(err, TdfClientError::Construction { object: "credential" }));
    assert!(err.is_construction_error());
    assert!(backend.live_handles().is_empty());
}

#[test]
fn test_invalid_kas_endpoint_destroys_credential() {
    init_logging();
    let backend = Arc::new(LoopbackBackend::new());

    let err = TdfClient::connect(Arc::clone(&backend), client_secret(), "kas.example.com").unwrap_err();
    assert!(matches!(err, TdfClientError::Construction { object: "client" }));
    assert!(backend.live_handles().is_empty());
}

#[test]
fn test_missing_token_fails_token_exchange() {
    init_logging();
    let backend = Arc::new(LoopbackBackend::new());
    let credentials = Credentials::TokenExchange {
        user: USER.to_string(),
        organization: "example".to_string(),
        client_id: "tdf-client".to_string(),
        client_secret: "123-456".to_string(),
        external_token: String::new(),
        oidc_url: OIDC_URL.to_string(),
    };

    let err = TdfClient::connect(Arc::clone(&backend), credentials, KAS_URL).unwrap_err();
    assert!(err.is_construction_error());
    assert!(err.suggestion().is_some());
    assert!(backend.live_handles().is_empty());
}

#[test]
fn test_interior_nul_credential_is_invalid() {
    init_logging();
    let backend = Arc::new(LoopbackBackend::new());
    let credentials = Credentials::ClientSecret {
        user: "user\0@example.com".to_string(),
        organization: "example".to_string(),
        client_id: "tdf-client".to_string(),
        client_secret: "123-456".to_string(),
        oidc_url: OIDC_URL.to_string(),
    };

    let err = TdfClient::connect(Arc::clone(&backend), credentials, KAS_URL).unwrap_err();
    assert!(matches!(err, TdfClientError::InvalidParameters { .. }));
    assert!(backend.live_handles().is_empty());
}

#[test]
fn test_many_sessions_share_one_backend() {
    init_logging();
    let backend = Arc::new(LoopbackBackend::new());
    let mut sessions: Vec<_> = (0..8)
        .map(|_| TdfClient::connect(Arc::clone(&backend), client_secret(), KAS_URL).unwrap())
        .collect();
    assert_eq!(backend.live_handles().clients, 8);

    // Any session bound to the same KAS can read another's container
    let encrypted = encrypt(&mut sessions[0], TEST_PLAINTEXT, "", &ATTRIBUTES);
    let container = sessions[7].bytes_storage(encrypted).unwrap();
    assert_eq!(sessions[7].decrypt_tdf(&container).unwrap(), TEST_PLAINTEXT);
    drop(container);

    for session in &mut sessions {
        session.close().unwrap();
    }
    assert!(backend.live_handles().is_empty());
}
