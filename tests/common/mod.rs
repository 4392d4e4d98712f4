//! Common test utilities for opentdf-client integration tests
//!
//! Every test runs against the loopback backend, which also counts the
//! native objects still alive.

#![allow(dead_code)]

pub use opentdf_client::{
    Credentials, LoopbackBackend, Policy, TdfClient, TdfClientError, TdfStorage,
};
use std::sync::Arc;

pub const KAS_URL: &str = "https://kas.example.com";
pub const OIDC_URL: &str = "https://idp.example.com/auth/realms/tdf";
pub const USER: &str = "user@example.com";

pub const ATTRIBUTES: [&str; 2] = [
    "https://example.com/attr/Classification/value/C",
    "https://example.com/attr/COI/value/PRF",
];

pub const NO_ATTRIBUTES: [&str; 0] = [];

pub const TEST_PLAINTEXT: &str = "Hello, OpenTDF! This is test data for encryption.";

/// Route library logs to the test harness when `RUST_LOG` is set
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client_secret() -> Credentials {
    Credentials::ClientSecret {
        user: USER.to_string(),
        organization: "example".to_string(),
        client_id: "tdf-client".to_string(),
        client_secret: "123-456".to_string(),
        oidc_url: OIDC_URL.to_string(),
    }
}

pub fn token_exchange() -> Credentials {
    Credentials::TokenExchange {
        user: USER.to_string(),
        organization: "example".to_string(),
        client_id: "tdf-client".to_string(),
        client_secret: "123-456".to_string(),
        external_token: "eyJhbGciOiJSUzI1NiJ9.e30.sig".to_string(),
        oidc_url: OIDC_URL.to_string(),
    }
}

/// A fresh backend and a session on it
pub fn connect() -> (Arc<LoopbackBackend>, TdfClient<LoopbackBackend>) {
    init_logging();
    let backend = Arc::new(LoopbackBackend::new());
    let client = TdfClient::connect(Arc::clone(&backend), client_secret(), KAS_URL)
        .expect("loopback session");
    (backend, client)
}

/// Encrypt `plaintext` and hand back the container bytes
pub fn encrypt(
    client: &mut TdfClient<LoopbackBackend>,
    plaintext: &str,
    metadata: &str,
    attributes: &[&str],
) -> Vec<u8> {
    let mut storage = client.string_storage(plaintext).expect("string storage");
    let out = client
        .encrypt_to_string(&storage, metadata, attributes)
        .expect("encrypt");
    storage.release().expect("release");
    out
}
