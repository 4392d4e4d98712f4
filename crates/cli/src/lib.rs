//! Shared setup for the command-line drivers
//!
//! With the `native` feature the drivers talk to the native client library;
//! without it they run against the in-process loopback backend.

use opentdf_client::{TdfClient, TdfClientError, TdfConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(feature = "native")]
pub type Backend = opentdf_client::NativeBackend;
#[cfg(not(feature = "native"))]
pub type Backend = opentdf_client::LoopbackBackend;

/// Log to stderr, `info` unless `RUST_LOG` says otherwise
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

#[cfg(feature = "native")]
pub fn backend() -> Arc<Backend> {
    Backend::shared()
}

#[cfg(not(feature = "native"))]
pub fn backend() -> Arc<Backend> {
    Arc::new(Backend::new())
}

/// Open a session from `TDF_*` environment settings
pub fn connect(config: &TdfConfig) -> Result<TdfClient<Backend>, TdfClientError> {
    info!(?config, "Connecting");
    TdfClient::connect(backend(), config.credentials(), &config.kas_url)
}

/// Open a session or end the process with status 1
pub fn connect_or_exit(config: &TdfConfig) -> TdfClient<Backend> {
    match connect(config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Could not create TDF client");
            if let Some(hint) = e.suggestion() {
                eprintln!("{}", hint);
            }
            std::process::exit(1);
        }
    }
}

#[cfg(all(test, not(feature = "native")))]
mod tests {
    use super::*;

    fn config() -> TdfConfig {
        TdfConfig {
            user: "user@example.com".to_string(),
            client_id: "tdf-client".to_string(),
            client_secret: "secret".to_string(),
            organization: "example".to_string(),
            kas_url: "https://kas.example.com".to_string(),
            oidc_url: "https://idp.example.com".to_string(),
            external_token: None,
        }
    }

    #[test]
    fn test_connect_from_config() {
        let mut client = connect(&config()).unwrap();
        assert_eq!(client.kas_url(), "https://kas.example.com");
        client.close().unwrap();
    }

    #[test]
    fn test_unset_environment_fails_construction() {
        let err = connect(&TdfConfig::default()).unwrap_err();
        assert!(err.is_construction_error());
    }
}
