//! Session settings read from the environment

use crate::client::Credentials;

pub const ENV_USER: &str = "TDF_USER";
pub const ENV_CLIENT_ID: &str = "TDF_CLIENTID";
pub const ENV_CLIENT_SECRET: &str = "TDF_CLIENTSECRET";
pub const ENV_ORG_NAME: &str = "TDF_ORGNAME";
pub const ENV_KAS_URL: &str = "TDF_KAS_URL";
pub const ENV_OIDC_URL: &str = "TDF_OIDC_URL";
pub const ENV_EXTERNAL_TOKEN: &str = "TDF_EXTERNALTOKEN";

/// Everything needed to open a [`TdfClient`](crate::TdfClient)
///
/// Unset variables read as empty strings. The native constructors decide
/// whether an empty value is acceptable.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TdfConfig {
    pub user: String,
    pub client_id: String,
    pub client_secret: String,
    pub organization: String,
    pub kas_url: String,
    pub oidc_url: String,
    pub external_token: Option<String>,
}

impl TdfConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();
        Self {
            user: var(ENV_USER),
            client_id: var(ENV_CLIENT_ID),
            client_secret: var(ENV_CLIENT_SECRET),
            organization: var(ENV_ORG_NAME),
            kas_url: var(ENV_KAS_URL),
            oidc_url: var(ENV_OIDC_URL),
            external_token: lookup(ENV_EXTERNAL_TOKEN).filter(|token| !token.is_empty()),
        }
    }

    pub fn uses_token_exchange(&self) -> bool {
        self.external_token.is_some()
    }

    /// Token exchange when an external token is present, client credentials otherwise
    pub fn credentials(&self) -> Credentials {
        match &self.external_token {
            Some(token) => Credentials::TokenExchange {
                user: self.user.clone(),
                organization: self.organization.clone(),
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                external_token: token.clone(),
                oidc_url: self.oidc_url.clone(),
            },
            None => Credentials::ClientSecret {
                user: self.user.clone(),
                organization: self.organization.clone(),
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                oidc_url: self.oidc_url.clone(),
            },
        }
    }
}

impl std::fmt::Debug for TdfConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdfConfig")
            .field("user", &self.user)
            .field("client_id", &self.client_id)
            .field("organization", &self.organization)
            .field("kas_url", &self.kas_url)
            .field("oidc_url", &self.oidc_url)
            .field("token_exchange", &self.uses_token_exchange())
            .finish()
    }
}
