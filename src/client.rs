//! Credentialed, KAS-bound client sessions
//!
//! A [`TdfClient`] owns a native credential object, a native client object
//! and every string handed to the native layer while constructing them.
//! All encrypt, decrypt and policy operations go through it.

use crate::alloc::{ForeignAllocations, ForeignBuffer};
use crate::backend::{NativeLogLevel, TdfBackend};
use crate::error::{AttributeFailure, TdfClientError};
use crate::policy::Policy;
use crate::storage::TdfStorage;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};

/// Identity material for one of the two supported credential flows
#[derive(Clone)]
pub enum Credentials {
    /// OIDC client-credentials grant
    ClientSecret {
        user: String,
        organization: String,
        client_id: String,
        client_secret: String,
        oidc_url: String,
    },
    /// OIDC token exchange of an externally issued access token
    TokenExchange {
        user: String,
        organization: String,
        client_id: String,
        client_secret: String,
        external_token: String,
        oidc_url: String,
    },
}

impl Credentials {
    pub fn flow_name(&self) -> &'static str {
        match self {
            Credentials::ClientSecret { .. } => "client-secret",
            Credentials::TokenExchange { .. } => "token-exchange",
        }
    }

    pub fn user(&self) -> &str {
        match self {
            Credentials::ClientSecret { user, .. } | Credentials::TokenExchange { user, .. } => user,
        }
    }
}

// Secrets stay out of logs and panic messages
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ClientSecret {
                user,
                organization,
                client_id,
                oidc_url,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("user", user)
                .field("organization", organization)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .field("oidc_url", oidc_url)
                .finish(),
            Credentials::TokenExchange {
                user,
                organization,
                client_id,
                oidc_url,
                ..
            } => f
                .debug_struct("TokenExchange")
                .field("user", user)
                .field("organization", organization)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .field("external_token", &"<redacted>")
                .field("oidc_url", oidc_url)
                .finish(),
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Closed,
}

/// A client session bound to one key access service
///
/// Construction is all-or-nothing. Once [`close`](TdfClient::close) has run
/// every operation returns [`TdfClientError::SessionClosed`]. Dropping an
/// open session closes it.
///
/// Operations take `&mut self`: the native client's thread safety is not
/// guaranteed, so sharing a session across threads needs external locking.
///
/// # Examples
///
/// ```no_run
/// use opentdf_client::{Credentials, LoopbackBackend, TdfClient};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), opentdf_client::TdfClientError> {
/// let backend = Arc::new(LoopbackBackend::new());
/// let credentials = Credentials::ClientSecret {
///     user: "user@example.com".into(),
///     organization: "example".into(),
///     client_id: "tdf-client".into(),
///     client_secret: "secret".into(),
///     oidc_url: "https://idp.example.com".into(),
/// };
/// let mut client = TdfClient::connect(backend, credentials, "https://kas.example.com")?;
///
/// let plaintext = client.string_storage("Sensitive data")?;
/// let encrypted = client.encrypt_to_string(
///     &plaintext,
///     "",
///     &["https://example.com/attr/Classification/value/C"],
/// )?;
///
/// let container = client.bytes_storage(encrypted)?;
/// assert_eq!(client.decrypt_tdf(&container)?, "Sensitive data");
/// client.close()?;
/// # Ok(())
/// # }
/// ```
pub struct TdfClient<B: TdfBackend> {
    backend: Arc<B>,
    client: Option<B::Client>,
    credential: Option<B::Credential>,
    kas_url: String,
    user: String,
    allocations: ForeignAllocations,
}

impl<B: TdfBackend> TdfClient<B> {
    /// Build the native credential and client objects
    ///
    /// Fails with [`TdfClientError::Construction`] if either native
    /// constructor returns null. Nothing is leaked on failure: a credential
    /// built before a failed client construction is destroyed.
    pub fn connect(
        backend: Arc<B>,
        credentials: Credentials,
        kas_url: &str,
    ) -> Result<Self, TdfClientError> {
        let mut allocations = ForeignAllocations::new();
        let c_kas_url = ForeignAllocations::c_string(kas_url, "TDFCreateClient")?;

        let credential = match &credentials {
            Credentials::ClientSecret {
                user,
                organization,
                client_id,
                client_secret,
                oidc_url,
            } => {
                const OP: &str = "TDFCreateCredentialClientCreds";
                let user = ForeignAllocations::c_string(user, OP)?;
                let organization = ForeignAllocations::c_string(organization, OP)?;
                let client_id = ForeignAllocations::c_string(client_id, OP)?;
                let client_secret = ForeignAllocations::c_string(client_secret, OP)?;
                let oidc_url = ForeignAllocations::c_string(oidc_url, OP)?;

                let credential = backend.create_credential_client_creds(
                    &user,
                    &oidc_url,
                    &client_id,
                    &client_secret,
                    &organization,
                );
                for c in [user, organization, client_id, client_secret, oidc_url] {
                    allocations.adopt_str(c);
                }
                credential
            }
            Credentials::TokenExchange {
                user,
                organization,
                client_id,
                client_secret,
                external_token,
                oidc_url,
            } => {
                const OP: &str = "TDFCreateCredentialTokenExchange";
                let user = ForeignAllocations::c_string(user, OP)?;
                let organization = ForeignAllocations::c_string(organization, OP)?;
                let client_id = ForeignAllocations::c_string(client_id, OP)?;
                let client_secret = ForeignAllocations::c_string(client_secret, OP)?;
                let external_token = ForeignAllocations::c_string(external_token, OP)?;
                let oidc_url = ForeignAllocations::c_string(oidc_url, OP)?;

                let credential = backend.create_credential_token_exchange(
                    &user,
                    &oidc_url,
                    &client_id,
                    &client_secret,
                    &external_token,
                    &organization,
                );
                for c in [
                    user,
                    organization,
                    client_id,
                    client_secret,
                    external_token,
                    oidc_url,
                ] {
                    allocations.adopt_str(c);
                }
                credential
            }
        };

        let credential = credential.ok_or_else(|| {
            error!(flow = credentials.flow_name(), "Could not initialize TDF credential object");
            TdfClientError::Construction {
                object: "credential",
            }
        })?;

        info!(backend = backend.name(), kas_url, "Initializing TDF client");
        let client = match backend.create_client(&credential, &c_kas_url) {
            Some(client) => client,
            None => {
                backend.destroy_credential(credential);
                error!(kas_url, "Could not initialize TDF client");
                return Err(TdfClientError::Construction { object: "client" });
            }
        };
        allocations.adopt_str(c_kas_url);

        let mut session = Self {
            backend,
            client: Some(client),
            credential: Some(credential),
            kas_url: kas_url.to_string(),
            user: credentials.user().to_string(),
            allocations,
        };

        if tracing::enabled!(Level::DEBUG) {
            if let Err(e) = session.set_native_log_level(NativeLogLevel::Debug) {
                warn!(error = %e, "Could not enable native console logging");
            }
        }

        debug!(flow = credentials.flow_name(), "TDF client initialized");
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        if self.client.is_some() {
            SessionState::Ready
        } else {
            SessionState::Closed
        }
    }

    pub fn kas_url(&self) -> &str {
        &self.kas_url
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Strings the session still holds on behalf of the native layer
    pub fn pending_allocations(&self) -> usize {
        self.allocations.len()
    }

    /// Ask the native layer for console logging at `level`
    ///
    /// One-way: the native layer offers no getter.
    pub fn set_native_log_level(&mut self, level: NativeLogLevel) -> Result<(), TdfClientError> {
        let client = self.client.as_mut().ok_or(TdfClientError::SessionClosed)?;
        self.backend
            .enable_console_logging(client, level)
            .check("TDFEnableConsoleLogging")
    }

    pub fn file_storage(&self, path: impl AsRef<Path>) -> Result<TdfStorage<B>, TdfClientError> {
        TdfStorage::file(&self.backend, path)
    }

    pub fn string_storage(&self, data: &str) -> Result<TdfStorage<B>, TdfClientError> {
        TdfStorage::string(&self.backend, data)
    }

    pub fn bytes_storage(&self, data: impl Into<Vec<u8>>) -> Result<TdfStorage<B>, TdfClientError> {
        TdfStorage::bytes(&self.backend, data)
    }

    pub fn remote_storage(
        &self,
        url: &str,
        access_key_id: &str,
        secret_key: &str,
        region: &str,
    ) -> Result<TdfStorage<B>, TdfClientError> {
        TdfStorage::remote(&self.backend, url, access_key_id, secret_key, region)
    }

    /// Encrypt `storage` under the given attributes, returning the container
    ///
    /// `metadata` is sealed into the container when non-empty and can be
    /// read back with [`get_encrypted_metadata`](Self::get_encrypted_metadata).
    pub fn encrypt_to_string<S: AsRef<str>>(
        &mut self,
        storage: &TdfStorage<B>,
        metadata: &str,
        attributes: &[S],
    ) -> Result<Vec<u8>, TdfClientError> {
        const OP: &str = "TDFEncryptString";
        let mut scope = ForeignAllocations::new();
        let ops = self.operands(storage)?;
        prepare_encrypt(ops.backend, ops.client, ops.kas_url, metadata, attributes, &mut scope)?;

        let result = ops.backend.encrypt_string(ops.client, ops.storage).map_err(|status| {
            let err = status.into_error(OP);
            error!(error = %err, "Error encrypting string");
            err
        });
        let freed = scope.drain();
        let out = result?;
        debug!(len = out.len(), freed, "Got encrypted buffer");
        Ok(out)
    }

    /// Encrypt `storage` and let the native layer write the container to `out_path`
    pub fn encrypt_to_file<S: AsRef<str>>(
        &mut self,
        storage: &TdfStorage<B>,
        out_path: impl AsRef<Path>,
        metadata: &str,
        attributes: &[S],
    ) -> Result<(), TdfClientError> {
        const OP: &str = "TDFEncryptFile";
        let out_path = out_path.as_ref();
        let out = out_path
            .to_str()
            .ok_or_else(|| TdfClientError::invalid(OP, "output path is not valid UTF-8"))?;
        let c_out = ForeignAllocations::c_string(out, OP)?;

        let mut scope = ForeignAllocations::new();
        let ops = self.operands(storage)?;
        prepare_encrypt(ops.backend, ops.client, ops.kas_url, metadata, attributes, &mut scope)?;

        let result = ops.backend.encrypt_file(ops.client, ops.storage, &c_out).check(OP);
        scope.adopt_str(c_out);
        scope.drain();
        if let Err(e) = &result {
            error!(error = %e, path = %out_path.display(), "Error encrypting file");
        }
        result
    }

    /// Decrypt the whole payload
    pub fn decrypt_tdf_bytes(&mut self, storage: &TdfStorage<B>) -> Result<Vec<u8>, TdfClientError> {
        const OP: &str = "TDFDecryptString";
        let ops = self.operands(storage)?;
        let out = ops
            .backend
            .decrypt_string(ops.client, ops.storage)
            .map_err(|status| log_failure(status.into_error(OP)))?;
        debug!(len = out.len(), "Got decrypted buffer");
        Ok(out)
    }

    /// Decrypt the whole payload as UTF-8 text
    pub fn decrypt_tdf(&mut self, storage: &TdfStorage<B>) -> Result<String, TdfClientError> {
        utf8(self.decrypt_tdf_bytes(storage)?, "TDFDecryptString")
    }

    /// Decrypt `length` bytes of plaintext starting at plaintext `offset`
    pub fn decrypt_tdf_partial_bytes(
        &mut self,
        storage: &TdfStorage<B>,
        offset: u32,
        length: u32,
    ) -> Result<Vec<u8>, TdfClientError> {
        const OP: &str = "TDFDecryptDataPartial";
        if offset.checked_add(length).is_none() {
            return Err(TdfClientError::invalid(OP, "offset + length overflows"));
        }
        let ops = self.operands(storage)?;
        let out = ops
            .backend
            .decrypt_partial(ops.client, ops.storage, offset, length)
            .map_err(|status| log_failure(status.into_error(OP)))?;
        debug!(offset, length, len = out.len(), "Got partially decrypted buffer");
        Ok(out)
    }

    /// Partial decrypt as UTF-8 text
    ///
    /// A range that splits a multi-byte character is a decode error; use
    /// [`decrypt_tdf_partial_bytes`](Self::decrypt_tdf_partial_bytes) for
    /// arbitrary ranges.
    pub fn decrypt_tdf_partial(
        &mut self,
        storage: &TdfStorage<B>,
        offset: u32,
        length: u32,
    ) -> Result<String, TdfClientError> {
        utf8(
            self.decrypt_tdf_partial_bytes(storage, offset, length)?,
            "TDFDecryptDataPartial",
        )
    }

    /// Recover the metadata sealed at encrypt time without decrypting the payload
    pub fn get_encrypted_metadata(&mut self, storage: &TdfStorage<B>) -> Result<String, TdfClientError> {
        const OP: &str = "TDFGetEncryptedMetadata";
        let ops = self.operands(storage)?;
        let out = ops
            .backend
            .get_encrypted_metadata(ops.client, ops.storage)
            .map_err(|status| log_failure(status.into_error(OP)))?;
        debug!(len = out.len(), "Got encrypted metadata buffer");
        utf8(out, OP)
    }

    /// The raw policy document embedded in the payload
    pub fn get_policy_json(&mut self, storage: &TdfStorage<B>) -> Result<String, TdfClientError> {
        const OP: &str = "TDFGetPolicy";
        let ops = self.operands(storage)?;
        let out = ops
            .backend
            .get_policy(ops.client, ops.storage)
            .map_err(|status| log_failure(status.into_error(OP)))?;
        debug!(len = out.len(), "Got policy buffer");
        utf8(out, OP)
    }

    /// Decode the policy embedded in the payload
    ///
    /// A malformed document is [`TdfClientError::Decode`], distinct from a
    /// native failure to produce one.
    pub fn get_policy_from_tdf(&mut self, storage: &TdfStorage<B>) -> Result<Policy, TdfClientError> {
        let json = self.get_policy_json(storage)?;
        serde_json::from_str(&json).map_err(|source| {
            error!(error = %source, "Error parsing policy JSON obtained from TDF");
            TdfClientError::Decode {
                what: "policy",
                source,
            }
        })
    }

    /// Destroy the native client and credential, then free tracked strings
    pub fn close(&mut self) -> Result<(), TdfClientError> {
        let client = self.client.take().ok_or(TdfClientError::AlreadyReleased {
            resource: "client session",
        })?;
        self.backend.destroy_client(client);
        if let Some(credential) = self.credential.take() {
            self.backend.destroy_credential(credential);
        }
        let freed = self.allocations.drain();
        debug!(freed, "Closed TDF client");
        Ok(())
    }

    fn operands<'a>(&'a mut self, storage: &'a TdfStorage<B>) -> Result<Operands<'a, B>, TdfClientError> {
        let client = self.client.as_mut().ok_or(TdfClientError::SessionClosed)?;
        if !Arc::ptr_eq(&self.backend, storage.backend()) {
            return Err(TdfClientError::BackendMismatch);
        }
        Ok(Operands {
            backend: &self.backend,
            client,
            storage: storage.native()?,
            kas_url: &self.kas_url,
        })
    }
}

/// Borrowed pieces of a ready session and a live storage handle
struct Operands<'a, B: TdfBackend> {
    backend: &'a B,
    client: &'a mut B::Client,
    storage: &'a B::Storage,
    kas_url: &'a str,
}

impl<B: TdfBackend> fmt::Debug for TdfClient<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TdfClient")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("kas_url", &self.kas_url)
            .field("pending_allocations", &self.allocations.len())
            .finish()
    }
}

impl<B: TdfBackend> Drop for TdfClient<B> {
    fn drop(&mut self) {
        if self.client.is_some() {
            let _ = self.close();
        }
    }
}

/// Register attributes and metadata ahead of an encrypt
///
/// Every attribute is converted before any is registered, so an attribute
/// that cannot cross the boundary leaves the client untouched. Every
/// attribute is then attempted. If any registration fails the encrypt is
/// abandoned, all failures are reported together and whatever did register
/// is discarded first.
fn prepare_encrypt<B: TdfBackend, S: AsRef<str>>(
    backend: &B,
    client: &mut B::Client,
    kas_url: &str,
    metadata: &str,
    attributes: &[S],
    scope: &mut ForeignAllocations,
) -> Result<(), TdfClientError> {
    const ATTR_OP: &str = "TDFAddDataAttribute";
    const META_OP: &str = "TDFSetEncryptedMetadata";
    let c_kas_url = ForeignAllocations::c_string(kas_url, ATTR_OP)?;
    let metadata = ForeignBuffer::new(metadata.as_bytes(), META_OP)?;

    let mut c_attributes = Vec::with_capacity(attributes.len());
    let mut failures = Vec::new();
    for attribute in attributes {
        let attribute = attribute.as_ref();
        match ForeignAllocations::c_string(attribute, ATTR_OP) {
            Ok(c_attr) => c_attributes.push((attribute, c_attr)),
            Err(e) => failures.push(attribute_failure(attribute, &e)),
        }
    }
    if !failures.is_empty() {
        return Err(TdfClientError::AttributeRegistration { failures });
    }

    for (attribute, c_attr) in c_attributes {
        let result = backend
            .add_data_attribute(client, &c_attr, &c_kas_url)
            .check(ATTR_OP);
        scope.adopt_str(c_attr);
        if let Err(e) = result {
            failures.push(attribute_failure(attribute, &e));
        }
    }
    scope.adopt_str(c_kas_url);
    if !failures.is_empty() {
        discard_pending(backend, client);
        return Err(TdfClientError::AttributeRegistration { failures });
    }

    if !metadata.is_empty() {
        if let Err(e) = backend.set_encrypted_metadata(client, metadata).check(META_OP) {
            error!(error = %e, "Error setting encrypted metadata before encrypt");
            discard_pending(backend, client);
            return Err(e);
        }
    }
    Ok(())
}

fn attribute_failure(attribute: &str, err: &TdfClientError) -> AttributeFailure {
    warn!(attribute, error = %err, "Could not register data attribute");
    AttributeFailure {
        attribute: attribute.to_string(),
        reason: err.to_string(),
    }
}

/// Consume attributes and metadata registered for an abandoned encrypt
///
/// The native client has no call to clear them, so they are bound into a
/// throwaway encrypt of an empty buffer and the result is dropped.
fn discard_pending<B: TdfBackend>(backend: &B, client: &mut B::Client) {
    let Some(storage) = backend.create_storage_buffer(ForeignBuffer::empty()) else {
        warn!("Could not create storage to discard pending encrypt state");
        return;
    };
    if let Err(status) = backend.encrypt_string(client, &storage) {
        warn!(%status, "Discarding pending encrypt state failed");
    }
    backend.destroy_storage(storage);
    debug!("Discarded pending encrypt state");
}

fn log_failure(err: TdfClientError) -> TdfClientError {
    error!(error = %err, "TDF operation failed");
    err
}

fn utf8(bytes: Vec<u8>, operation: &'static str) -> Result<String, TdfClientError> {
    String::from_utf8(bytes).map_err(|_| TdfClientError::Utf8 { operation })
}
