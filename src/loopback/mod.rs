//! In-process stand-in for the native TDF client library
//!
//! [`LoopbackBackend`] implements every entry point of [`TdfBackend`]
//! without linking the native SDK, so sessions and storage handles can be
//! exercised offline. The key access service is simulated by a key held in
//! the backend: a container encrypted by one backend instance can only be
//! decrypted by the same instance (or one built with the same KAS key).
//!
//! Containers are TDF-shaped zip archives (`0.manifest.json`, `0.payload`).
//! The payload is AES-256-GCM encrypted, the payload key is wrapped under
//! the KAS key and the policy is bound with HMAC-SHA256. This is a test
//! double; it makes no interoperability promise with other TDF readers.
//!
//! The backend also counts live native objects, which makes it the
//! allocation-counting fake for leak tests.

mod archive;
mod crypto;
mod manifest;

use crate::alloc::ForeignBuffer;
use crate::backend::{NativeLogLevel, TdfBackend};
use crate::policy::PolicyBuilder;
use crate::status::TdfStatus;
use archive::{read_container, write_container, TdfEntry, PAYLOAD_NAME};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use crypto::SealingKey;
use manifest::{TdfManifest, TDF_SPEC_VERSION};
use std::collections::HashMap;
use std::ffi::CStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Native objects created and not yet destroyed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveHandles {
    pub credentials: usize,
    pub clients: usize,
    pub storages: usize,
}

impl LiveHandles {
    pub fn is_empty(&self) -> bool {
        self.credentials == 0 && self.clients == 0 && self.storages == 0
    }
}

#[derive(Debug)]
pub struct LoopbackCredential {
    user: String,
    flow: &'static str,
}

#[derive(Debug)]
pub struct LoopbackClient {
    user: String,
    kas_url: String,
    pending_attributes: Vec<String>,
    pending_metadata: Option<Vec<u8>>,
    log_level: Option<NativeLogLevel>,
}

impl LoopbackClient {
    /// Level requested through `enable_console_logging`, if any
    pub fn log_level(&self) -> Option<NativeLogLevel> {
        self.log_level
    }
}

#[derive(Debug)]
pub enum LoopbackStorage {
    File(PathBuf),
    Buffer(Vec<u8>),
    Remote { url: String, access_key_id: String },
}

struct RemoteObject {
    access_key_id: String,
    data: Vec<u8>,
}

/// Offline implementation of the TDF client entry points
pub struct LoopbackBackend {
    kas_key: SealingKey,
    objects: Mutex<HashMap<String, RemoteObject>>,
    credentials: AtomicUsize,
    clients: AtomicUsize,
    storages: AtomicUsize,
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBackend {
    /// A backend with a freshly generated KAS key
    pub fn new() -> Self {
        Self::with_kas_key(crypto::generate_key())
    }

    /// A backend that shares its KAS key with other instances
    pub fn with_kas_key(key: [u8; 32]) -> Self {
        Self {
            kas_key: SealingKey::new(key),
            objects: Mutex::new(HashMap::new()),
            credentials: AtomicUsize::new(0),
            clients: AtomicUsize::new(0),
            storages: AtomicUsize::new(0),
        }
    }

    pub fn live_handles(&self) -> LiveHandles {
        LiveHandles {
            credentials: self.credentials.load(Ordering::SeqCst),
            clients: self.clients.load(Ordering::SeqCst),
            storages: self.storages.load(Ordering::SeqCst),
        }
    }

    /// Place an object in the simulated remote store
    pub fn put_object(&self, url: &str, access_key_id: &str, data: impl Into<Vec<u8>>) {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            url.to_string(),
            RemoteObject {
                access_key_id: access_key_id.to_string(),
                data: data.into(),
            },
        );
    }

    fn read_storage(&self, storage: &LoopbackStorage) -> Result<Vec<u8>, TdfStatus> {
        match storage {
            LoopbackStorage::Buffer(data) => Ok(data.clone()),
            LoopbackStorage::File(path) => std::fs::read(path).map_err(|e| {
                debug!(path = %path.display(), error = %e, "loopback: cannot read storage file");
                TdfStatus::FAILURE
            }),
            LoopbackStorage::Remote { url, access_key_id } => {
                let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
                match objects.get(url) {
                    Some(obj) if obj.access_key_id == *access_key_id => Ok(obj.data.clone()),
                    Some(_) => {
                        debug!(url, "loopback: access denied to remote object");
                        Err(TdfStatus::FAILURE)
                    }
                    None => {
                        debug!(url, "loopback: no such remote object");
                        Err(TdfStatus::FAILURE)
                    }
                }
            }
        }
    }

    fn seal(&self, client: &mut LoopbackClient, storage: &LoopbackStorage) -> Result<Vec<u8>, TdfStatus> {
        // Attributes and metadata apply to exactly one encrypt, even a failed one
        let attributes = std::mem::take(&mut client.pending_attributes);
        let metadata = client.pending_metadata.take();

        let plaintext = self.read_storage(storage)?;

        let mut builder = PolicyBuilder::new()
            .id_auto()
            .attributes(attributes)
            .spec_version(TDF_SPEC_VERSION);
        if !client.user.is_empty() {
            builder = builder.dissem(client.user.clone());
        }
        let policy_json = builder.build().to_json().map_err(|_| TdfStatus::FAILURE)?;
        let policy_base64 = BASE64.encode(policy_json);

        let payload_key = SealingKey::generate();
        let ciphertext = payload_key.seal(&plaintext).map_err(|_| TdfStatus::FAILURE)?;

        let mut manifest = TdfManifest::new(PAYLOAD_NAME.to_string(), client.kas_url.clone());
        manifest.encryption_information.policy = policy_base64.clone();
        let key_access = &mut manifest.encryption_information.key_access[0];
        key_access.wrapped_key = self.kas_key.wrap(&payload_key).map_err(|_| TdfStatus::FAILURE)?;
        key_access
            .generate_policy_binding(&policy_base64, payload_key.as_bytes())
            .map_err(|_| TdfStatus::FAILURE)?;
        if let Some(metadata) = metadata {
            key_access.encrypted_metadata =
                Some(payload_key.seal_base64(&metadata).map_err(|_| TdfStatus::FAILURE)?);
        }

        write_container(&manifest, &ciphertext).map_err(|e| {
            debug!(error = %e, "loopback: cannot write container");
            TdfStatus::FAILURE
        })
    }

    fn parse(&self, storage: &LoopbackStorage) -> Result<TdfEntry, TdfStatus> {
        let data = self.read_storage(storage)?;
        read_container(&data).map_err(|e| {
            debug!(error = %e, "loopback: storage does not hold a TDF container");
            TdfStatus::FAILURE
        })
    }

    /// Simulated KAS rewrap: release the payload key to a matching client
    fn unwrap_payload_key(&self, client: &LoopbackClient, entry: &TdfEntry) -> Result<SealingKey, TdfStatus> {
        let key_access = entry.manifest.key_access().ok_or(TdfStatus::FAILURE)?;
        if key_access.url != client.kas_url {
            debug!(expected = %key_access.url, actual = %client.kas_url, "loopback: KAS mismatch");
            return Err(TdfStatus::FAILURE);
        }

        let payload_key = self.kas_key.unwrap_key(&key_access.wrapped_key).map_err(|e| {
            debug!(error = %e, "loopback: KAS refused to unwrap key");
            TdfStatus::FAILURE
        })?;

        key_access
            .verify_policy_binding(&entry.manifest.encryption_information.policy, payload_key.as_bytes())
            .map_err(|_| {
                debug!("loopback: policy binding does not verify");
                TdfStatus::FAILURE
            })?;
        Ok(payload_key)
    }

    fn open(&self, client: &LoopbackClient, storage: &LoopbackStorage) -> Result<Vec<u8>, TdfStatus> {
        let entry = self.parse(storage)?;
        let payload_key = self.unwrap_payload_key(client, &entry)?;
        payload_key.open(&entry.payload).map_err(|e| {
            debug!(error = %e, "loopback: payload does not decrypt");
            TdfStatus::FAILURE
        })
    }
}

fn http_url(value: &CStr) -> Option<&str> {
    value
        .to_str()
        .ok()
        .filter(|s| s.starts_with("https://") || s.starts_with("http://"))
}

/// Same structure the platform enforces: `http(s)://<namespace>/attr/<name>[/value/<value>]`
fn is_attribute_uri(uri: &str) -> bool {
    let Some(rest) = uri
        .strip_prefix("https://")
        .or_else(|| uri.strip_prefix("http://"))
    else {
        return false;
    };
    match rest.split_once("/attr/") {
        Some((namespace, name)) => !namespace.is_empty() && !name.is_empty(),
        None => false,
    }
}

impl TdfBackend for LoopbackBackend {
    type Credential = LoopbackCredential;
    type Client = LoopbackClient;
    type Storage = LoopbackStorage;

    fn name(&self) -> &'static str {
        "loopback"
    }

    fn create_credential_client_creds(
        &self,
        user: &CStr,
        oidc_url: &CStr,
        client_id: &CStr,
        _client_secret: &CStr,
        _organization: &CStr,
    ) -> Option<Self::Credential> {
        http_url(oidc_url)?;
        if client_id.to_bytes().is_empty() {
            return None;
        }
        self.credentials.fetch_add(1, Ordering::SeqCst);
        Some(LoopbackCredential {
            user: user.to_string_lossy().into_owned(),
            flow: "client-secret",
        })
    }

    fn create_credential_token_exchange(
        &self,
        user: &CStr,
        oidc_url: &CStr,
        client_id: &CStr,
        _client_secret: &CStr,
        external_token: &CStr,
        _organization: &CStr,
    ) -> Option<Self::Credential> {
        http_url(oidc_url)?;
        if client_id.to_bytes().is_empty() || external_token.to_bytes().is_empty() {
            return None;
        }
        self.credentials.fetch_add(1, Ordering::SeqCst);
        Some(LoopbackCredential {
            user: user.to_string_lossy().into_owned(),
            flow: "token-exchange",
        })
    }

    fn create_client(&self, credential: &Self::Credential, kas_url: &CStr) -> Option<Self::Client> {
        let kas_url = http_url(kas_url)?;
        self.clients.fetch_add(1, Ordering::SeqCst);
        debug!(flow = credential.flow, kas_url, "loopback: client created");
        Some(LoopbackClient {
            user: credential.user.clone(),
            kas_url: kas_url.to_string(),
            pending_attributes: Vec::new(),
            pending_metadata: None,
            log_level: None,
        })
    }

    fn enable_console_logging(&self, client: &mut Self::Client, level: NativeLogLevel) -> TdfStatus {
        client.log_level = Some(level);
        TdfStatus::SUCCESS
    }

    fn destroy_client(&self, _client: Self::Client) {
        self.clients.fetch_sub(1, Ordering::SeqCst);
    }

    fn destroy_credential(&self, _credential: Self::Credential) {
        self.credentials.fetch_sub(1, Ordering::SeqCst);
    }

    fn create_storage_file(&self, path: &CStr) -> Option<Self::Storage> {
        let path = path.to_str().ok().filter(|p| !p.is_empty())?;
        self.storages.fetch_add(1, Ordering::SeqCst);
        Some(LoopbackStorage::File(PathBuf::from(path)))
    }

    fn create_storage_buffer(&self, data: ForeignBuffer<'_>) -> Option<Self::Storage> {
        if data.as_ptr().is_null() {
            return None;
        }
        self.storages.fetch_add(1, Ordering::SeqCst);
        Some(LoopbackStorage::Buffer(data.as_slice().to_vec()))
    }

    fn create_storage_remote(
        &self,
        url: &CStr,
        access_key_id: &CStr,
        _secret_key: &CStr,
        _region: &CStr,
    ) -> Option<Self::Storage> {
        let url = url.to_str().ok().filter(|u| !u.is_empty())?;
        let access_key_id = access_key_id.to_str().ok()?;
        self.storages.fetch_add(1, Ordering::SeqCst);
        Some(LoopbackStorage::Remote {
            url: url.to_string(),
            access_key_id: access_key_id.to_string(),
        })
    }

    fn destroy_storage(&self, _storage: Self::Storage) {
        self.storages.fetch_sub(1, Ordering::SeqCst);
    }

    fn add_data_attribute(&self, client: &mut Self::Client, attribute: &CStr, kas_url: &CStr) -> TdfStatus {
        let Ok(attribute) = attribute.to_str() else {
            return TdfStatus::INVALID_PARAMS;
        };
        if !is_attribute_uri(attribute) || http_url(kas_url).is_none() {
            return TdfStatus::INVALID_PARAMS;
        }
        client.pending_attributes.push(attribute.to_string());
        TdfStatus::SUCCESS
    }

    fn set_encrypted_metadata(&self, client: &mut Self::Client, metadata: ForeignBuffer<'_>) -> TdfStatus {
        client.pending_metadata = Some(metadata.as_slice().to_vec());
        TdfStatus::SUCCESS
    }

    fn encrypt_file(&self, client: &mut Self::Client, storage: &Self::Storage, out_path: &CStr) -> TdfStatus {
        let Ok(out_path) = out_path.to_str() else {
            return TdfStatus::INVALID_PARAMS;
        };
        let container = match self.seal(client, storage) {
            Ok(container) => container,
            Err(status) => return status,
        };
        match std::fs::write(out_path, container) {
            Ok(()) => TdfStatus::SUCCESS,
            Err(e) => {
                debug!(path = out_path, error = %e, "loopback: cannot write output file");
                TdfStatus::FAILURE
            }
        }
    }

    fn encrypt_string(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus> {
        self.seal(client, storage)
    }

    fn decrypt_string(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus> {
        self.open(client, storage)
    }

    fn decrypt_partial(
        &self,
        client: &mut Self::Client,
        storage: &Self::Storage,
        offset: u32,
        length: u32,
    ) -> Result<Vec<u8>, TdfStatus> {
        let plaintext = self.open(client, storage)?;
        let start = offset as usize;
        let end = start.checked_add(length as usize).ok_or(TdfStatus::INVALID_PARAMS)?;
        plaintext
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or(TdfStatus::INVALID_PARAMS)
    }

    fn get_encrypted_metadata(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus> {
        let entry = self.parse(storage)?;
        let payload_key = self.unwrap_payload_key(client, &entry)?;
        match entry.manifest.key_access().and_then(|ka| ka.encrypted_metadata.as_deref()) {
            Some(sealed) => payload_key.open_base64(sealed).map_err(|_| TdfStatus::FAILURE),
            None => Ok(Vec::new()),
        }
    }

    fn get_policy(&self, _client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus> {
        let entry = self.parse(storage)?;
        BASE64
            .decode(&entry.manifest.encryption_information.policy)
            .map_err(|_| TdfStatus::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    fn client(backend: &LoopbackBackend) -> (LoopbackCredential, LoopbackClient) {
        let cred = backend
            .create_credential_client_creds(
                &c("user@example.com"),
                &c("https://idp.example.com"),
                &c("client"),
                &c("secret"),
                &c("org"),
            )
            .unwrap();
        let client = backend.create_client(&cred, &c("https://kas.example.com")).unwrap();
        (cred, client)
    }

    #[test]
    fn test_constructors_reject_bad_endpoints() {
        let backend = LoopbackBackend::new();
        assert!(backend
            .create_credential_client_creds(&c("u"), &c("not-a-url"), &c("id"), &c("s"), &c("o"))
            .is_none());
        assert!(backend
            .create_credential_token_exchange(&c("u"), &c("https://idp"), &c("id"), &c("s"), &c(""), &c("o"))
            .is_none());

        let cred = backend
            .create_credential_client_creds(&c("u"), &c("https://idp"), &c("id"), &c("s"), &c("o"))
            .unwrap();
        assert!(backend.create_client(&cred, &c("ftp://kas")).is_none());
        backend.destroy_credential(cred);
        assert!(backend.live_handles().is_empty());
    }

    #[test]
    fn test_attribute_uri_shape() {
        assert!(is_attribute_uri("https://example.com/attr/Classification/value/C"));
        assert!(is_attribute_uri("http://example.com/attr/COI"));
        assert!(!is_attribute_uri("https://example.com/Classification"));
        assert!(!is_attribute_uri("https:///attr/x"));
        assert!(!is_attribute_uri("example.com/attr/x"));
    }

    #[test]
    fn test_pending_state_is_consumed_by_encrypt() {
        let backend = LoopbackBackend::new();
        let (cred, mut client) = client(&backend);
        let storage = LoopbackStorage::Buffer(b"data".to_vec());

        let status = backend.add_data_attribute(
            &mut client,
            &c("https://example.com/attr/A/value/1"),
            &c("https://kas.example.com"),
        );
        assert!(status.is_success());
        backend
            .set_encrypted_metadata(&mut client, ForeignBuffer::new(b"meta", "op").unwrap())
            .check("op")
            .unwrap();

        let first = backend.encrypt_string(&mut client, &storage).unwrap();
        let second = backend.encrypt_string(&mut client, &storage).unwrap();

        for (bytes, expected) in [(first, 1), (second, 0)] {
            let json = backend
                .get_policy(&mut client, &LoopbackStorage::Buffer(bytes))
                .unwrap();
            let policy = crate::Policy::from_json(std::str::from_utf8(&json).unwrap()).unwrap();
            assert_eq!(policy.body.data_attributes.len(), expected);
        }

        backend.destroy_client(client);
        backend.destroy_credential(cred);
    }

    #[test]
    fn test_unreadable_storage_still_consumes_pending_state() {
        let backend = LoopbackBackend::new();
        let (cred, mut client) = client(&backend);
        backend
            .add_data_attribute(
                &mut client,
                &c("https://example.com/attr/A/value/1"),
                &c("https://kas.example.com"),
            )
            .check("op")
            .unwrap();
        backend
            .set_encrypted_metadata(&mut client, ForeignBuffer::new(b"secret-meta", "op").unwrap())
            .check("op")
            .unwrap();

        let missing = LoopbackStorage::File(PathBuf::from("/nonexistent/input.txt"));
        assert_eq!(backend.encrypt_string(&mut client, &missing), Err(TdfStatus::FAILURE));
        assert!(client.pending_attributes.is_empty());
        assert!(client.pending_metadata.is_none());

        let container = backend
            .encrypt_string(&mut client, &LoopbackStorage::Buffer(b"data".to_vec()))
            .unwrap();
        let storage = LoopbackStorage::Buffer(container);
        let json = backend.get_policy(&mut client, &storage).unwrap();
        let policy = crate::Policy::from_json(std::str::from_utf8(&json).unwrap()).unwrap();
        assert!(policy.body.data_attributes.is_empty());
        assert!(backend.get_encrypted_metadata(&mut client, &storage).unwrap().is_empty());

        backend.destroy_client(client);
        backend.destroy_credential(cred);
    }

    #[test]
    fn test_other_kas_key_cannot_decrypt() {
        let backend = LoopbackBackend::new();
        let (_cred, mut client) = client(&backend);
        let container = backend
            .encrypt_string(&mut client, &LoopbackStorage::Buffer(b"secret".to_vec()))
            .unwrap();

        let other = LoopbackBackend::new();
        let (_cred2, mut other_client) = self::client(&other);
        let storage = LoopbackStorage::Buffer(container);
        assert_eq!(other.decrypt_string(&mut other_client, &storage), Err(TdfStatus::FAILURE));
        assert_eq!(backend.decrypt_string(&mut client, &storage).unwrap(), b"secret");
    }

    #[test]
    fn test_shared_kas_key_interoperates() {
        let key = [42u8; 32];
        let writer = LoopbackBackend::with_kas_key(key);
        let reader = LoopbackBackend::with_kas_key(key);
        let (_c1, mut w) = client(&writer);
        let (_c2, mut r) = client(&reader);

        let container = writer
            .encrypt_string(&mut w, &LoopbackStorage::Buffer(b"shared".to_vec()))
            .unwrap();
        let storage = LoopbackStorage::Buffer(container);
        assert_eq!(reader.decrypt_string(&mut r, &storage).unwrap(), b"shared");
    }

    #[test]
    fn test_remote_object_access_key_checked() {
        let backend = LoopbackBackend::new();
        backend.put_object("s3://bucket/obj", "AKIA", b"remote".to_vec());

        let good = LoopbackStorage::Remote {
            url: "s3://bucket/obj".to_string(),
            access_key_id: "AKIA".to_string(),
        };
        let bad = LoopbackStorage::Remote {
            url: "s3://bucket/obj".to_string(),
            access_key_id: "OTHER".to_string(),
        };
        assert_eq!(backend.read_storage(&good).unwrap(), b"remote");
        assert_eq!(backend.read_storage(&bad), Err(TdfStatus::FAILURE));
    }
}
