//! The foreign-function boundary
//!
//! [`TdfBackend`] has one method per entry point of the native TDF client
//! library. Sessions and storage handles own the handles it returns and are
//! the only callers; the trait itself performs no lifecycle checks.

use crate::alloc::ForeignBuffer;
use crate::status::TdfStatus;
use std::ffi::CStr;

/// Verbosity of the native library's internal console logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Entry points of a TDF client library
///
/// Constructors return `None` where the native library returns a null
/// handle. Destructors consume the handle. Calls that produce bytes return
/// an owned copy; implementations over foreign memory must free the native
/// buffer before returning.
pub trait TdfBackend: Send + Sync {
    type Credential;
    type Client;
    type Storage;

    /// Short name used in log output
    fn name(&self) -> &'static str;

    fn create_credential_client_creds(
        &self,
        user: &CStr,
        oidc_url: &CStr,
        client_id: &CStr,
        client_secret: &CStr,
        organization: &CStr,
    ) -> Option<Self::Credential>;

    fn create_credential_token_exchange(
        &self,
        user: &CStr,
        oidc_url: &CStr,
        client_id: &CStr,
        client_secret: &CStr,
        external_token: &CStr,
        organization: &CStr,
    ) -> Option<Self::Credential>;

    fn create_client(&self, credential: &Self::Credential, kas_url: &CStr) -> Option<Self::Client>;

    fn enable_console_logging(&self, client: &mut Self::Client, level: NativeLogLevel) -> TdfStatus;

    fn destroy_client(&self, client: Self::Client);

    fn destroy_credential(&self, credential: Self::Credential);

    fn create_storage_file(&self, path: &CStr) -> Option<Self::Storage>;

    fn create_storage_buffer(&self, data: ForeignBuffer<'_>) -> Option<Self::Storage>;

    fn create_storage_remote(
        &self,
        url: &CStr,
        access_key_id: &CStr,
        secret_key: &CStr,
        region: &CStr,
    ) -> Option<Self::Storage>;

    fn destroy_storage(&self, storage: Self::Storage);

    fn add_data_attribute(&self, client: &mut Self::Client, attribute: &CStr, kas_url: &CStr) -> TdfStatus;

    fn set_encrypted_metadata(&self, client: &mut Self::Client, metadata: ForeignBuffer<'_>) -> TdfStatus;

    fn encrypt_file(&self, client: &mut Self::Client, storage: &Self::Storage, out_path: &CStr) -> TdfStatus;

    fn encrypt_string(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus>;

    fn decrypt_string(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus>;

    /// Decrypt `length` plaintext bytes starting at plaintext `offset`
    fn decrypt_partial(
        &self,
        client: &mut Self::Client,
        storage: &Self::Storage,
        offset: u32,
        length: u32,
    ) -> Result<Vec<u8>, TdfStatus>;

    fn get_encrypted_metadata(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus>;

    fn get_policy(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus>;
}
