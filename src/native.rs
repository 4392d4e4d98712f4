//! [`TdfBackend`] over the native OpenTDF client library
//!
//! Enabled with the `native` feature. Linking needs
//! `libopentdf_static_combined.a`; point `OPENTDF_LIB_DIR` at its directory.

use crate::alloc::ForeignBuffer;
use crate::backend::{NativeLogLevel, TdfBackend};
use crate::status::TdfStatus;
use opentdf_client_sys as sys;
use std::ffi::CStr;
use std::os::raw::c_void;
use std::ptr::{self, NonNull};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Owned native credential object
#[derive(Debug)]
pub struct NativeCredential(NonNull<sys::TDFCreds>);

/// Owned native client object
#[derive(Debug)]
pub struct NativeClient(NonNull<sys::TDFClient>);

/// Owned native storage object
#[derive(Debug)]
pub struct NativeStorage(NonNull<sys::TDFStorageType>);

// Each handle has exactly one owner; it may move between threads but is
// never shared.
unsafe impl Send for NativeCredential {}
unsafe impl Send for NativeClient {}
unsafe impl Send for NativeStorage {}

static SHARED: OnceLock<Arc<NativeBackend>> = OnceLock::new();

/// The native library; one per process
#[derive(Debug)]
pub struct NativeBackend {
    _private: (),
}

impl NativeBackend {
    /// The process-wide instance
    ///
    /// Library-global state is set up the first time this runs, no matter
    /// how many sessions are constructed afterwards.
    pub fn shared() -> Arc<NativeBackend> {
        Arc::clone(SHARED.get_or_init(|| {
            info!("Loading native TDF client library");
            Arc::new(NativeBackend { _private: () })
        }))
    }
}

/// A malloc'd output buffer owned by this side of the boundary
struct NativeBytes {
    ptr: sys::TDFBytesPtr,
    len: sys::TDFBytesLength,
}

impl NativeBytes {
    fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    fn to_vec(&self) -> Vec<u8> {
        if self.ptr.is_null() || self.len == 0 {
            return Vec::new();
        }
        // SAFETY: the library reported `len` readable bytes at `ptr`
        unsafe { std::slice::from_raw_parts(self.ptr, self.len as usize) }.to_vec()
    }
}

impl Drop for NativeBytes {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: output buffers are allocated with malloc and handed to us
            unsafe { sys::free(self.ptr as *mut c_void) };
        }
    }
}

/// Run a native call that fills an output buffer, copy it out and free it
fn read_out<F>(call: F) -> Result<Vec<u8>, TdfStatus>
where
    F: FnOnce(*mut sys::TDFBytesPtr, *mut sys::TDFBytesLength) -> sys::TDF_STATUS,
{
    let mut out = NativeBytes::empty();
    let status = TdfStatus(call(&mut out.ptr, &mut out.len));
    if !status.is_success() {
        return Err(status);
    }
    let bytes = out.to_vec();
    debug!(len = bytes.len(), "copied native output buffer");
    Ok(bytes)
}

fn log_level(level: NativeLogLevel) -> sys::TDFLogLevel {
    match level {
        NativeLogLevel::Trace => sys::TDFLogLevelTrace,
        NativeLogLevel::Debug => sys::TDFLogLevelDebug,
        NativeLogLevel::Info => sys::TDFLogLevelInfo,
        NativeLogLevel::Warn => sys::TDFLogLevelWarn,
        NativeLogLevel::Error => sys::TDFLogLevelError,
        NativeLogLevel::Fatal => sys::TDFLogLevelFatal,
    }
}

// SAFETY (for every call below): string arguments are NUL-terminated and
// outlive the call, buffer pointers are non-null with matching lengths, and
// handles are live because their owners destroy them exactly once.
impl TdfBackend for NativeBackend {
    type Credential = NativeCredential;
    type Client = NativeClient;
    type Storage = NativeStorage;

    fn name(&self) -> &'static str {
        "native"
    }

    fn create_credential_client_creds(
        &self,
        _user: &CStr,
        oidc_url: &CStr,
        client_id: &CStr,
        client_secret: &CStr,
        organization: &CStr,
    ) -> Option<Self::Credential> {
        let raw = unsafe {
            sys::TDFCreateCredentialClientCreds(
                oidc_url.as_ptr(),
                client_id.as_ptr(),
                client_secret.as_ptr(),
                organization.as_ptr(),
            )
        };
        NonNull::new(raw).map(NativeCredential)
    }

    fn create_credential_token_exchange(
        &self,
        _user: &CStr,
        oidc_url: &CStr,
        client_id: &CStr,
        client_secret: &CStr,
        external_token: &CStr,
        organization: &CStr,
    ) -> Option<Self::Credential> {
        let raw = unsafe {
            sys::TDFCreateCredentialTokenExchange(
                oidc_url.as_ptr(),
                client_id.as_ptr(),
                client_secret.as_ptr(),
                external_token.as_ptr(),
                organization.as_ptr(),
            )
        };
        NonNull::new(raw).map(NativeCredential)
    }

    fn create_client(&self, credential: &Self::Credential, kas_url: &CStr) -> Option<Self::Client> {
        let raw = unsafe { sys::TDFCreateClient(credential.0.as_ptr(), kas_url.as_ptr()) };
        NonNull::new(raw).map(NativeClient)
    }

    fn enable_console_logging(&self, client: &mut Self::Client, level: NativeLogLevel) -> TdfStatus {
        TdfStatus(unsafe { sys::TDFEnableConsoleLogging(client.0.as_ptr(), log_level(level)) })
    }

    fn destroy_client(&self, client: Self::Client) {
        unsafe { sys::TDFDestroyClient(client.0.as_ptr()) }
    }

    fn destroy_credential(&self, credential: Self::Credential) {
        unsafe { sys::TDFDestroyCredential(credential.0.as_ptr()) }
    }

    fn create_storage_file(&self, path: &CStr) -> Option<Self::Storage> {
        let raw = unsafe { sys::TDFCreateTDFStorageFileType(path.as_ptr()) };
        NonNull::new(raw).map(NativeStorage)
    }

    fn create_storage_buffer(&self, data: ForeignBuffer<'_>) -> Option<Self::Storage> {
        let raw = unsafe { sys::TDFCreateTDFStorageStringType(data.as_ptr(), data.len()) };
        NonNull::new(raw).map(NativeStorage)
    }

    fn create_storage_remote(
        &self,
        url: &CStr,
        access_key_id: &CStr,
        secret_key: &CStr,
        region: &CStr,
    ) -> Option<Self::Storage> {
        let raw = unsafe {
            sys::TDFCreateTDFStorageS3Type(
                url.as_ptr(),
                access_key_id.as_ptr(),
                secret_key.as_ptr(),
                region.as_ptr(),
            )
        };
        NonNull::new(raw).map(NativeStorage)
    }

    fn destroy_storage(&self, storage: Self::Storage) {
        unsafe { sys::TDFDestroyStorage(storage.0.as_ptr()) }
    }

    fn add_data_attribute(&self, client: &mut Self::Client, attribute: &CStr, kas_url: &CStr) -> TdfStatus {
        TdfStatus(unsafe { sys::TDFAddDataAttribute(client.0.as_ptr(), attribute.as_ptr(), kas_url.as_ptr()) })
    }

    fn set_encrypted_metadata(&self, client: &mut Self::Client, metadata: ForeignBuffer<'_>) -> TdfStatus {
        TdfStatus(unsafe { sys::TDFSetEncryptedMetadata(client.0.as_ptr(), metadata.as_ptr(), metadata.len()) })
    }

    fn encrypt_file(&self, client: &mut Self::Client, storage: &Self::Storage, out_path: &CStr) -> TdfStatus {
        TdfStatus(unsafe { sys::TDFEncryptFile(client.0.as_ptr(), storage.0.as_ptr(), out_path.as_ptr()) })
    }

    fn encrypt_string(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus> {
        read_out(|out, len| unsafe { sys::TDFEncryptString(client.0.as_ptr(), storage.0.as_ptr(), out, len) })
    }

    fn decrypt_string(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus> {
        read_out(|out, len| unsafe { sys::TDFDecryptString(client.0.as_ptr(), storage.0.as_ptr(), out, len) })
    }

    fn decrypt_partial(
        &self,
        client: &mut Self::Client,
        storage: &Self::Storage,
        offset: u32,
        length: u32,
    ) -> Result<Vec<u8>, TdfStatus> {
        read_out(|out, len| unsafe {
            sys::TDFDecryptDataPartial(client.0.as_ptr(), storage.0.as_ptr(), offset, length, out, len)
        })
    }

    fn get_encrypted_metadata(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus> {
        read_out(|out, len| unsafe { sys::TDFGetEncryptedMetadata(client.0.as_ptr(), storage.0.as_ptr(), out, len) })
    }

    fn get_policy(&self, client: &mut Self::Client, storage: &Self::Storage) -> Result<Vec<u8>, TdfStatus> {
        read_out(|out, len| unsafe { sys::TDFGetPolicy(client.0.as_ptr(), storage.0.as_ptr(), out, len) })
    }
}
