//! Raw bindings to the OpenTDF client C API (`tdf_client_c.h`,
//! `tdf_constants_c.h`).
//!
//! Nothing here is safe to call directly. The `opentdf-client` crate wraps
//! these declarations in owned handle types.
#![allow(non_camel_case_types, non_upper_case_globals)]

use std::os::raw::{c_char, c_int, c_uchar, c_uint, c_void};

/// Opaque native credential object
#[repr(C)]
pub struct TDFCreds {
    _private: [u8; 0],
}

/// Opaque native client object
#[repr(C)]
pub struct TDFClient {
    _private: [u8; 0],
}

/// Opaque native storage object
#[repr(C)]
pub struct TDFStorageType {
    _private: [u8; 0],
}

pub type TDFCredsPtr = *mut TDFCreds;
pub type TDFClientPtr = *mut TDFClient;
pub type TDFStorageTypePtr = *mut TDFStorageType;
pub type TDFBytesPtr = *mut c_uchar;
pub type TDFBytesLength = c_uint;

pub type TDF_STATUS = c_int;
pub const TDF_STATUS_SUCCESS: TDF_STATUS = 0;
pub const TDF_STATUS_FAILURE: TDF_STATUS = 1;
pub const TDF_STATUS_INVALID_PARAMS: TDF_STATUS = 2;

pub type TDFLogLevel = c_int;
pub const TDFLogLevelTrace: TDFLogLevel = 0;
pub const TDFLogLevelDebug: TDFLogLevel = 1;
pub const TDFLogLevelInfo: TDFLogLevel = 2;
pub const TDFLogLevelWarn: TDFLogLevel = 3;
pub const TDFLogLevelError: TDFLogLevel = 4;
pub const TDFLogLevelFatal: TDFLogLevel = 5;

extern "C" {
    pub fn TDFCreateCredentialClientCreds(
        oidc_endpoint: *const c_char,
        client_id: *const c_char,
        client_secret: *const c_char,
        organization_name: *const c_char,
    ) -> TDFCredsPtr;

    pub fn TDFCreateCredentialTokenExchange(
        oidc_endpoint: *const c_char,
        client_id: *const c_char,
        client_secret: *const c_char,
        external_exchange_token: *const c_char,
        organization_name: *const c_char,
    ) -> TDFCredsPtr;

    pub fn TDFDestroyCredential(creds: TDFCredsPtr);

    pub fn TDFCreateClient(creds: TDFCredsPtr, kas_url: *const c_char) -> TDFClientPtr;

    pub fn TDFDestroyClient(client: TDFClientPtr);

    pub fn TDFEnableConsoleLogging(client: TDFClientPtr, log_level: TDFLogLevel) -> TDF_STATUS;

    pub fn TDFAddDataAttribute(
        client: TDFClientPtr,
        data_attribute: *const c_char,
        kas_url: *const c_char,
    ) -> TDF_STATUS;

    pub fn TDFSetEncryptedMetadata(
        client: TDFClientPtr,
        metadata: *const c_uchar,
        metadata_len: c_uint,
    ) -> TDF_STATUS;

    pub fn TDFCreateTDFStorageFileType(file_path: *const c_char) -> TDFStorageTypePtr;

    pub fn TDFCreateTDFStorageStringType(data: *const c_uchar, data_len: c_uint)
        -> TDFStorageTypePtr;

    pub fn TDFCreateTDFStorageS3Type(
        s3_url: *const c_char,
        aws_access_key_id: *const c_char,
        aws_secret_access_key: *const c_char,
        aws_region_name: *const c_char,
    ) -> TDFStorageTypePtr;

    pub fn TDFDestroyStorage(storage: TDFStorageTypePtr);

    pub fn TDFEncryptFile(
        client: TDFClientPtr,
        storage: TDFStorageTypePtr,
        out_file_path: *const c_char,
    ) -> TDF_STATUS;

    pub fn TDFEncryptString(
        client: TDFClientPtr,
        storage: TDFStorageTypePtr,
        out_bytes: *mut TDFBytesPtr,
        out_bytes_len: *mut TDFBytesLength,
    ) -> TDF_STATUS;

    pub fn TDFDecryptString(
        client: TDFClientPtr,
        storage: TDFStorageTypePtr,
        out_bytes: *mut TDFBytesPtr,
        out_bytes_len: *mut TDFBytesLength,
    ) -> TDF_STATUS;

    pub fn TDFDecryptDataPartial(
        client: TDFClientPtr,
        storage: TDFStorageTypePtr,
        offset: TDFBytesLength,
        length: TDFBytesLength,
        out_bytes: *mut TDFBytesPtr,
        out_bytes_len: *mut TDFBytesLength,
    ) -> TDF_STATUS;

    pub fn TDFGetEncryptedMetadata(
        client: TDFClientPtr,
        storage: TDFStorageTypePtr,
        out_bytes: *mut TDFBytesPtr,
        out_bytes_len: *mut TDFBytesLength,
    ) -> TDF_STATUS;

    pub fn TDFGetPolicy(
        client: TDFClientPtr,
        storage: TDFStorageTypePtr,
        out_bytes: *mut TDFBytesPtr,
        out_bytes_len: *mut TDFBytesLength,
    ) -> TDF_STATUS;

    /// Output buffers returned by the library are allocated with `malloc`
    pub fn free(ptr: *mut c_void);
}
