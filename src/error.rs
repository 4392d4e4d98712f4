//! Unified error type for the OpenTDF client API
//!
//! Every native status code, lifecycle violation and decode failure surfaces
//! as a [`TdfClientError`]. Nothing in this crate retries; callers decide.
//!
//! # Example
//!
//! ```no_run
//! use opentdf_client::TdfClientError;
//!
//! fn report(err: &TdfClientError) {
//!     eprintln!("{} ({})", err, err.error_code());
//!     if let Some(hint) = err.suggestion() {
//!         eprintln!("hint: {}", hint);
//!     }
//! }
//! ```

use thiserror::Error;

/// One attribute the native layer refused to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFailure {
    pub attribute: String,
    pub reason: String,
}

/// Error type for all client, storage and policy operations
///
/// # Error Categories
///
/// - **Construction**: a native constructor returned null. Fatal for the
///   object being built; retry only with corrected inputs.
/// - **InvalidParameters**: the native layer (or marshaling) rejected an
///   argument. Caller-correctable.
/// - **OperationFailed**: generic native failure carrying the raw status code.
/// - **Decode**: a JSON document returned by the native layer did not parse.
/// - **Lifecycle**: use after close/release or double release.
#[derive(Debug, Error)]
pub enum TdfClientError {
    #[error("Could not initialize native {object}")]
    Construction { object: &'static str },

    #[error("Bad param calling {operation}: {reason}")]
    InvalidParameters {
        operation: &'static str,
        reason: String,
    },

    #[error("Native call {operation} failed with code {code}")]
    OperationFailed { operation: &'static str, code: i32 },

    #[error("Could not decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Output of {operation} is not valid UTF-8")]
    Utf8 { operation: &'static str },

    #[error("Failed to register {} data attribute(s)", .failures.len())]
    AttributeRegistration { failures: Vec<AttributeFailure> },

    #[error("Client session is closed")]
    SessionClosed,

    #[error("Storage handle has been released")]
    StorageReleased,

    #[error("{resource} was already released")]
    AlreadyReleased { resource: &'static str },

    #[error("Storage handle belongs to a different backend instance")]
    BackendMismatch,
}

impl TdfClientError {
    pub(crate) fn invalid(operation: &'static str, reason: impl Into<String>) -> Self {
        TdfClientError::InvalidParameters {
            operation,
            reason: reason.into(),
        }
    }

    /// Returns true if the failure might succeed on a later attempt
    ///
    /// Only opaque native failures qualify; everything else needs different
    /// input or a different call sequence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TdfClientError::OperationFailed { .. })
    }

    /// Returns true if a native constructor returned null
    pub fn is_construction_error(&self) -> bool {
        matches!(self, TdfClientError::Construction { .. })
    }

    /// Returns true if a returned document could not be decoded
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            TdfClientError::Decode { .. } | TdfClientError::Utf8 { .. }
        )
    }

    /// Returns true for use-after-release and double-release errors
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            TdfClientError::SessionClosed
                | TdfClientError::StorageReleased
                | TdfClientError::AlreadyReleased { .. }
                | TdfClientError::BackendMismatch
        )
    }

    /// Returns a suggestion for resolving this error, if one exists
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            TdfClientError::Construction { .. } => {
                Some("Check the OIDC endpoint, client credentials and KAS URL")
            }
            TdfClientError::AttributeRegistration { .. } => Some(
                "Attribute URIs must look like https://<namespace>/attr/<name>/value/<value>",
            ),
            TdfClientError::SessionClosed => Some("Create a new client session"),
            TdfClientError::StorageReleased => Some("Create a new storage handle for the payload"),
            TdfClientError::BackendMismatch => {
                Some("Create storage through the session that will consume it")
            }
            _ => None,
        }
    }

    /// Returns a stable error code for programmatic error handling
    ///
    /// Codes follow the format `OPENTDF_E_<CATEGORY>_<SPECIFIC>`.
    pub fn error_code(&self) -> &'static str {
        match self {
            TdfClientError::Construction { .. } => "OPENTDF_E_NATIVE_CONSTRUCTION",
            TdfClientError::InvalidParameters { .. } => "OPENTDF_E_NATIVE_INVALID_PARAMS",
            TdfClientError::OperationFailed { .. } => "OPENTDF_E_NATIVE_FAILURE",
            TdfClientError::Decode { .. } => "OPENTDF_E_DECODE_JSON",
            TdfClientError::Utf8 { .. } => "OPENTDF_E_DECODE_UTF8",
            TdfClientError::AttributeRegistration { .. } => "OPENTDF_E_POLICY_ATTRIBUTE",
            TdfClientError::SessionClosed => "OPENTDF_E_LIFECYCLE_SESSION_CLOSED",
            TdfClientError::StorageReleased => "OPENTDF_E_LIFECYCLE_STORAGE_RELEASED",
            TdfClientError::AlreadyReleased { .. } => "OPENTDF_E_LIFECYCLE_DOUBLE_RELEASE",
            TdfClientError::BackendMismatch => "OPENTDF_E_LIFECYCLE_BACKEND_MISMATCH",
        }
    }
}
