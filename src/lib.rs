//! Safe bindings to the OpenTDF client library
//!
//! A [`TdfClient`] session encrypts, decrypts and inspects TDF containers
//! held in [`TdfStorage`] handles. Both sit on a [`TdfBackend`]: the native
//! library behind the `native` feature, or the in-process [`LoopbackBackend`].

mod alloc;
mod backend;
mod client;
mod config;
mod error;
pub mod loopback;
#[cfg(feature = "native")]
pub mod native;
mod policy;
mod status;
mod storage;

pub use alloc::{ForeignAllocations, ForeignBuffer};
pub use backend::{NativeLogLevel, TdfBackend};
pub use client::{Credentials, SessionState, TdfClient};
pub use config::TdfConfig;
pub use error::{AttributeFailure, TdfClientError};
pub use loopback::{LiveHandles, LoopbackBackend};
#[cfg(feature = "native")]
pub use native::NativeBackend;
pub use policy::{
    Attribute, Policy, PolicyBody, PolicyBuilder, PolicyError, ValidationError,
    ValidationErrorType,
};
pub use status::TdfStatus;
pub use storage::{StorageKind, TdfStorage};
