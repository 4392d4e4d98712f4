//! Storage handles: the payload side of every encrypt/decrypt call

use crate::alloc::{ForeignAllocations, ForeignBuffer};
use crate::backend::TdfBackend;
use crate::error::TdfClientError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// What backs a storage handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// A filesystem path, read lazily by the native layer
    File,
    /// An in-memory UTF-8 string
    StringBuffer,
    /// An in-memory byte buffer
    ByteBuffer,
    /// An object in a remote store behind credentialed access
    RemoteObject,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageKind::File => "file",
            StorageKind::StringBuffer => "string",
            StorageKind::ByteBuffer => "bytes",
            StorageKind::RemoteObject => "remote object",
        };
        f.write_str(name)
    }
}

/// An opaque native storage object plus the memory it borrows
///
/// The handle is valid from construction until [`TdfStorage::release`].
/// Dropping an unreleased handle releases it, so every exit path frees the
/// native object. Releasing twice is reported as
/// [`TdfClientError::AlreadyReleased`].
///
/// # Examples
///
/// ```no_run
/// # use opentdf_client::{LoopbackBackend, TdfStorage};
/// # use std::sync::Arc;
/// # fn main() -> Result<(), opentdf_client::TdfClientError> {
/// let backend = Arc::new(LoopbackBackend::new());
/// let mut storage = TdfStorage::string(&backend, "Sensitive data")?;
/// // ... hand `&storage` to a client operation ...
/// storage.release()?;
/// # Ok(())
/// # }
/// ```
pub struct TdfStorage<B: TdfBackend> {
    backend: Arc<B>,
    handle: Option<B::Storage>,
    kind: StorageKind,
    allocations: ForeignAllocations,
}

impl<B: TdfBackend> TdfStorage<B> {
    /// Bind a handle to a filesystem path
    pub fn file(backend: &Arc<B>, path: impl AsRef<Path>) -> Result<Self, TdfClientError> {
        const OP: &str = "TDFCreateTDFStorageFileType";
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| TdfClientError::invalid(OP, "path is not valid UTF-8"))?;

        let mut allocations = ForeignAllocations::new();
        let c_path = allocations.track_str(path_str, OP)?;
        let handle = backend
            .create_storage_file(c_path)
            .ok_or(TdfClientError::Construction {
                object: "file storage",
            })?;
        Ok(Self::assemble(backend, handle, StorageKind::File, allocations))
    }

    /// Copy a string into a native-readable buffer
    pub fn string(backend: &Arc<B>, data: &str) -> Result<Self, TdfClientError> {
        Self::buffer(backend, data.as_bytes().into(), StorageKind::StringBuffer)
    }

    /// Copy bytes into a native-readable buffer
    ///
    /// A zero-length buffer is valid and still passes a non-null pointer.
    pub fn bytes(backend: &Arc<B>, data: impl Into<Vec<u8>>) -> Result<Self, TdfClientError> {
        Self::buffer(backend, data.into().into_boxed_slice(), StorageKind::ByteBuffer)
    }

    /// Bind a handle to a remote object (S3-compatible URL)
    pub fn remote(
        backend: &Arc<B>,
        url: &str,
        access_key_id: &str,
        secret_key: &str,
        region: &str,
    ) -> Result<Self, TdfClientError> {
        const OP: &str = "TDFCreateTDFStorageS3Type";
        let c_url = ForeignAllocations::c_string(url, OP)?;
        let c_key = ForeignAllocations::c_string(access_key_id, OP)?;
        let c_secret = ForeignAllocations::c_string(secret_key, OP)?;
        let c_region = ForeignAllocations::c_string(region, OP)?;

        let handle = backend
            .create_storage_remote(&c_url, &c_key, &c_secret, &c_region)
            .ok_or(TdfClientError::Construction {
                object: "remote object storage",
            })?;

        let mut allocations = ForeignAllocations::new();
        for c in [c_url, c_key, c_secret, c_region] {
            allocations.adopt_str(c);
        }
        Ok(Self::assemble(backend, handle, StorageKind::RemoteObject, allocations))
    }

    fn buffer(backend: &Arc<B>, data: Box<[u8]>, kind: StorageKind) -> Result<Self, TdfClientError> {
        let handle = {
            let buf = ForeignBuffer::new(&data, "TDFCreateTDFStorageStringType")?;
            backend
                .create_storage_buffer(buf)
                .ok_or(TdfClientError::Construction {
                    object: "buffer storage",
                })?
        };

        let mut allocations = ForeignAllocations::new();
        allocations.adopt_bytes(data);
        Ok(Self::assemble(backend, handle, kind, allocations))
    }

    fn assemble(
        backend: &Arc<B>,
        handle: B::Storage,
        kind: StorageKind,
        allocations: ForeignAllocations,
    ) -> Self {
        debug!(backend = backend.name(), %kind, "created storage handle");
        Self {
            backend: Arc::clone(backend),
            handle: Some(handle),
            kind,
            allocations,
        }
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Allocations still owned by this handle
    pub fn pending_allocations(&self) -> usize {
        self.allocations.len()
    }

    /// Destroy the native handle, then free its allocations in order
    pub fn release(&mut self) -> Result<(), TdfClientError> {
        let handle = self.handle.take().ok_or(TdfClientError::AlreadyReleased {
            resource: "storage handle",
        })?;
        self.backend.destroy_storage(handle);
        let freed = self.allocations.drain();
        debug!(kind = %self.kind, freed, "released storage handle");
        Ok(())
    }

    pub(crate) fn native(&self) -> Result<&B::Storage, TdfClientError> {
        self.handle.as_ref().ok_or(TdfClientError::StorageReleased)
    }

    pub(crate) fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

impl<B: TdfBackend> fmt::Debug for TdfStorage<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TdfStorage")
            .field("backend", &self.backend.name())
            .field("kind", &self.kind)
            .field("released", &self.is_released())
            .field("pending_allocations", &self.allocations.len())
            .finish()
    }
}

impl<B: TdfBackend> Drop for TdfStorage<B> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackBackend;

    #[test]
    fn test_every_kind_releases_cleanly() {
        let backend = Arc::new(LoopbackBackend::new());
        let dir = tempfile::tempdir().unwrap();

        let mut handles = vec![
            TdfStorage::file(&backend, dir.path().join("in.txt")).unwrap(),
            TdfStorage::string(&backend, "hello").unwrap(),
            TdfStorage::bytes(&backend, vec![1u8, 2, 3]).unwrap(),
            TdfStorage::remote(&backend, "s3://bucket/key", "AKIA", "secret", "us-east-1").unwrap(),
        ];
        assert_eq!(backend.live_handles().storages, 4);

        let kinds: Vec<_> = handles.iter().map(|h| h.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                StorageKind::File,
                StorageKind::StringBuffer,
                StorageKind::ByteBuffer,
                StorageKind::RemoteObject
            ]
        );

        for handle in &mut handles {
            assert!(handle.pending_allocations() > 0);
            handle.release().unwrap();
            assert_eq!(handle.pending_allocations(), 0);
            assert!(handle.is_released());
        }
        assert!(backend.live_handles().is_empty());
    }

    #[test]
    fn test_double_release_is_rejected() {
        let backend = Arc::new(LoopbackBackend::new());
        let mut storage = TdfStorage::string(&backend, "x").unwrap();
        storage.release().unwrap();
        let err = storage.release().unwrap_err();
        assert!(matches!(err, TdfClientError::AlreadyReleased { .. }));
        assert!(matches!(storage.native(), Err(TdfClientError::StorageReleased)));
    }

    #[test]
    fn test_drop_releases_native_handle() {
        let backend = Arc::new(LoopbackBackend::new());
        {
            let _storage = TdfStorage::bytes(&backend, Vec::new()).unwrap();
            assert_eq!(backend.live_handles().storages, 1);
        }
        assert_eq!(backend.live_handles().storages, 0);
    }

    #[test]
    fn test_interior_nul_path_is_invalid() {
        let backend = Arc::new(LoopbackBackend::new());
        let err = TdfStorage::file(&backend, "bad\0path").unwrap_err();
        assert!(matches!(err, TdfClientError::InvalidParameters { .. }));
        assert!(backend.live_handles().is_empty());
    }
}
