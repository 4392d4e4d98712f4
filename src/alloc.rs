//! Ownership of memory handed across the foreign-function boundary
//!
//! Every C string or byte buffer passed into the native library is owned by
//! the session or storage handle that created it and lives in a
//! [`ForeignAllocations`] registry until that owner is released.

use crate::error::TdfClientError;
use std::ffi::{CStr, CString};
use std::os::raw::c_uchar;

/// Pointed at by zero-length buffers so the native side never sees null
static EMPTY_BUFFER: [u8; 1] = [0];

/// A byte view marshaled for a native `(const unsigned char*, unsigned int)` pair
#[derive(Debug, Clone, Copy)]
pub struct ForeignBuffer<'a> {
    data: &'a [u8],
    len: u32,
}

impl<'a> ForeignBuffer<'a> {
    /// Marshal `data`, rejecting buffers the native length type cannot address
    pub fn new(data: &'a [u8], operation: &'static str) -> Result<Self, TdfClientError> {
        let len = u32::try_from(data.len()).map_err(|_| {
            TdfClientError::invalid(
                operation,
                format!("buffer of {} bytes exceeds the native length limit", data.len()),
            )
        })?;
        Ok(Self { data, len })
    }

    /// A zero-length buffer
    pub fn empty() -> Self {
        Self { data: &[], len: 0 }
    }

    /// Non-null for every buffer, including empty ones
    pub fn as_ptr(&self) -> *const c_uchar {
        if self.data.is_empty() {
            EMPTY_BUFFER.as_ptr()
        } else {
            self.data.as_ptr()
        }
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }
}

#[derive(Debug)]
enum ForeignAllocation {
    Str(CString),
    Bytes(Box<[u8]>),
}

/// Ordered registry of allocations awaiting release
#[derive(Debug, Default)]
pub struct ForeignAllocations {
    entries: Vec<ForeignAllocation>,
}

impl ForeignAllocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert `value` to a C string without tracking it yet
    pub fn c_string(value: &str, operation: &'static str) -> Result<CString, TdfClientError> {
        CString::new(value)
            .map_err(|e| TdfClientError::invalid(operation, format!("interior NUL at byte {}", e.nul_position())))
    }

    /// Track a C string that must outlive the current native object
    pub fn track_str(&mut self, value: &str, operation: &'static str) -> Result<&CStr, TdfClientError> {
        let c = Self::c_string(value, operation)?;
        self.entries.push(ForeignAllocation::Str(c));
        match self.entries.last() {
            Some(ForeignAllocation::Str(c)) => Ok(c.as_c_str()),
            _ => Err(TdfClientError::invalid(operation, "string allocation was not recorded")),
        }
    }

    /// Take ownership of an already built C string
    pub fn adopt_str(&mut self, value: CString) {
        self.entries.push(ForeignAllocation::Str(value));
    }

    /// Take ownership of a byte buffer
    pub fn adopt_bytes(&mut self, value: impl Into<Box<[u8]>>) {
        self.entries.push(ForeignAllocation::Bytes(value.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every allocation in registration order, returning how many
    pub fn drain(&mut self) -> usize {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            drop(entry);
        }
        count
    }
}
