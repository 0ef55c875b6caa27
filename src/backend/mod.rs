//! Backend abstraction.
//!
//! # Responsibilities
//! - Define the storage contract every backend plugin produces
//! - Name stored files (type + name handles)
//! - Classify backend errors the repository layer reacts to
//!
//! # Design Decisions
//! - The contract is object-safe; factories hand out `Box<dyn Backend>`
//! - Remote protocols live in their own plugins; this crate ships only the
//!   in-memory backend

pub mod mem;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use crate::transport::BoxError;

/// Kind of file stored in a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileType {
    Data,
    Key,
    Lock,
    Snapshot,
    Index,
    Config,
}

impl FileType {
    /// Directory-style name used by path-based backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Data => "data",
            FileType::Key => "keys",
            FileType::Lock => "locks",
            FileType::Snapshot => "snapshots",
            FileType::Index => "index",
            FileType::Config => "config",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a file in a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub kind: FileType,
    pub name: String,
}

impl Handle {
    pub fn new(kind: FileType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == FileType::Config {
            return f.write_str("config");
        }
        write!(f, "<{}/{}>", self.kind, self.name)
    }
}

/// Name and size of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
}

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The file, or the whole backend, does not exist.
    #[error("{0} does not exist")]
    NotExist(String),

    /// The file, or the whole backend, already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The backend location string could not be parsed.
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),

    /// A ranged read started beyond the end of the file.
    #[error("offset {offset} out of range for {handle} of size {size}")]
    OutOfRange {
        handle: Handle,
        offset: u64,
        size: u64,
    },

    /// The transport failed; stalls surface here as `WatchdogError`.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

impl BackendError {
    /// Returns true if the error reports a missing file or backend.
    pub fn is_not_exist(&self) -> bool {
        matches!(self, BackendError::NotExist(_))
    }
}

/// Storage contract implemented by every backend.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Location string of this backend, with credentials already stripped.
    fn location(&self) -> String;

    /// Number of concurrent operations this backend should be given.
    fn connections(&self) -> usize;

    /// Store `data` under `handle`. Existing files are never overwritten.
    async fn save(&self, handle: &Handle, data: Bytes) -> Result<(), BackendError>;

    /// Read `length` bytes at `offset`; a length of zero reads to the end.
    async fn load(&self, handle: &Handle, length: usize, offset: u64)
        -> Result<Bytes, BackendError>;

    async fn stat(&self, handle: &Handle) -> Result<FileInfo, BackendError>;

    async fn remove(&self, handle: &Handle) -> Result<(), BackendError>;

    /// List all files of one kind, sorted by name.
    async fn list(&self, kind: FileType) -> Result<Vec<FileInfo>, BackendError>;

    /// Remove every file in the backend.
    async fn delete(&self) -> Result<(), BackendError>;

    /// Release resources held by the backend.
    async fn close(&self) -> Result<(), BackendError>;
}
