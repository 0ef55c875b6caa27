//! In-memory backend.
//!
//! Stores files in process memory, keyed by repository name. Useful for tests
//! and for exercising the factory contract without any I/O.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, BackendError, FileInfo, FileType, Handle};
use crate::limiter::Limiter;
use crate::location::GenericFactory;

/// Scheme served by this backend.
pub const SCHEME: &str = "mem";

const DEFAULT_NAME: &str = "default";

/// Parsed `mem:` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemConfig {
    pub name: String,
}

impl MemConfig {
    /// Parse `mem:` or `mem:<name>`; an empty name selects `default`.
    pub fn parse(s: &str) -> Result<Self, BackendError> {
        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| BackendError::InvalidConfig(format!("not a mem location: {:?}", s)))?;

        if rest.contains('/') {
            return Err(BackendError::InvalidConfig(format!(
                "mem repository name must not contain '/': {:?}",
                rest
            )));
        }

        let name = if rest.is_empty() { DEFAULT_NAME } else { rest };
        Ok(Self {
            name: name.to_string(),
        })
    }
}

type Files = Arc<Mutex<BTreeMap<Handle, Bytes>>>;

/// Named repositories shared by every backend built from one factory.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    repos: Arc<Mutex<HashMap<String, Files>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty repository; fails if the name is taken.
    pub fn create(
        &self,
        config: MemConfig,
        limiter: Arc<dyn Limiter>,
    ) -> Result<MemoryBackend, BackendError> {
        let mut repos = self.repos.lock().expect("mem store mutex poisoned");
        if repos.contains_key(&config.name) {
            return Err(BackendError::AlreadyExists(location(&config.name)));
        }
        let files = Files::default();
        repos.insert(config.name.clone(), files.clone());
        tracing::debug!(name = %config.name, "Created mem repository");
        Ok(MemoryBackend {
            name: config.name,
            files,
            limiter,
        })
    }

    /// Open an existing repository.
    pub fn open(
        &self,
        config: MemConfig,
        limiter: Arc<dyn Limiter>,
    ) -> Result<MemoryBackend, BackendError> {
        let repos = self.repos.lock().expect("mem store mutex poisoned");
        let files = repos
            .get(&config.name)
            .cloned()
            .ok_or_else(|| BackendError::NotExist(location(&config.name)))?;
        Ok(MemoryBackend {
            name: config.name,
            files,
            limiter,
        })
    }
}

/// Factory for `mem:` locations over a fresh [`MemStore`].
pub fn factory() -> GenericFactory<MemConfig, MemoryBackend> {
    let store = MemStore::new();
    let open_store = store.clone();
    GenericFactory::limited(
        MemConfig::parse,
        move |config, limiter| {
            let result = store.create(config, limiter);
            async move { result }
        },
        move |config, limiter| {
            let result = open_store.open(config, limiter);
            async move { result }
        },
    )
}

fn location(name: &str) -> String {
    format!("{}:{}", SCHEME, name)
}

/// Backend holding its files in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    files: Files,
    limiter: Arc<dyn Limiter>,
}

impl MemoryBackend {
    fn files(&self) -> std::sync::MutexGuard<'_, BTreeMap<Handle, Bytes>> {
        self.files.lock().expect("mem backend mutex poisoned")
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn location(&self) -> String {
        location(&self.name)
    }

    fn connections(&self) -> usize {
        2
    }

    async fn save(&self, handle: &Handle, data: Bytes) -> Result<(), BackendError> {
        self.limiter.upload(data.len()).await;

        let mut files = self.files();
        if files.contains_key(handle) {
            return Err(BackendError::AlreadyExists(handle.to_string()));
        }
        files.insert(handle.clone(), data);
        Ok(())
    }

    async fn load(
        &self,
        handle: &Handle,
        length: usize,
        offset: u64,
    ) -> Result<Bytes, BackendError> {
        let data = {
            let files = self.files();
            let data = files
                .get(handle)
                .ok_or_else(|| BackendError::NotExist(handle.to_string()))?;

            let size = data.len() as u64;
            if offset > size {
                return Err(BackendError::OutOfRange {
                    handle: handle.clone(),
                    offset,
                    size,
                });
            }

            let start = offset as usize;
            let end = if length == 0 {
                data.len()
            } else {
                start.saturating_add(length).min(data.len())
            };
            data.slice(start..end)
        };

        self.limiter.download(data.len()).await;
        Ok(data)
    }

    async fn stat(&self, handle: &Handle) -> Result<FileInfo, BackendError> {
        let files = self.files();
        let data = files
            .get(handle)
            .ok_or_else(|| BackendError::NotExist(handle.to_string()))?;
        Ok(FileInfo {
            name: handle.name.clone(),
            size: data.len() as u64,
        })
    }

    async fn remove(&self, handle: &Handle) -> Result<(), BackendError> {
        match self.files().remove(handle) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotExist(handle.to_string())),
        }
    }

    async fn list(&self, kind: FileType) -> Result<Vec<FileInfo>, BackendError> {
        // BTreeMap order is (kind, name), so each kind comes out sorted.
        let files = self.files();
        Ok(files
            .iter()
            .filter(|(handle, _)| handle.kind == kind)
            .map(|(handle, data)| FileInfo {
                name: handle.name.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    async fn delete(&self) -> Result<(), BackendError> {
        self.files().clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
