// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Byte-oriented file stores.
//!
//! The servers only see the narrow [`FileStore`] contract. [`LocalStorage`]
//! keeps files in one flat directory; [`MemoryStorage`] keeps them in a map
//! and backs in-process runs and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StorageError;
use crate::types::FileName;

/// Flat file store: list, upload, download.
pub trait FileStore: Send + Sync {
    /// Names of the stored files, sorted.
    fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Store `data` under `name`, replacing any previous content.
    fn upload(&self, name: &FileName, data: &[u8]) -> Result<(), StorageError>;

    /// Read back the content stored under `name`.
    fn download(&self, name: &FileName) -> Result<Vec<u8>, StorageError>;
}

/// Directory-backed store.
#[derive(Debug)]
pub struct LocalStorage {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl LocalStorage {
    /// Open a store rooted at `base_dir`, creating the directory if needed.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_dir = base_dir.into();
        ensure_dir(&base_dir)?;
        Ok(Self {
            base_dir,
            lock: RwLock::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(dir).map_err(|source| StorageError::Io {
        context: format!("creating directory {}", dir.display()),
        source,
    })
}

impl FileStore for LocalStorage {
    fn list(&self) -> Result<Vec<String>, StorageError> {
        let _guard = self.lock.read();

        let entries = std::fs::read_dir(&self.base_dir).map_err(|source| StorageError::Io {
            context: format!("reading directory {}", self.base_dir.display()),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                context: "reading directory entry".to_string(),
                source,
            })?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    fn upload(&self, name: &FileName, data: &[u8]) -> Result<(), StorageError> {
        let _guard = self.lock.write();

        // The directory may have been removed underneath us
        ensure_dir(&self.base_dir)?;

        let path = self.base_dir.join(name.as_str());
        std::fs::write(&path, data).map_err(|source| StorageError::Io {
            context: format!("writing {}", path.display()),
            source,
        })
    }

    fn download(&self, name: &FileName) -> Result<Vec<u8>, StorageError> {
        let _guard = self.lock.read();

        let path = self.base_dir.join(name.as_str());
        match std::fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                name: name.to_string(),
            }),
            Err(source) => Err(StorageError::Io {
                context: format!("reading {}", path.display()),
                source,
            }),
        }
    }
}

/// In-memory store shared through cheap clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }
}

impl FileStore for MemoryStorage {
    fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn upload(&self, name: &FileName, data: &[u8]) -> Result<(), StorageError> {
        self.files.write().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn download(&self, name: &FileName) -> Result<Vec<u8>, StorageError> {
        self.files
            .read()
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                name: name.to_string(),
            })
    }
}
