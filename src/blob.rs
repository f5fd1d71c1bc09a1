//! Content blob storage shared by the client's local copies and the remote store.
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::Error;

/// Byte blobs addressed by file identifier.
pub trait BlobStore: Send + Sync {
    /// Store `content` under `id`, replacing any previous blob.
    fn put(&self, id: &str, content: &[u8]) -> Result<(), Error>;

    /// Fetch the blob stored under `id`, if any.
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Append `suffix` to an existing blob. Fails with `NotFound` when absent.
    fn append(&self, id: &str, suffix: &[u8]) -> Result<(), Error>;

    /// Remove the blob; returns whether one existed.
    fn remove(&self, id: &str) -> Result<bool, Error>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    inner: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, id: &str, content: &[u8]) -> Result<(), Error> {
        let mut guard = self.inner.write().expect("blob lock poisoned");
        guard.insert(id.to_owned(), content.to_vec());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, Error> {
        let guard = self.inner.read().expect("blob lock poisoned");
        Ok(guard.get(id).cloned())
    }

    fn append(&self, id: &str, suffix: &[u8]) -> Result<(), Error> {
        let mut guard = self.inner.write().expect("blob lock poisoned");
        match guard.get_mut(id) {
            Some(blob) => {
                blob.extend_from_slice(suffix);
                Ok(())
            }
            None => Err(Error::NotFound(id.to_owned())),
        }
    }

    fn remove(&self, id: &str) -> Result<bool, Error> {
        let mut guard = self.inner.write().expect("blob lock poisoned");
        Ok(guard.remove(id).is_some())
    }
}

/// One file per identifier inside a directory.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    dir: PathBuf,
}

impl DirBlobStore {
    /// Open (creating if needed) a blob directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, Error> {
        validate_id(id)?;
        Ok(self.dir.join(id))
    }
}

/// Identifiers become file names, so they must be a single plain path component.
pub(crate) fn validate_id(id: &str) -> Result<(), Error> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
    {
        return Err(Error::InvalidIdentifier(id.to_owned()));
    }
    Ok(())
}

impl BlobStore for DirBlobStore {
    fn put(&self, id: &str, content: &[u8]) -> Result<(), Error> {
        let path = self.path_for(id)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, Error> {
        let path = self.path_for(id)?;
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn append(&self, id: &str, suffix: &[u8]) -> Result<(), Error> {
        let path = self.path_for(id)?;
        let mut file = match fs::OpenOptions::new().append(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(id.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(suffix)?;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<bool, Error> {
        let path = self.path_for(id)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
