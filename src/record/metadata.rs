use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Error;
use crate::record::types::{parse_document, render_document, RecordMap};

/// Durable home of the client's record map.
pub trait MetadataStore: Send + Sync {
    fn load(&self) -> Result<RecordMap, Error>;
    fn save(&self, records: &RecordMap) -> Result<(), Error>;
}

impl<T: MetadataStore + ?Sized> MetadataStore for Box<T> {
    fn load(&self) -> Result<RecordMap, Error> {
        (**self).load()
    }

    fn save(&self, records: &RecordMap) -> Result<(), Error> {
        (**self).save(records)
    }
}

/// Keeps the last saved map in memory.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: Mutex<RecordMap>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load(&self) -> Result<RecordMap, Error> {
        Ok(self.inner.lock().expect("metadata lock poisoned").clone())
    }

    fn save(&self, records: &RecordMap) -> Result<(), Error> {
        *self.inner.lock().expect("metadata lock poisoned") = records.clone();
        Ok(())
    }
}

/// A single pretty-printed JSON document on disk.
///
/// Saves go through a sibling temp file and a rename so a crash never leaves
/// a half-written document behind.
#[derive(Debug, Clone)]
pub struct JsonFileMetadataStore {
    path: PathBuf,
}

impl JsonFileMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataStore for JsonFileMetadataStore {
    fn load(&self) -> Result<RecordMap, Error> {
        match fs::read(&self.path) {
            Ok(bytes) => parse_document(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RecordMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, records: &RecordMap) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, render_document(records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
