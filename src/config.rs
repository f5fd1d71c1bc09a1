//! Client configuration.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::keyed::{DigestAlgorithm, DEMO_KEY};

pub const DEFAULT_ROTATION_SIZE: usize = 5;
pub const DEFAULT_PRECOMPUTE_COUNT: usize = 10;

/// Parameters shared by everything a [`crate::Client`] owns.
///
/// `key` and `algorithm` must match the remote store's. With `storage_dir`
/// set, local copies and `metadata.json` are kept there; otherwise both live
/// in memory for the lifetime of the client.
#[derive(Builder, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct ClientConfig {
    #[builder(default = "DEMO_KEY.to_vec()")]
    #[serde(with = "hex::serde")]
    pub key: Vec<u8>,
    #[builder(default)]
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
    /// Number of challenge nonces served round-robin.
    #[builder(default = "DEFAULT_ROTATION_SIZE")]
    #[serde(default = "default_rotation_size")]
    pub rotation_size: usize,
    /// Precomputed (nonce, digest) pairs generated per onboarded file.
    #[builder(default = "DEFAULT_PRECOMPUTE_COUNT")]
    #[serde(default = "default_precompute_count")]
    pub precompute_count: usize,
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

fn default_rotation_size() -> usize {
    DEFAULT_ROTATION_SIZE
}

fn default_precompute_count() -> usize {
    DEFAULT_PRECOMPUTE_COUNT
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            key: DEMO_KEY.to_vec(),
            algorithm: DigestAlgorithm::default(),
            rotation_size: DEFAULT_ROTATION_SIZE,
            precompute_count: DEFAULT_PRECOMPUTE_COUNT,
            storage_dir: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("rotation_size", &self.rotation_size)
            .field("precompute_count", &self.precompute_count)
            .field("storage_dir", &self.storage_dir)
            .finish()
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.key.is_empty() {
            return Err(Error::InvalidConfig("key must not be empty".into()));
        }
        if self.rotation_size == 0 {
            return Err(Error::InvalidConfig("rotation_size must be >= 1".into()));
        }
        Ok(())
    }

    /// Read a JSON config file; the key is hex encoded.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let bytes = fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }
}

impl ClientConfigBuilder {
    pub fn build_validated(self) -> Result<ClientConfig, Error> {
        let config = self
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
