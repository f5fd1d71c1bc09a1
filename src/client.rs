//! Client side of the protocol: onboarding files and challenging the remote.
//!
//! A file goes `unregistered → onboarded → verified*`. Each verification first
//! spends one precomputed `(nonce, digest)` pair, oldest first, and compares
//! the remote's answer against the digest recorded at onboarding time. Once a
//! file's pool is exhausted the client falls back to its rotation ring and
//! recomputes the expected digest from the retained local copy.
//!
//! Rotation nonces repeat, so a remote that replays an earlier answer for the
//! same nonce, or one that ignores the nonce altogether, is not reliably
//! detected on that path. There is no replenishment of precomputed pools.
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use flume::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::blob::{validate_id, BlobStore, DirBlobStore, MemoryBlobStore};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::keyed::{compare_digests, KeyedHasher};
use crate::nonce::{Nonce, NonceRing};
use crate::record::{
    FileRecord, JsonFileMetadataStore, MemoryMetadataStore, MetadataStore, RecordStore,
};
use crate::remote::Remote;

const METADATA_FILE: &str = "metadata.json";
const LOCAL_FILES_DIR: &str = "files";

/// Where the nonce of a challenge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMethod {
    /// A single-use precomputed entry; expected digest taken from the record.
    Precomputed,
    /// A repeating nonce from the rotation ring; expected digest recomputed
    /// from the local copy.
    Rotation,
}

/// Outcome of one verification round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub nonce: Nonce,
    pub method: ChallengeMethod,
    pub matched: bool,
}

/// Orchestrates onboarding and verification against a [`Remote`].
pub struct Client<R: Remote> {
    config: ClientConfig,
    hasher: KeyedHasher,
    ring: NonceRing,
    local: Box<dyn BlobStore>,
    records: RecordStore<Box<dyn MetadataStore>>,
    remote: Arc<R>,
}

impl<R: Remote> Client<R> {
    /// Build a client. Generates the rotation ring up front; a failing random
    /// source aborts construction.
    pub fn new(config: ClientConfig, remote: Arc<R>) -> Result<Self, Error> {
        config.validate()?;
        let hasher = KeyedHasher::new(config.algorithm, &config.key)?;
        let ring = NonceRing::new(config.rotation_size)?;

        let local: Box<dyn BlobStore>;
        let metadata: Box<dyn MetadataStore>;
        match &config.storage_dir {
            Some(dir) => {
                local = Box::new(DirBlobStore::open(dir.join(LOCAL_FILES_DIR))?);
                metadata = Box::new(JsonFileMetadataStore::new(dir.join(METADATA_FILE)));
            }
            None => {
                local = Box::new(MemoryBlobStore::new());
                metadata = Box::new(MemoryMetadataStore::new());
            }
        }
        let records = RecordStore::open(metadata, hasher.clone())?;

        Ok(Self {
            config,
            hasher,
            ring,
            local,
            records,
            remote,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn hasher(&self) -> &KeyedHasher {
        &self.hasher
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn records(&self) -> &RecordStore<Box<dyn MetadataStore>> {
        &self.records
    }

    /// Onboard the file at `path`; its file name becomes the identifier.
    pub fn onboard(&self, path: impl AsRef<Path>) -> Result<String, Error> {
        let path = path.as_ref();
        let id = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidIdentifier(path.display().to_string()))?
            .to_owned();
        let content = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        self.onboard_bytes(&id, &content)?;
        Ok(id)
    }

    /// Onboard in-memory content under `id`.
    ///
    /// Keeps a local copy, uploads the content unmodified, and records the
    /// onboarding digest together with a fresh precomputed pool.
    pub fn onboard_bytes(&self, id: &str, content: &[u8]) -> Result<FileRecord, Error> {
        validate_id(id)?;
        let nonce = self.ring.next();
        let digest = self.hasher.digest(&nonce, content);

        self.local.put(id, content)?;
        self.remote.store(id, content)?;
        let record = self.records.create_record(
            id,
            id,
            content,
            nonce,
            digest,
            self.config.precompute_count,
        )?;
        tracing::info!(
            %id,
            bytes = content.len(),
            precomputed = record.precomputed.len(),
            "file onboarded"
        );
        Ok(record)
    }

    /// Challenge the remote for `id` and compare its answer.
    ///
    /// A mismatch is reported through [`Verification::matched`], not as an
    /// error. The precomputed entry is consumed even if the remote call fails.
    pub fn verify(&self, id: &str) -> Result<Verification, Error> {
        if !self.records.contains(id) {
            return Err(Error::UnknownRecord(id.to_owned()));
        }

        let verification = match self.records.take_unused_precomputed(id)? {
            Some((nonce, expected)) => {
                let response = self.remote.challenge(id, &nonce)?;
                Verification {
                    nonce,
                    method: ChallengeMethod::Precomputed,
                    matched: compare_digests(expected.as_bytes(), response.as_bytes()),
                }
            }
            None => {
                tracing::warn!(%id, "no precomputed hashes left, using rotation nonce");
                let record = self
                    .records
                    .get(id)
                    .ok_or_else(|| Error::UnknownRecord(id.to_owned()))?;
                let nonce = self.rotation_nonce(&record.onboarding_nonce);
                let response = self.remote.challenge(id, &nonce)?;
                let content = self.local_copy(&record)?;
                let expected = self.hasher.digest(&nonce, &content);
                Verification {
                    nonce,
                    method: ChallengeMethod::Rotation,
                    matched: compare_digests(expected.as_bytes(), response.as_bytes()),
                }
            }
        };

        if verification.matched {
            tracing::info!(%id, method = ?verification.method, "integrity verified");
        } else {
            tracing::warn!(%id, method = ?verification.method, nonce = %verification.nonce, "integrity check failed");
        }
        Ok(verification)
    }

    /// Shorthand for `verify(id)?.matched`.
    pub fn is_intact(&self, id: &str) -> Result<bool, Error> {
        Ok(self.verify(id)?.matched)
    }

    /// Verify several files on `workers` threads.
    ///
    /// Results come back in the order of `ids`.
    pub fn verify_all(
        &self,
        ids: &[String],
        workers: usize,
    ) -> Vec<(String, Result<Verification, Error>)> {
        let workers = workers.clamp(1, ids.len().max(1));
        let (job_tx, job_rx): (Sender<(usize, &str)>, Receiver<(usize, &str)>) =
            flume::unbounded();
        let (res_tx, res_rx) = flume::unbounded();

        for (idx, id) in ids.iter().enumerate() {
            // Receiver is alive until the scope below ends.
            let _ = job_tx.send((idx, id.as_str()));
        }
        drop(job_tx);

        thread::scope(|scope| {
            for _ in 0..workers {
                let jobs = job_rx.clone();
                let results = res_tx.clone();
                scope.spawn(move || {
                    for (idx, id) in jobs.iter() {
                        if results.send((idx, self.verify(id))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(res_tx);

        let mut out: Vec<(usize, Result<Verification, Error>)> = res_rx.iter().collect();
        out.sort_by_key(|(idx, _)| *idx);
        out.into_iter()
            .map(|(idx, result)| (ids[idx].clone(), result))
            .collect()
    }

    /// Check the retained local copy against the digest taken at onboarding.
    pub fn audit(&self, id: &str) -> Result<bool, Error> {
        let record = self
            .records
            .get(id)
            .ok_or_else(|| Error::UnknownRecord(id.to_owned()))?;
        let content = self.local_copy(&record)?;
        let digest = self.hasher.digest(&record.onboarding_nonce, &content);
        Ok(compare_digests(
            digest.as_bytes(),
            record.onboarding_digest.as_bytes(),
        ))
    }

    pub fn record(&self, id: &str) -> Option<FileRecord> {
        self.records.get(id)
    }

    /// Unused precomputed entries left for `id`.
    pub fn remaining_precomputed(&self, id: &str) -> Result<usize, Error> {
        self.records
            .remaining(id)
            .ok_or_else(|| Error::UnknownRecord(id.to_owned()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.ids()
    }

    /// Drop the record and local copy for `id`. The remote copy is untouched.
    pub fn forget(&self, id: &str) -> Result<(), Error> {
        let record = self
            .records
            .remove(id)?
            .ok_or_else(|| Error::UnknownRecord(id.to_owned()))?;
        self.local.remove(&record.local_reference)?;
        tracing::info!(%id, "record removed");
        Ok(())
    }

    /// Next ring nonce, skipping the record's onboarding nonce unless the ring
    /// holds nothing else.
    fn rotation_nonce(&self, onboarding_nonce: &Nonce) -> Nonce {
        let mut nonce = self.ring.next();
        for _ in 1..self.ring.len() {
            if nonce != *onboarding_nonce {
                break;
            }
            nonce = self.ring.next();
        }
        nonce
    }

    fn local_copy(&self, record: &FileRecord) -> Result<Vec<u8>, Error> {
        self.local
            .get(&record.local_reference)?
            .ok_or_else(|| Error::NotFound(record.local_reference.clone()))
    }
}
