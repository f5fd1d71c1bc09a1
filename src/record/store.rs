use std::sync::Mutex;

use crate::error::Error;
use crate::keyed::{Digest, KeyedHasher};
use crate::nonce::Nonce;
use crate::record::metadata::MetadataStore;
use crate::record::types::{FileRecord, PrecomputedEntry, RecordMap};

/// Client-side records plus their precomputed challenge pools.
///
/// Every mutation is persisted before the internal lock is released, so two
/// concurrent callers can never observe or consume the same unused entry.
pub struct RecordStore<M: MetadataStore> {
    metadata: M,
    hasher: KeyedHasher,
    records: Mutex<RecordMap>,
}

impl<M: MetadataStore> RecordStore<M> {
    /// Load existing records from `metadata`.
    pub fn open(metadata: M, hasher: KeyedHasher) -> Result<Self, Error> {
        let records = metadata.load()?;
        tracing::debug!(records = records.len(), "record store opened");
        Ok(Self {
            metadata,
            hasher,
            records: Mutex::new(records),
        })
    }

    /// Create (or replace) the record for `id` with `precompute_count` fresh
    /// precomputed entries over `content`.
    pub fn create_record(
        &self,
        id: &str,
        local_reference: &str,
        content: &[u8],
        onboarding_nonce: Nonce,
        onboarding_digest: Digest,
        precompute_count: usize,
    ) -> Result<FileRecord, Error> {
        let mut precomputed: Vec<PrecomputedEntry> = Vec::with_capacity(precompute_count);
        while precomputed.len() < precompute_count {
            let nonce = Nonce::generate()?;
            if nonce == onboarding_nonce || precomputed.iter().any(|e| e.nonce == nonce) {
                continue;
            }
            precomputed.push(PrecomputedEntry {
                nonce,
                digest: self.hasher.digest(&nonce, content),
                used: false,
            });
        }

        let record = FileRecord {
            id: id.to_owned(),
            local_reference: local_reference.to_owned(),
            onboarding_nonce,
            onboarding_digest,
            precomputed,
        };

        let mut guard = self.records.lock().expect("record lock poisoned");
        let previous = guard.insert(id.to_owned(), record.clone());
        if let Err(err) = self.metadata.save(&guard) {
            match previous {
                Some(prev) => guard.insert(id.to_owned(), prev),
                None => guard.remove(id),
            };
            return Err(err);
        }
        if previous.is_some() {
            tracing::info!(%id, "replaced existing record");
        }
        Ok(record)
    }

    /// Hand out the oldest unused precomputed entry for `id`, marking it used.
    ///
    /// `Ok(None)` means there is no record or its pool is exhausted; callers
    /// fall back to rotation nonces.
    pub fn take_unused_precomputed(&self, id: &str) -> Result<Option<(Nonce, Digest)>, Error> {
        let mut guard = self.records.lock().expect("record lock poisoned");
        let Some(record) = guard.get_mut(id) else {
            return Ok(None);
        };
        let Some((nonce, digest)) = record.take_first_unused() else {
            return Ok(None);
        };
        let remaining = record.remaining();

        if let Err(err) = self.metadata.save(&guard) {
            // Not persisted, so the entry was never handed out.
            if let Some(entry) = guard
                .get_mut(id)
                .and_then(|r| r.precomputed.iter_mut().find(|e| e.nonce == nonce))
            {
                entry.used = false;
            }
            return Err(err);
        }
        tracing::debug!(%id, %nonce, remaining, "consumed precomputed entry");
        Ok(Some((nonce, digest)))
    }

    pub fn get(&self, id: &str) -> Option<FileRecord> {
        self.records
            .lock()
            .expect("record lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records
            .lock()
            .expect("record lock poisoned")
            .contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.records
            .lock()
            .expect("record lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Unused precomputed entries left for `id`.
    pub fn remaining(&self, id: &str) -> Option<usize> {
        self.records
            .lock()
            .expect("record lock poisoned")
            .get(id)
            .map(FileRecord::remaining)
    }

    pub fn used_nonces(&self, id: &str) -> Option<Vec<Nonce>> {
        self.records
            .lock()
            .expect("record lock poisoned")
            .get(id)
            .map(FileRecord::used_nonces)
    }

    /// Delete the record for `id`; returns the removed record.
    pub fn remove(&self, id: &str) -> Result<Option<FileRecord>, Error> {
        let mut guard = self.records.lock().expect("record lock poisoned");
        let Some(removed) = guard.remove(id) else {
            return Ok(None);
        };
        if let Err(err) = self.metadata.save(&guard) {
            guard.insert(id.to_owned(), removed);
            return Err(err);
        }
        Ok(Some(removed))
    }
}
