use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::keyed::Digest;
use crate::nonce::Nonce;

/// Records keyed by file identifier.
pub type RecordMap = BTreeMap<String, FileRecord>;

/// A precomputed challenge answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecomputedEntry {
    pub nonce: Nonce,
    pub digest: Digest,
    pub used: bool,
}

/// Client-side state for one onboarded file.
///
/// `precomputed` is kept in generation order; entries are consumed front to
/// back and a used entry is never handed out again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub local_reference: String,
    pub onboarding_nonce: Nonce,
    pub onboarding_digest: Digest,
    pub precomputed: Vec<PrecomputedEntry>,
}

impl FileRecord {
    /// Number of entries still available for challenges.
    pub fn remaining(&self) -> usize {
        self.precomputed.iter().filter(|e| !e.used).count()
    }

    /// Consumed nonces in consumption order.
    pub fn used_nonces(&self) -> Vec<Nonce> {
        self.precomputed
            .iter()
            .filter(|e| e.used)
            .map(|e| e.nonce)
            .collect()
    }

    /// Mark the oldest unused entry as used and return it.
    pub(crate) fn take_first_unused(&mut self) -> Option<(Nonce, Digest)> {
        let entry = self.precomputed.iter_mut().find(|e| !e.used)?;
        entry.used = true;
        Some((entry.nonce, entry.digest))
    }

    pub(crate) fn to_stored(&self) -> StoredRecord {
        StoredRecord {
            local_reference: self.local_reference.clone(),
            onboarding_nonce: self.onboarding_nonce,
            onboarding_digest: self.onboarding_digest,
            precomputed: self
                .precomputed
                .iter()
                .map(|e| (e.nonce, e.digest))
                .collect(),
            used_hashes: self.used_nonces(),
        }
    }

    /// Rebuild a record from its persisted shape.
    ///
    /// `used_hashes` entries that do not name a precomputed nonce, and
    /// duplicates, are dropped.
    pub(crate) fn from_stored(id: String, stored: StoredRecord) -> Self {
        let known: HashSet<Nonce> = stored.precomputed.iter().map(|(n, _)| *n).collect();
        let mut used = HashSet::with_capacity(stored.used_hashes.len());
        for nonce in &stored.used_hashes {
            if !known.contains(nonce) {
                tracing::warn!(%id, %nonce, "dropping used hash missing from precomputed set");
                continue;
            }
            if !used.insert(*nonce) {
                tracing::warn!(%id, %nonce, "dropping duplicate used hash");
            }
        }
        let precomputed = stored
            .precomputed
            .into_iter()
            .map(|(nonce, digest)| PrecomputedEntry {
                nonce,
                digest,
                used: used.contains(&nonce),
            })
            .collect();
        Self {
            id,
            local_reference: stored.local_reference,
            onboarding_nonce: stored.onboarding_nonce,
            onboarding_digest: stored.onboarding_digest,
            precomputed,
        }
    }
}

/// Persisted shape of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub local_reference: String,
    pub onboarding_nonce: Nonce,
    pub onboarding_digest: Digest,
    #[serde(with = "ordered_pairs")]
    pub precomputed: Vec<(Nonce, Digest)>,
    #[serde(default)]
    pub used_hashes: Vec<Nonce>,
}

pub(crate) fn to_document(records: &RecordMap) -> BTreeMap<String, StoredRecord> {
    records
        .iter()
        .map(|(id, record)| (id.clone(), record.to_stored()))
        .collect()
}

pub(crate) fn from_document(document: BTreeMap<String, StoredRecord>) -> RecordMap {
    document
        .into_iter()
        .map(|(id, stored)| (id.clone(), FileRecord::from_stored(id, stored)))
        .collect()
}

/// Parse a metadata document, rejecting malformed hex and repairing stray
/// `used_hashes` entries.
pub fn parse_document(json: &[u8]) -> Result<RecordMap, Error> {
    let document: BTreeMap<String, StoredRecord> = serde_json::from_slice(json)
        .map_err(|e| Error::CorruptMetadata(e.to_string()))?;
    Ok(from_document(document))
}

pub fn render_document(records: &RecordMap) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec_pretty(&to_document(records))?)
}

/// JSON object `{nonce_hex: digest_hex}` whose document order is the entry order.
mod ordered_pairs {
    use super::*;

    pub fn serialize<S: Serializer>(
        pairs: &[(Nonce, Digest)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(pairs.iter().map(|(n, d)| (n, d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(Nonce, Digest)>, D::Error> {
        deserializer.deserialize_map(PairsVisitor)
    }

    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(Nonce, Digest)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of hex nonces to hex digests")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            let mut seen = HashSet::new();
            while let Some((nonce, digest)) = map.next_entry::<Nonce, Digest>()? {
                if !seen.insert(nonce) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate precomputed nonce {nonce}"
                    )));
                }
                pairs.push((nonce, digest));
            }
            Ok(pairs)
        }
    }
}
