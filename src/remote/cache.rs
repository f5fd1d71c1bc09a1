use moka::sync::Cache;

use crate::keyed::Digest;
use crate::nonce::Nonce;

/// Error type for challenge cache operations.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeCacheError {
    #[error("challenge cache operation failed: {0}")]
    Other(String),
}

/// Last challenge answered for a file, as seen by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedResponse {
    pub nonce: Nonce,
    pub digest: Digest,
}

/// Per-file memory of the most recent `(nonce, response)` pair.
pub trait ChallengeCache: Send + Sync {
    fn last(&self, id: &str) -> Result<Option<CachedResponse>, ChallengeCacheError>;

    fn record(&self, id: &str, response: CachedResponse) -> Result<(), ChallengeCacheError>;

    fn forget(&self, id: &str) -> Result<(), ChallengeCacheError>;
}

/// In-memory challenge cache backed by `moka::sync::Cache`.
#[derive(Debug, Clone)]
pub struct MokaChallengeCache {
    inner: Cache<String, CachedResponse>,
}

impl MokaChallengeCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_capacity).build(),
        }
    }
}

/// Holds up to 10,000 files. Beyond that moka evicts entries silently, and a
/// replaying store falls back to honest answers for the evicted files; size
/// the cache with [`MokaChallengeCache::new`] to cover every tracked file.
impl Default for MokaChallengeCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl ChallengeCache for MokaChallengeCache {
    fn last(&self, id: &str) -> Result<Option<CachedResponse>, ChallengeCacheError> {
        Ok(self.inner.get(id))
    }

    fn record(&self, id: &str, response: CachedResponse) -> Result<(), ChallengeCacheError> {
        self.inner.insert(id.to_owned(), response);
        Ok(())
    }

    fn forget(&self, id: &str) -> Result<(), ChallengeCacheError> {
        self.inner.invalidate(id);
        Ok(())
    }
}
