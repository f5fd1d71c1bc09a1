use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::blob::{BlobStore, MemoryBlobStore};
use crate::error::Error;
use crate::keyed::{Digest, KeyedHasher};
use crate::nonce::Nonce;
use crate::remote::cache::{CachedResponse, ChallengeCache, MokaChallengeCache};

/// Capability the client needs from whoever holds its files.
pub trait Remote: Send + Sync {
    /// Persist `content` verbatim under `id`, replacing any previous blob.
    fn store(&self, id: &str, content: &[u8]) -> Result<(), Error>;

    /// Prove possession of `id` by digesting it with `nonce`.
    fn challenge(&self, id: &str, nonce: &Nonce) -> Result<Digest, Error>;
}

/// How a [`RemoteStore`] answers challenges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderMode {
    /// Recompute the digest over the stored content with the given nonce.
    #[default]
    Honest,
    /// Replay the last cached response and ignore the new nonce. Models a
    /// compromised store that tampered with content after answering once.
    Replay,
}

/// Store-side holder of content blobs.
pub struct RemoteStore<B: BlobStore = MemoryBlobStore, C: ChallengeCache = MokaChallengeCache> {
    hasher: KeyedHasher,
    blobs: B,
    last_challenge: C,
    mode: RwLock<ResponderMode>,
}

impl RemoteStore {
    /// In-memory honest store.
    pub fn in_memory(hasher: KeyedHasher) -> Self {
        Self::new(
            hasher,
            MemoryBlobStore::new(),
            MokaChallengeCache::default(),
            ResponderMode::Honest,
        )
    }
}

impl<B: BlobStore, C: ChallengeCache> RemoteStore<B, C> {
    pub fn new(hasher: KeyedHasher, blobs: B, last_challenge: C, mode: ResponderMode) -> Self {
        Self {
            hasher,
            blobs,
            last_challenge,
            mode: RwLock::new(mode),
        }
    }

    pub fn mode(&self) -> ResponderMode {
        *self.mode.read().expect("mode lock poisoned")
    }

    /// Switch how subsequent challenges are answered.
    pub fn set_mode(&self, mode: ResponderMode) {
        let mut guard = self.mode.write().expect("mode lock poisoned");
        let current = *guard;
        if current != mode {
            tracing::warn!(from = ?current, to = ?mode, "remote responder mode changed");
        }
        *guard = mode;
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Append bytes to a stored blob, as an attacker with write access would.
    pub fn tamper(&self, id: &str, suffix: &[u8]) -> Result<(), Error> {
        tracing::warn!(%id, bytes = suffix.len(), "tampering with stored content");
        self.blobs.append(id, suffix)
    }

    /// Honest answer: digest of `nonce ∥ stored content`.
    pub fn honest_challenge(&self, id: &str, nonce: &Nonce) -> Result<Digest, Error> {
        let content = self
            .blobs
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;
        let digest = self.hasher.digest(nonce, &content);
        self.last_challenge.record(
            id,
            CachedResponse {
                nonce: *nonce,
                digest,
            },
        )?;
        Ok(digest)
    }

    /// Replaying answer: returns the cached response for `id` if there is one,
    /// without looking at `nonce`. Otherwise answers honestly and caches.
    pub fn adversarial_challenge(&self, id: &str, nonce: &Nonce) -> Result<Digest, Error> {
        if let Some(cached) = self.last_challenge.last(id)? {
            tracing::debug!(%id, requested = %nonce, replayed = %cached.nonce, "replaying cached response");
            return Ok(cached.digest);
        }
        self.honest_challenge(id, nonce)
    }
}

impl<B: BlobStore, C: ChallengeCache> Remote for RemoteStore<B, C> {
    fn store(&self, id: &str, content: &[u8]) -> Result<(), Error> {
        self.blobs.put(id, content)?;
        // A cached answer describes the old content.
        self.last_challenge.forget(id)?;
        tracing::debug!(%id, bytes = content.len(), "remote stored content");
        Ok(())
    }

    fn challenge(&self, id: &str, nonce: &Nonce) -> Result<Digest, Error> {
        match self.mode() {
            ResponderMode::Honest => self.honest_challenge(id, nonce),
            ResponderMode::Replay => self.adversarial_challenge(id, nonce),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::DirBlobStore;
    use crate::keyed::{DigestAlgorithm, DEMO_KEY};

    fn hasher() -> KeyedHasher {
        KeyedHasher::new(DigestAlgorithm::HmacSha256, DEMO_KEY).unwrap()
    }

    #[test]
    fn honest_challenge_digests_stored_content() {
        let remote = RemoteStore::in_memory(hasher());
        remote.store("f", b"hello world").unwrap();
        let nonce = Nonce::generate().unwrap();
        assert_eq!(
            remote.challenge("f", &nonce).unwrap(),
            hasher().digest(&nonce, b"hello world")
        );
    }

    #[test]
    fn missing_content_is_not_found() {
        let remote = RemoteStore::in_memory(hasher());
        let nonce = Nonce::generate().unwrap();
        assert!(matches!(
            remote.challenge("nope", &nonce),
            Err(Error::NotFound(_))
        ));
        remote.set_mode(ResponderMode::Replay);
        assert!(matches!(
            remote.challenge("nope", &nonce),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn store_overwrites() {
        let remote = RemoteStore::in_memory(hasher());
        remote.store("f", b"one").unwrap();
        remote.store("f", b"two").unwrap();
        let nonce = Nonce::generate().unwrap();
        assert_eq!(
            remote.challenge("f", &nonce).unwrap(),
            hasher().digest(&nonce, b"two")
        );
    }

    #[test]
    fn store_drops_cached_answer_for_replaced_content() {
        let remote = RemoteStore::in_memory(hasher());
        remote.store("f", b"one").unwrap();
        let first = Nonce::generate().unwrap();
        let stale = remote.challenge("f", &first).unwrap();

        remote.store("f", b"two").unwrap();
        remote.set_mode(ResponderMode::Replay);
        let second = Nonce::generate().unwrap();
        let answer = remote.challenge("f", &second).unwrap();
        assert_ne!(answer, stale);
        assert_eq!(answer, hasher().digest(&second, b"two"));
    }

    #[test]
    fn tamper_changes_honest_answer() {
        let remote = RemoteStore::in_memory(hasher());
        remote.store("f", b"original").unwrap();
        let nonce = Nonce::generate().unwrap();
        let before = remote.challenge("f", &nonce).unwrap();
        remote.tamper("f", b"TAMPERED").unwrap();
        let after = remote.challenge("f", &nonce).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn replay_mode_ignores_new_nonce() {
        let remote = RemoteStore::in_memory(hasher());
        remote.store("f", b"original").unwrap();
        let first = Nonce::generate().unwrap();
        let answered = remote.challenge("f", &first).unwrap();

        remote.tamper("f", b"TAMPERED").unwrap();
        remote.set_mode(ResponderMode::Replay);
        assert_eq!(remote.mode(), ResponderMode::Replay);

        let second = Nonce::generate().unwrap();
        assert_eq!(remote.challenge("f", &second).unwrap(), answered);
    }

    #[test]
    fn replay_without_history_answers_honestly_and_caches() {
        let remote = RemoteStore::in_memory(hasher());
        remote.set_mode(ResponderMode::Replay);
        remote.store("f", b"data").unwrap();
        let first = Nonce::generate().unwrap();
        let answer = remote.challenge("f", &first).unwrap();
        assert_eq!(answer, hasher().digest(&first, b"data"));

        let second = Nonce::generate().unwrap();
        assert_eq!(remote.challenge("f", &second).unwrap(), answer);
    }

    #[test]
    fn directory_backed_remote() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = RemoteStore::new(
            hasher(),
            DirBlobStore::open(tmp.path()).unwrap(),
            MokaChallengeCache::new(8),
            ResponderMode::Honest,
        );
        remote.store("report.txt", b"bytes").unwrap();
        assert!(tmp.path().join("report.txt").exists());
        let nonce = Nonce::generate().unwrap();
        assert_eq!(
            remote.challenge("report.txt", &nonce).unwrap(),
            hasher().digest(&nonce, b"bytes")
        );
    }
}
