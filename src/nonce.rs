//! Random nonces and the client's rotation ring.
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Nonce length in bytes (128 bits).
pub const NONCE_LEN: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh nonce from the operating system's random source.
    pub fn generate() -> Result<Self, Error> {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::RandomSourceFailure(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let raw =
            hex::decode(s).map_err(|e| Error::CorruptMetadata(format!("nonce {s:?}: {e}")))?;
        let bytes: [u8; NONCE_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            Error::CorruptMetadata(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.to_hex())
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Nonce::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Fixed set of challenge nonces served round-robin.
///
/// Values repeat over the ring's lifetime. The ring is only a fallback for
/// files whose precomputed pool is exhausted, and a store that replays old
/// answers can pass those challenges.
#[derive(Debug)]
pub struct NonceRing {
    nonces: Vec<Nonce>,
    next: AtomicUsize,
}

impl NonceRing {
    /// Generate `size` random nonces. Fails if `size` is zero or the random
    /// source is unavailable.
    pub fn new(size: usize) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidConfig("rotation size must be >= 1".into()));
        }
        let nonces = (0..size)
            .map(|_| Nonce::generate())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_nonces(nonces))
    }

    /// Build a ring over caller-provided nonces. `nonces` must not be empty.
    pub(crate) fn from_nonces(nonces: Vec<Nonce>) -> Self {
        debug_assert!(!nonces.is_empty());
        Self {
            nonces,
            next: AtomicUsize::new(0),
        }
    }

    /// Return the nonce at the current index and advance it.
    #[inline]
    pub fn next(&self) -> Nonce {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.nonces.len();
        self.nonces[idx]
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    pub fn contains(&self, nonce: &Nonce) -> bool {
        self.nonces.contains(nonce)
    }
}
