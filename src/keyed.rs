//! Keyed digests over `nonce ∥ content` and constant-time comparison.
use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::Error;
use crate::nonce::Nonce;

/// Length in bytes of every keyed digest produced by [`KeyedHasher`].
pub const DIGEST_LEN: usize = 32;

/// Fixed key of the reference exercise. Only meant for demos and tests.
pub const DEMO_KEY: &[u8] = b"this_is_a_demo_key_for_hmac_calculation_only";

const BLAKE3_KEY_CONTEXT: &str = "rsintegrity 2024 keyed digest v1";

type HmacSha256 = Hmac<Sha256>;

/// Keyed primitive used to fingerprint content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    #[default]
    HmacSha256,
    Blake3Keyed,
}

/// A keyed digest. Equality is evaluated in constant time.
#[derive(Clone, Copy)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let raw = hex::decode(s)
            .map_err(|e| Error::CorruptMetadata(format!("digest {s:?}: {e}")))?;
        let bytes: [u8; DIGEST_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            Error::CorruptMetadata(format!(
                "digest must be {DIGEST_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        compare_digests(&self.0, &other.0)
    }
}

impl Eq for Digest {}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compare two digests in time independent of where they first differ.
///
/// Slices of different lengths are never equal; the length itself is not
/// treated as secret.
pub fn compare_digests(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

#[derive(Clone)]
enum KeyState {
    Hmac(HmacSha256),
    Blake3([u8; 32]),
}

/// Deterministic keyed digest engine bound to one shared key.
///
/// Both parties of the protocol must build it from the same key and algorithm.
#[derive(Clone)]
pub struct KeyedHasher {
    algorithm: DigestAlgorithm,
    state: KeyState,
}

impl KeyedHasher {
    pub fn new(algorithm: DigestAlgorithm, key: &[u8]) -> Result<Self, Error> {
        if key.is_empty() {
            return Err(Error::InvalidConfig("key must not be empty".into()));
        }
        let state = match algorithm {
            DigestAlgorithm::HmacSha256 => KeyState::Hmac(
                <HmacSha256 as Mac>::new_from_slice(key)
                    .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            ),
            DigestAlgorithm::Blake3Keyed => {
                KeyState::Blake3(blake3::derive_key(BLAKE3_KEY_CONTEXT, key))
            }
        };
        Ok(Self { algorithm, state })
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Digest of `nonce ∥ content` under the shared key.
    pub fn digest(&self, nonce: &Nonce, content: &[u8]) -> Digest {
        match &self.state {
            KeyState::Hmac(base) => {
                let mut mac = base.clone();
                mac.update(nonce.as_bytes());
                mac.update(content);
                Digest(mac.finalize().into_bytes().into())
            }
            KeyState::Blake3(key) => {
                let mut hasher = blake3::Hasher::new_keyed(key);
                hasher.update(nonce.as_bytes());
                hasher.update(content);
                Digest(hasher.finalize().into())
            }
        }
    }
}

impl fmt::Debug for KeyedHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedHasher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
