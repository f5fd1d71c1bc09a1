//! Keyed-hash challenge-response file integrity verification.
//!
//! A [`Client`] keeps authoritative copies of its files and periodically asks a
//! [`Remote`] to prove it still holds them unmodified. Each challenge carries a
//! nonce; the remote answers with a keyed digest of `nonce ∥ content`, which the
//! client compares in constant time against the digest it expects.
//!
//! - [`keyed`]: HMAC-SHA-256 / keyed BLAKE3 digests and constant-time comparison.
//! - [`nonce`]: random nonces and the client's round-robin rotation ring.
//! - [`record`]: typed per-file records, their JSON persistence and the
//!   single-use precomputed challenge pools.
//! - [`remote`]: the store-side holder, answering honestly or by replay.
//! - [`client`]: onboarding and verification.

pub mod blob;
pub mod client;
pub mod config;
pub mod error;
pub mod keyed;
pub mod nonce;
pub mod record;
pub mod remote;

pub use blob::{BlobStore, DirBlobStore, MemoryBlobStore};
pub use client::{ChallengeMethod, Client, Verification};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::Error;
pub use keyed::{compare_digests, Digest, DigestAlgorithm, KeyedHasher, DEMO_KEY};
pub use nonce::{Nonce, NonceRing, NONCE_LEN};
pub use record::{
    FileRecord, JsonFileMetadataStore, MemoryMetadataStore, MetadataStore, PrecomputedEntry,
    RecordStore,
};
pub use remote::{MokaChallengeCache, Remote, RemoteStore, ResponderMode};
