//! Remote side of the protocol.
//!
//! Provides:
//! - The [`Remote`] capability the client talks to (`store`, `challenge`).
//! - [`RemoteStore`], holding content blobs and answering challenges either
//!   honestly or, in [`ResponderMode::Replay`], by replaying a cached answer.
//! - A per-file challenge cache abstraction with a default moka implementation.

pub mod cache;
pub mod server;

pub use cache::{CachedResponse, ChallengeCache, ChallengeCacheError, MokaChallengeCache};
pub use server::{Remote, RemoteStore, ResponderMode};
