use crate::remote::cache::ChallengeCacheError;

/// Errors surfaced by the integrity protocol.
///
/// A digest mismatch is not an error: it is the `false` outcome of a
/// verification. An exhausted precomputed pool is not an error either; it
/// switches the client to rotation nonces.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unknown record: {0}")]
    UnknownRecord(String),
    #[error("random source failure: {0}")]
    RandomSourceFailure(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),
    #[error("challenge cache error: {0}")]
    Cache(#[from] ChallengeCacheError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the requested identifier does not exist on
    /// either side of the protocol.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::UnknownRecord(_))
    }
}
