use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::AppError;
use crate::storage::paths::STAGING_PREFIX;
use crate::utils::validation::is_valid_hash;

/// Separates the content hash from the chunk index in a chunk name.
pub const CHUNK_DELIMITER: char = '-';

/// Client-supplied identifier of a whole file's content.
///
/// Only `[A-Za-z0-9_-]` is accepted, so a hash can be used verbatim as a
/// path component under the storage root. Hashes starting with the staging
/// prefix are refused, since `<hash>` alone is also an artifact name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn parse(raw: impl Into<String>) -> Result<Self, AppError> {
        let raw = raw.into();
        if !is_valid_hash(&raw) {
            return Err(AppError::Validation(format!("invalid file hash `{raw}`")));
        }
        if raw.starts_with(STAGING_PREFIX) {
            return Err(AppError::Validation(format!(
                "file hash `{raw}` uses the reserved prefix `{STAGING_PREFIX}`"
            )));
        }
        Ok(ContentHash(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkIdError {
    #[error("chunk name `{0}` has no index delimiter")]
    MissingDelimiter(String),

    #[error("chunk name `{0}` has a non-numeric index")]
    InvalidIndex(String),

    #[error("chunk name `{0}` has an invalid hash part")]
    InvalidHash(String),
}

/// A chunk's position within the file it belongs to.
///
/// Rendered as `<hash>-<index>`, which is both the name clients send in the
/// `hash` multipart field and the name of the staged entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub hash: ContentHash,
    pub index: u64,
}

impl ChunkId {
    pub fn new(hash: ContentHash, index: u64) -> Self {
        ChunkId { hash, index }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn belongs_to(&self, hash: &ContentHash) -> bool {
        &self.hash == hash
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.hash, CHUNK_DELIMITER, self.index)
    }
}

impl FromStr for ChunkId {
    type Err = ChunkIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .rsplit_once(CHUNK_DELIMITER)
            .ok_or_else(|| ChunkIdError::MissingDelimiter(s.to_string()))?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ChunkIdError::InvalidIndex(s.to_string()));
        }
        let index = index
            .parse::<u64>()
            .map_err(|_| ChunkIdError::InvalidIndex(s.to_string()))?;
        let hash = ContentHash::parse(hash).map_err(|_| ChunkIdError::InvalidHash(s.to_string()))?;
        Ok(ChunkId { hash, index })
    }
}
