use std::pin::Pin;

use axum::body::Bytes;
use futures::Stream;
use tokio::io;

use crate::domain::{ArtifactName, ChunkId, ContentHash};

pub mod driver;
pub mod paths;

/// Chunk payload as it arrives from the request body.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'a>>;

/// Staging and artifact storage.
///
/// Merge logic only talks to this trait, so staging can live on local disk
/// or in memory without the services noticing. Implementations must allow
/// concurrent `copy_chunk_to_scratch` calls on one artifact as long as the
/// written ranges do not overlap.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Creates the staging area for `hash`. Succeeds if it already exists.
    async fn create_staging(&self, hash: &ContentHash) -> io::Result<()>;

    /// Stores a chunk, replacing any previous entry at the same index.
    /// Returns the number of bytes stored.
    async fn write_chunk(&self, chunk: &ChunkId, stream: ByteStream<'_>) -> io::Result<u64>;

    /// Lists the chunk entry names staged for `hash`, or `None` when the
    /// staging area does not exist.
    async fn list_chunks(&self, hash: &ContentHash) -> io::Result<Option<Vec<String>>>;

    async fn chunk_len(&self, chunk: &ChunkId) -> io::Result<u64>;

    /// Deletes a staged chunk. Deleting a missing chunk is not an error.
    async fn delete_chunk(&self, chunk: &ChunkId) -> io::Result<()>;

    /// Removes the staging area of `hash`, which must hold no chunks.
    /// Removing a missing staging area is not an error.
    async fn remove_staging(&self, hash: &ContentHash) -> io::Result<()>;

    async fn artifact_exists(&self, artifact: &ArtifactName) -> io::Result<bool>;

    /// Creates (or truncates) the scratch copy of `artifact` with `len` bytes.
    async fn prepare_scratch(&self, artifact: &ArtifactName, len: u64) -> io::Result<()>;

    /// Copies a staged chunk into the scratch artifact starting at `offset`
    /// and makes it durable. Returns the number of bytes copied.
    async fn copy_chunk_to_scratch(
        &self,
        chunk: &ChunkId,
        artifact: &ArtifactName,
        offset: u64,
    ) -> io::Result<u64>;

    /// Atomically publishes the scratch artifact under its final name.
    async fn commit_scratch(&self, artifact: &ArtifactName) -> io::Result<()>;

    /// Drops the scratch artifact. Dropping a missing one is not an error.
    async fn discard_scratch(&self, artifact: &ArtifactName) -> io::Result<()>;
}

pub(crate) fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
