use std::collections::{BTreeMap, HashMap};

use axum::body::Bytes;
use futures::TryStreamExt;
use tokio::io;
use tokio::sync::RwLock;

use crate::domain::{ArtifactName, ChunkId, ContentHash};
use crate::storage::{ByteStream, Storage};

/// Keeps staging areas and artifacts in process memory.
///
/// Nothing survives a restart; meant for tests and throwaway deployments.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    staging: HashMap<ContentHash, BTreeMap<String, Bytes>>,
    scratch: HashMap<String, Vec<u8>>,
    artifacts: HashMap<String, Bytes>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the content of a published artifact.
    pub async fn artifact_bytes(&self, artifact: &ArtifactName) -> Option<Bytes> {
        self.inner.read().await.artifacts.get(artifact.as_str()).cloned()
    }

    pub async fn staging_exists(&self, hash: &ContentHash) -> bool {
        self.inner.read().await.staging.contains_key(hash)
    }

    async fn chunk_bytes(&self, chunk: &ChunkId) -> io::Result<Bytes> {
        self.inner
            .read()
            .await
            .staging
            .get(&chunk.hash)
            .and_then(|chunks| chunks.get(&chunk.name()))
            .cloned()
            .ok_or_else(|| not_found(format!("chunk {chunk}")))
    }
}

fn not_found(what: String) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{what} not found"))
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn create_staging(&self, hash: &ContentHash) -> io::Result<()> {
        self.inner
            .write()
            .await
            .staging
            .entry(hash.clone())
            .or_default();
        Ok(())
    }

    async fn write_chunk(&self, chunk: &ChunkId, stream: ByteStream<'_>) -> io::Result<u64> {
        // Collect first so a failed stream never replaces the stored entry.
        let parts: Vec<Bytes> = stream.try_collect().await?;
        let data = Bytes::from(parts.concat());
        let len = data.len() as u64;

        let mut inner = self.inner.write().await;
        let chunks = inner
            .staging
            .get_mut(&chunk.hash)
            .ok_or_else(|| not_found(format!("staging area {}", chunk.hash)))?;
        chunks.insert(chunk.name(), data);
        Ok(len)
    }

    async fn list_chunks(&self, hash: &ContentHash) -> io::Result<Option<Vec<String>>> {
        let inner = self.inner.read().await;
        Ok(inner
            .staging
            .get(hash)
            .map(|chunks| chunks.keys().cloned().collect()))
    }

    async fn chunk_len(&self, chunk: &ChunkId) -> io::Result<u64> {
        Ok(self.chunk_bytes(chunk).await?.len() as u64)
    }

    async fn delete_chunk(&self, chunk: &ChunkId) -> io::Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(chunks) = inner.staging.get_mut(&chunk.hash) {
            chunks.remove(&chunk.name());
        }
        Ok(())
    }

    async fn remove_staging(&self, hash: &ContentHash) -> io::Result<()> {
        let mut inner = self.inner.write().await;
        match inner.staging.get(hash).map(|chunks| chunks.len()) {
            Some(0) => {
                inner.staging.remove(hash);
                Ok(())
            }
            Some(remaining) => Err(io::Error::other(format!(
                "staging area {hash} still holds {remaining} chunks"
            ))),
            None => Ok(()),
        }
    }

    async fn artifact_exists(&self, artifact: &ArtifactName) -> io::Result<bool> {
        Ok(self
            .inner
            .read()
            .await
            .artifacts
            .contains_key(artifact.as_str()))
    }

    async fn prepare_scratch(&self, artifact: &ArtifactName, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.inner
            .write()
            .await
            .scratch
            .insert(artifact.to_string(), vec![0u8; len]);
        Ok(())
    }

    async fn copy_chunk_to_scratch(
        &self,
        chunk: &ChunkId,
        artifact: &ArtifactName,
        offset: u64,
    ) -> io::Result<u64> {
        let data = self.chunk_bytes(chunk).await?;
        let start = usize::try_from(offset).map_err(io::Error::other)?;
        let end = start + data.len();

        let mut inner = self.inner.write().await;
        let buf = inner
            .scratch
            .get_mut(artifact.as_str())
            .ok_or_else(|| not_found(format!("scratch artifact {artifact}")))?;
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[start..end].copy_from_slice(&data);
        Ok(data.len() as u64)
    }

    async fn commit_scratch(&self, artifact: &ArtifactName) -> io::Result<()> {
        let mut inner = self.inner.write().await;
        let buf = inner
            .scratch
            .remove(artifact.as_str())
            .ok_or_else(|| not_found(format!("scratch artifact {artifact}")))?;
        inner.artifacts.insert(artifact.to_string(), Bytes::from(buf));
        Ok(())
    }

    async fn discard_scratch(&self, artifact: &ArtifactName) -> io::Result<()> {
        self.inner.write().await.scratch.remove(artifact.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(data: &'static [u8]) -> ByteStream<'static> {
        Box::pin(futures::stream::once(async move {
            Ok::<_, io::Error>(Bytes::from_static(data))
        }))
    }

    #[tokio::test]
    async fn test_write_requires_staging() {
        let storage = MemoryStorage::new();
        let hash = ContentHash::parse("aa").unwrap();
        let chunk = ChunkId::new(hash.clone(), 0);

        assert!(storage.write_chunk(&chunk, bytes_stream(b"x")).await.is_err());
        storage.create_staging(&hash).await.unwrap();
        assert_eq!(storage.write_chunk(&chunk, bytes_stream(b"xyz")).await.unwrap(), 3);
        assert_eq!(storage.chunk_len(&chunk).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_scratch_is_invisible_until_commit() {
        let storage = MemoryStorage::new();
        let hash = ContentHash::parse("bb").unwrap();
        let artifact = ArtifactName::new(&hash, "f.txt").unwrap();
        let chunk = ChunkId::new(hash.clone(), 0);
        storage.create_staging(&hash).await.unwrap();
        storage.write_chunk(&chunk, bytes_stream(b"abc")).await.unwrap();

        storage.prepare_scratch(&artifact, 3).await.unwrap();
        storage.copy_chunk_to_scratch(&chunk, &artifact, 0).await.unwrap();
        assert!(!storage.artifact_exists(&artifact).await.unwrap());

        storage.commit_scratch(&artifact).await.unwrap();
        assert_eq!(
            storage.artifact_bytes(&artifact).await.unwrap(),
            Bytes::from_static(b"abc")
        );
    }
}
