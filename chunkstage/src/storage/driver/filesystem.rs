use std::io::SeekFrom;
use std::path::Path;

use crate::domain::{ArtifactName, ChunkId, ContentHash};
use crate::storage::paths::PathManager;
use crate::storage::{ByteStream, Storage, ignore_not_found};
use crate::utils::validation::is_hidden_entry;

use tokio::{
    fs::{
        File, OpenOptions, create_dir_all, metadata, read_dir, remove_dir, remove_file, rename,
    },
    io::{self, AsyncSeekExt, AsyncWriteExt, BufWriter},
};
use tokio_util::io::StreamReader;

pub struct FilesystemStorage {
    path_manager: PathManager,
}

impl FilesystemStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        FilesystemStorage {
            path_manager: PathManager::new(root.as_ref()),
        }
    }

    pub fn path_manager(&self) -> &PathManager {
        &self.path_manager
    }

    async fn stream_to_file(path: &Path, stream: ByteStream<'_>) -> io::Result<u64> {
        // Convert the stream into an `AsyncRead`.
        let mut body_reader = StreamReader::new(stream);

        let file = File::create(path).await?;
        let mut file_writer = BufWriter::new(file);

        // Copy the body into the file.
        let written = tokio::io::copy(&mut body_reader, &mut file_writer).await?;
        file_writer.flush().await?;
        file_writer.get_ref().sync_data().await?;
        Ok(written)
    }
}

#[async_trait::async_trait]
impl Storage for FilesystemStorage {
    async fn create_staging(&self, hash: &ContentHash) -> io::Result<()> {
        // `create_dir_all` tolerates a concurrent creator winning the race.
        create_dir_all(self.path_manager.staging_path(hash)).await
    }

    async fn write_chunk(&self, chunk: &ChunkId, stream: ByteStream<'_>) -> io::Result<u64> {
        let temp_path = self.path_manager.chunk_temp_path(chunk);
        let written = match Self::stream_to_file(&temp_path, stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = remove_file(&temp_path).await;
                return Err(err);
            }
        };
        // Replacing by rename keeps the visible entry either old or complete.
        if let Err(err) = rename(&temp_path, self.path_manager.chunk_path(chunk)).await {
            let _ = remove_file(&temp_path).await;
            return Err(err);
        }
        Ok(written)
    }

    async fn list_chunks(&self, hash: &ContentHash) -> io::Result<Option<Vec<String>>> {
        let mut read_dir = match read_dir(self.path_manager.staging_path(hash)).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut entries = vec![];
        while let Some(entry) = read_dir.next_entry().await? {
            if let Some(file_name_str) = entry.file_name().to_str() {
                if !is_hidden_entry(file_name_str) {
                    entries.push(file_name_str.to_string());
                }
            }
        }
        entries.sort();
        Ok(Some(entries))
    }

    async fn chunk_len(&self, chunk: &ChunkId) -> io::Result<u64> {
        Ok(metadata(self.path_manager.chunk_path(chunk)).await?.len())
    }

    async fn delete_chunk(&self, chunk: &ChunkId) -> io::Result<()> {
        ignore_not_found(remove_file(self.path_manager.chunk_path(chunk)).await)
    }

    async fn remove_staging(&self, hash: &ContentHash) -> io::Result<()> {
        let staging_path = self.path_manager.staging_path(hash);
        let mut read_dir = match read_dir(&staging_path).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        // Leftovers of interrupted chunk writes.
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_name().to_str().is_some_and(is_hidden_entry) {
                ignore_not_found(remove_file(entry.path()).await)?;
            }
        }
        ignore_not_found(remove_dir(staging_path).await)
    }

    async fn artifact_exists(&self, artifact: &ArtifactName) -> io::Result<bool> {
        // Only a regular file counts; a directory of the same name is not an artifact.
        match metadata(self.path_manager.artifact_path(artifact)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn prepare_scratch(&self, artifact: &ArtifactName, len: u64) -> io::Result<()> {
        create_dir_all(self.path_manager.scratch_root()).await?;
        let file = File::create(self.path_manager.scratch_path(artifact)).await?;
        file.set_len(len).await
    }

    async fn copy_chunk_to_scratch(
        &self,
        chunk: &ChunkId,
        artifact: &ArtifactName,
        offset: u64,
    ) -> io::Result<u64> {
        let mut source = File::open(self.path_manager.chunk_path(chunk)).await?;

        // Every segment gets its own handle, so concurrent writers never share a cursor.
        let mut target = OpenOptions::new()
            .write(true)
            .open(self.path_manager.scratch_path(artifact))
            .await?;
        target.seek(SeekFrom::Start(offset)).await?;

        let mut file_writer = BufWriter::new(target);
        let copied = tokio::io::copy(&mut source, &mut file_writer).await?;
        file_writer.flush().await?;
        file_writer.get_ref().sync_data().await?;
        Ok(copied)
    }

    async fn commit_scratch(&self, artifact: &ArtifactName) -> io::Result<()> {
        rename(
            self.path_manager.scratch_path(artifact),
            self.path_manager.artifact_path(artifact),
        )
        .await
    }

    async fn discard_scratch(&self, artifact: &ArtifactName) -> io::Result<()> {
        ignore_not_found(remove_file(self.path_manager.scratch_path(artifact)).await)
    }
}
