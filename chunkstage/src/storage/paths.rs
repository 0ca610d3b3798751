// PathManager maps staging areas, chunks and artifacts to filesystem paths.
//
// The path layout under the storage root is as follows:
//
//	<root>
//	├── chunkDir_<hash>
//	│   ├── <hash>-0
//	│   ├── <hash>-1
//	│   └── .<hash>-2.<uuid>.part      (chunk being written)
//	├── .merging
//	│   └── <hash><ext>                (artifact being assembled)
//	└── <hash><ext>
//
// A staging directory holds exactly the chunks uploaded so far for one hash.
// The artifact at the root only appears once a merge has fully succeeded.

use std::path::PathBuf;

use crate::domain::{ArtifactName, ChunkId, ContentHash};

pub const STAGING_PREFIX: &str = "chunkDir_";
pub const SCRATCH_DIR: &str = ".merging";

#[derive(Clone, Debug)]
pub struct PathManager {
    root_path: PathBuf,
}

impl PathManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PathManager {
            root_path: root.into(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root_path
    }

    /// Returns the staging directory of a hash,
    /// (e.g. `<root>/chunkDir_<hash>`).
    pub fn staging_path(&self, hash: &ContentHash) -> PathBuf {
        self.root_path.join(format!("{STAGING_PREFIX}{hash}"))
    }

    /// Returns the path of a staged chunk,
    /// (e.g. `<root>/chunkDir_<hash>/<hash>-<index>`).
    pub fn chunk_path(&self, chunk: &ChunkId) -> PathBuf {
        self.staging_path(&chunk.hash).join(chunk.name())
    }

    /// Returns a unique temporary path for a chunk write,
    /// (e.g. `<root>/chunkDir_<hash>/.<hash>-<index>.<uuid>.part`).
    pub fn chunk_temp_path(&self, chunk: &ChunkId) -> PathBuf {
        let nonce = uuid::Uuid::new_v4().simple();
        self.staging_path(&chunk.hash)
            .join(format!(".{}.{nonce}.part", chunk.name()))
    }

    /// Returns the path of a finished artifact,
    /// (e.g. `<root>/<hash><ext>`).
    pub fn artifact_path(&self, artifact: &ArtifactName) -> PathBuf {
        self.root_path.join(artifact.as_str())
    }

    /// Returns the directory holding artifacts under assembly,
    /// (e.g. `<root>/.merging`).
    pub fn scratch_root(&self) -> PathBuf {
        self.root_path.join(SCRATCH_DIR)
    }

    /// Returns the path of an artifact under assembly,
    /// (e.g. `<root>/.merging/<hash><ext>`).
    pub fn scratch_path(&self, artifact: &ArtifactName) -> PathBuf {
        self.scratch_root().join(artifact.as_str())
    }
}
