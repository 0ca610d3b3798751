pub mod artifact;
pub mod chunk;

pub use artifact::ArtifactName;
pub use chunk::{ChunkId, ChunkIdError, ContentHash};
