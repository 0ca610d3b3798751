use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage_typ: String,
    pub root_dir: PathBuf,
    /// Largest accepted chunk payload in bytes; `0` disables the check.
    pub max_chunk_size: u64,
    /// Largest accepted request body in bytes.
    pub body_limit: usize,
    /// Number of chunks copied into an artifact at the same time.
    pub merge_concurrency: usize,
}

impl Config {
    pub fn for_root(root_dir: impl Into<PathBuf>) -> Self {
        Config {
            host: "127.0.0.1".into(),
            port: 8081,
            storage_typ: "FILESYSTEM".into(),
            root_dir: root_dir.into(),
            max_chunk_size: 0,
            body_limit: 64 * 1024 * 1024,
            merge_concurrency: 8,
        }
    }
}
