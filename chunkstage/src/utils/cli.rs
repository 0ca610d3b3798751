use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Listening host
    #[arg(long, env = "CHUNKSTAGE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Listening port
    #[arg(short, long, env = "CHUNKSTAGE_PORT", default_value_t = 8081)]
    pub port: u16,

    /// Storage backend type (FILESYSTEM or MEMORY)
    #[arg(
        short,
        long,
        env = "CHUNKSTAGE_STORAGE",
        default_value = "FILESYSTEM"
    )]
    pub storage: String,

    /// Storage root holding staging areas and merged files
    #[arg(long, env = "CHUNKSTAGE_ROOTDIR", default_value = "./target-uploads")]
    pub root: String,

    /// Largest accepted chunk in bytes, 0 for no limit
    #[arg(long, env = "CHUNKSTAGE_MAX_CHUNK_SIZE", default_value_t = 0)]
    pub max_chunk_size: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "CHUNKSTAGE_BODY_LIMIT", default_value_t = 64 * 1024 * 1024)]
    pub body_limit: usize,

    /// Chunks copied concurrently during a merge
    #[arg(long, env = "CHUNKSTAGE_MERGE_CONCURRENCY", default_value_t = 8)]
    pub merge_concurrency: usize,
}
