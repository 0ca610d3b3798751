pub mod chunk;
pub mod merge;
pub mod status;
