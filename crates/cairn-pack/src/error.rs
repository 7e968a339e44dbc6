use thiserror::Error;

use cairn_chunk::ChunkError;
use cairn_types::ObjectId;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("checksum mismatch in {0}")]
    ChecksumMismatch(String),

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("pack holds no objects")]
    EmptyPack,

    #[error("too many objects for one pack: {0}")]
    TooManyObjects(usize),

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("index table of contents: {0}")]
    Chunk(#[from] ChunkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
