use thiserror::Error;

/// Errors from decoding a table of contents.
///
/// These are soft errors: a foreign or corrupted file fails only the read
/// that touched it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("table of contents at {offset} with {entries} entries runs past end of file ({file_len} bytes)")]
    TocOutOfBounds {
        offset: u64,
        entries: usize,
        file_len: usize,
    },

    #[error("terminating chunk id appears earlier than expected")]
    EarlyTerminator,

    #[error("improper chunk offset(s) {start:#x} and {end:#x}")]
    ImproperOffsets { start: u64, end: u64 },

    #[error("duplicate chunk ID {0:08x} found")]
    DuplicateId(u32),

    #[error("final chunk has non-zero id {0:08x}")]
    NonZeroTerminator(u32),

    #[error("chunk {id:08x} is malformed: {reason}")]
    Malformed { id: u32, reason: String },
}

pub type ChunkResult<T> = Result<T, ChunkError>;
