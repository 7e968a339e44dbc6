//! Chunked container format.
//!
//! A chunked file is a caller-defined header, followed by a table of
//! contents, followed by the chunk payloads and a trailing whole-file
//! checksum:
//!
//! ```text
//! [header ...]
//! [id: be32][offset: be64]   x nr_chunks   (absolute start offsets)
//! [0:  be32][offset: be64]                 (terminator: end of last chunk)
//! [chunk data ...]
//! [checksum: 32 bytes]
//! ```
//!
//! The codec knows nothing about what the chunks contain.
//! [`ChunkWriter`] lays out and writes the table and payloads;
//! [`TableOfContents`] validates a table read back from a byte slice
//! (usually a memory map) and hands out per-chunk slices.

pub mod error;
pub mod reader;
pub mod writer;

pub use error::{ChunkError, ChunkResult};
pub use reader::TableOfContents;
pub use writer::ChunkWriter;

/// Width of one table-of-contents record: 4-byte id + 8-byte offset.
pub const CHUNK_LOOKUP_WIDTH: usize = 12;

/// Build a chunk id from its four-character tag, e.g. `chunk_id(b"OIDF")`.
pub const fn chunk_id(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

/// Size of a table of contents describing `nr_chunks` chunks, terminator
/// included.
pub const fn toc_len(nr_chunks: usize) -> usize {
    (nr_chunks + 1) * CHUNK_LOOKUP_WIDTH
}
