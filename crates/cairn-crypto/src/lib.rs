//! Hashing primitives for the Cairn object store.
//!
//! Provides the header-aware BLAKE3 object hasher that derives every
//! [`ObjectId`](cairn_types::ObjectId), and a checksumming writer used to
//! build pack and index files with a trailing whole-file checksum.
//!
//! All operations wrap established libraries; there is no custom cryptography.

pub mod checksum;
pub mod hasher;

pub use checksum::{checksum_reader, Checkpoint, ChecksumWriter, Truncate, CHECKSUM_LEN};
pub use hasher::{object_header, parse_object_header, ObjectHasher};
