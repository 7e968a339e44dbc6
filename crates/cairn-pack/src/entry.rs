use serde::{Deserialize, Serialize};

use cairn_crypto::ObjectHasher;
use cairn_types::{ObjectId, ObjectKind};

/// One object written into a pack: where it starts and the CRC32 of its
/// compressed bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackEntry {
    /// Content-addressed ID of the object.
    pub id: ObjectId,
    /// Byte offset of the entry from the start of the pack.
    pub offset: u64,
    /// CRC32 of the entry's compressed bytes.
    pub crc32: u32,
}

/// An object's kind and uncompressed content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl RawObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Compute the content-addressed ID.
    pub fn compute_id(&self) -> ObjectId {
        ObjectHasher::hash(self.kind, &self.data)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
