//! Pack header layout and naming.
//!
//! ```text
//! [magic "CRNP"][version: be32][object count: be32]
//! [entry: zlib("<kind> <size>\0" + content)] ...
//! [BLAKE3 of everything above: 32 bytes]
//! ```

use cairn_crypto::CHECKSUM_LEN;

use crate::error::{PackError, PackResult};

pub const PACK_MAGIC: &[u8; 4] = b"CRNP";
pub const PACK_VERSION: u32 = 1;
pub const PACK_HEADER_LEN: usize = 12;

/// Smallest well-formed pack: a header and a trailer.
pub const MIN_PACK_LEN: usize = PACK_HEADER_LEN + CHECKSUM_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackHeader {
    pub version: u32,
    pub object_count: u32,
}

impl PackHeader {
    pub fn new(object_count: u32) -> Self {
        Self {
            version: PACK_VERSION,
            object_count,
        }
    }

    pub fn encode(&self) -> [u8; PACK_HEADER_LEN] {
        let mut buf = [0u8; PACK_HEADER_LEN];
        buf[0..4].copy_from_slice(PACK_MAGIC);
        buf[4..8].copy_from_slice(&self.version.to_be_bytes());
        buf[8..12].copy_from_slice(&self.object_count.to_be_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> PackResult<Self> {
        if data.len() < PACK_HEADER_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &data[0..4] != PACK_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(PACK_MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_be32(&data[4..8]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        Ok(Self {
            version,
            object_count: read_be32(&data[8..12]),
        })
    }
}

/// File name of a finalized pack, derived from its trailer checksum.
pub fn pack_file_name(checksum: &[u8; CHECKSUM_LEN]) -> String {
    format!("pack-{}.pack", hex::encode(checksum))
}

pub(crate) fn read_be32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

pub(crate) fn read_be64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}
