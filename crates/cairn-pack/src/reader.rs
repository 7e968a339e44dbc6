use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use flate2::{Decompress, FlushDecompress, Status};
use memmap2::Mmap;

use cairn_crypto::{parse_object_header, CHECKSUM_LEN};
use cairn_types::ObjectId;

use crate::entry::{PackEntry, RawObject};
use crate::error::{PackError, PackResult};
use crate::format::{PackHeader, MIN_PACK_LEN, PACK_HEADER_LEN};
use crate::index::PackIndex;

enum PackData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for PackData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(bytes) => bytes,
        }
    }
}

/// One entry inflated from a pack.
struct InflatedEntry {
    id: ObjectId,
    object: RawObject,
    compressed_len: u64,
    crc32: u32,
}

/// Reads objects from a pack file using an index for random access.
///
/// Packs holding a single object are written without an index file; for
/// those (and any pack whose index is missing) the index is rebuilt by
/// scanning the entries.
pub struct PackReader {
    path: Option<PathBuf>,
    data: PackData,
    header: PackHeader,
    index: PackIndex,
}

impl std::fmt::Debug for PackReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackReader")
            .field("path", &self.path)
            .field("len", &self.data.len())
            .field("objects", &self.index.object_count())
            .finish()
    }
}

impl PackReader {
    /// Open a pack from disk, loading its `.idx` companion if present.
    pub fn open(pack_path: &Path) -> PackResult<Self> {
        let file = File::open(pack_path)?;
        // SAFETY: packs are renamed into place once complete and never
        // rewritten, so the mapping stays stable while we hold it.
        let map = unsafe { Mmap::map(&file)? };

        let index_path = pack_path.with_extension("idx");
        let index = if index_path.exists() {
            Some(PackIndex::open(&index_path)?)
        } else {
            None
        };
        Self::new(Some(pack_path.to_path_buf()), PackData::Mapped(map), index)
    }

    /// Open from raw bytes, scanning the entries when no index is given.
    pub fn from_bytes(pack_data: Vec<u8>, index: Option<PackIndex>) -> PackResult<Self> {
        Self::new(None, PackData::Owned(pack_data), index)
    }

    fn new(path: Option<PathBuf>, data: PackData, index: Option<PackIndex>) -> PackResult<Self> {
        let header = PackHeader::decode(&data)?;
        if data.len() < MIN_PACK_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        let checksum = trailer(&data);
        let index = match index {
            Some(index) => {
                if index.pack_checksum != checksum {
                    return Err(PackError::ChecksumMismatch(
                        "index does not describe this pack".into(),
                    ));
                }
                if index.object_count() != header.object_count as usize {
                    return Err(PackError::IndexCorrupted(format!(
                        "index lists {} objects, pack header {}",
                        index.object_count(),
                        header.object_count
                    )));
                }
                index
            }
            None => scan(&data, header, checksum)?,
        };
        Ok(Self {
            path,
            data,
            header,
            index,
        })
    }

    /// Read an object by ID.
    pub fn read_object(&self, id: &ObjectId) -> PackResult<Option<RawObject>> {
        let (offset, expected_crc) = match self.index.lookup(id) {
            Some(v) => v,
            None => return Ok(None),
        };
        let entry = inflate_at(&self.data, offset)?;
        if entry.crc32 != expected_crc {
            return Err(PackError::CrcMismatch { id: *id });
        }
        if entry.id != *id {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("expected object {id}, found {}", entry.id),
            });
        }
        Ok(Some(entry.object))
    }

    /// Recompute the trailer checksum and check every entry against the
    /// index.
    pub fn verify(&self) -> PackResult<()> {
        let body = &self.data[..self.data.len() - CHECKSUM_LEN];
        if blake3::hash(body).as_bytes() != &self.checksum() {
            return Err(PackError::ChecksumMismatch(self.describe()));
        }
        for entry in self.index.entries() {
            if self.read_object(&entry.id)?.is_none() {
                return Err(PackError::IndexCorrupted(format!(
                    "{} listed but unreadable",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    /// Check containment.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    /// Object count.
    pub fn object_count(&self) -> usize {
        self.index.object_count()
    }

    pub fn header(&self) -> PackHeader {
        self.header
    }

    /// The pack's trailer checksum.
    pub fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        trailer(&self.data)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Access the index.
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// List all object IDs.
    pub fn object_ids(&self) -> &[ObjectId] {
        &self.index.object_ids
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "in-memory pack".into(),
        }
    }
}

fn trailer(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut sum = [0u8; CHECKSUM_LEN];
    sum.copy_from_slice(&data[data.len() - CHECKSUM_LEN..]);
    sum
}

/// Smallest possible entry: zlib header, an empty final block, adler32.
const MIN_ENTRY_LEN: usize = 8;

/// Walk every entry to rebuild the index.
fn scan(data: &[u8], header: PackHeader, checksum: [u8; CHECKSUM_LEN]) -> PackResult<PackIndex> {
    let mut offset = PACK_HEADER_LEN as u64;
    // The count is untrusted; no entry is shorter than a bare zlib stream.
    let room = (data.len() - MIN_PACK_LEN) / MIN_ENTRY_LEN;
    let mut entries = Vec::with_capacity(room.min(header.object_count as usize));
    for _ in 0..header.object_count {
        let entry = inflate_at(data, offset)?;
        entries.push(PackEntry {
            id: entry.id,
            offset,
            crc32: entry.crc32,
        });
        offset += entry.compressed_len;
    }
    let body_end = (data.len() - CHECKSUM_LEN) as u64;
    if offset != body_end {
        return Err(PackError::CorruptEntry {
            offset,
            reason: format!("{} unexpected bytes before trailer", body_end.saturating_sub(offset)),
        });
    }
    Ok(PackIndex::build(entries, checksum))
}

/// Inflate the entry starting at `offset`.
fn inflate_at(data: &[u8], offset: u64) -> PackResult<InflatedEntry> {
    let corrupt = |reason: &str| PackError::CorruptEntry {
        offset,
        reason: reason.into(),
    };
    let body_end = data.len() - CHECKSUM_LEN;
    let start = usize::try_from(offset)
        .ok()
        .filter(|&s| s >= PACK_HEADER_LEN && s < body_end)
        .ok_or_else(|| corrupt("offset beyond pack data"))?;
    let input = &data[start..body_end];

    let mut inflater = Decompress::new(true);
    let mut tagged = Vec::with_capacity(4096);
    loop {
        if tagged.len() == tagged.capacity() {
            tagged.reserve(tagged.capacity().max(4096));
        }
        let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
        let status = inflater
            .decompress_vec(
                &input[before_in as usize..],
                &mut tagged,
                FlushDecompress::None,
            )
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if inflater.total_in() == before_in && inflater.total_out() == before_out {
                    return Err(corrupt("truncated compressed stream"));
                }
            }
        }
    }

    let (kind, size, header_len) =
        parse_object_header(&tagged).ok_or_else(|| corrupt("malformed object header"))?;
    if (tagged.len() - header_len) as u64 != size {
        return Err(PackError::CorruptEntry {
            offset,
            reason: format!(
                "size mismatch: expected {size}, got {}",
                tagged.len() - header_len
            ),
        });
    }

    let compressed_len = inflater.total_in();
    let crc32 = crc32fast::hash(&input[..compressed_len as usize]);
    // The inflated bytes are exactly the hashed sequence.
    let id = ObjectId::from_bytes(&tagged);
    let data = tagged.split_off(header_len);

    Ok(InflatedEntry {
        id,
        object: RawObject::new(kind, data),
        compressed_len,
        crc32,
    })
}
