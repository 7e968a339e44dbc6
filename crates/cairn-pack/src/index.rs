use std::fs::File;
use std::io::Write;
use std::path::Path;

use cairn_chunk::{chunk_id, ChunkWriter, TableOfContents};
use cairn_crypto::{ChecksumWriter, CHECKSUM_LEN};
use cairn_types::ObjectId;
use memmap2::Mmap;

use crate::entry::PackEntry;
use crate::error::{PackError, PackResult};
use crate::format::{read_be32, read_be64};

pub const INDEX_MAGIC: &[u8; 4] = b"CRNI";
pub const INDEX_VERSION: u32 = 1;
const INDEX_HEADER_LEN: usize = 12;

const CHUNK_FANOUT: u32 = chunk_id(b"OIDF");
const CHUNK_OID_LOOKUP: u32 = chunk_id(b"OIDL");
const CHUNK_CRC32: u32 = chunk_id(b"CRCS");
const CHUNK_OFFSETS: u32 = chunk_id(b"OFFS");
const CHUNK_PACK_CHECKSUM: u32 = chunk_id(b"PKCK");
const INDEX_CHUNKS: u32 = 5;

/// Pack index for fast random-access lookups.
///
/// Stored as a chunked container:
/// - `OIDF` fan-out table: 256 entries counting objects with first byte <= index
/// - `OIDL` sorted ObjectId array
/// - `CRCS` CRC32 array (parallel)
/// - `OFFS` offset array (parallel)
/// - `PKCK` checksum of the pack this index describes
#[derive(Clone, Debug)]
pub struct PackIndex {
    pub fan_out: [u32; 256],
    pub object_ids: Vec<ObjectId>,
    pub crc32s: Vec<u32>,
    pub offsets: Vec<u64>,
    pub pack_checksum: [u8; CHECKSUM_LEN],
}

impl PackIndex {
    /// Build an index from entries in any order and a pack checksum.
    pub fn build(mut entries: Vec<PackEntry>, pack_checksum: [u8; CHECKSUM_LEN]) -> Self {
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        let mut counts = [0u32; 256];
        for entry in &entries {
            counts[entry.id.first_byte() as usize] += 1;
        }
        let mut fan_out = [0u32; 256];
        let mut running = 0u32;
        for (slot, count) in fan_out.iter_mut().zip(counts) {
            running += count;
            *slot = running;
        }

        Self {
            fan_out,
            object_ids: entries.iter().map(|e| e.id).collect(),
            crc32s: entries.iter().map(|e| e.crc32).collect(),
            offsets: entries.iter().map(|e| e.offset).collect(),
            pack_checksum,
        }
    }

    /// Look up an object's (offset, crc32) by ID.
    pub fn lookup(&self, id: &ObjectId) -> Option<(u64, u32)> {
        let first_byte = id.first_byte() as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fan_out[first_byte - 1] as usize
        };
        let end = self.fan_out[first_byte] as usize;

        let range = self.object_ids.get(start..end)?;
        let pos = range.binary_search(id).ok()?;
        Some((self.offsets[start + pos], self.crc32s[start + pos]))
    }

    /// Total object count.
    pub fn object_count(&self) -> usize {
        self.object_ids.len()
    }

    /// Check if an object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// Entries in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = PackEntry> + '_ {
        self.object_ids
            .iter()
            .zip(&self.crc32s)
            .zip(&self.offsets)
            .map(|((id, crc32), offset)| PackEntry {
                id: *id,
                offset: *offset,
                crc32: *crc32,
            })
    }

    /// Serialize into `sink`, returning the checksum of the index file.
    pub fn write_to<W: Write>(&self, sink: W) -> PackResult<[u8; CHECKSUM_LEN]> {
        let n = self.object_count() as u64;
        let mut out = ChecksumWriter::new(sink);
        out.write_all(INDEX_MAGIC)?;
        out.write_all(&INDEX_VERSION.to_be_bytes())?;
        out.write_all(&INDEX_CHUNKS.to_be_bytes())?;

        let mut chunks = ChunkWriter::new();
        chunks.add_chunk(CHUNK_FANOUT, 256 * 4, |sink: &mut dyn Write| {
            self.fan_out
                .iter()
                .try_for_each(|count| sink.write_all(&count.to_be_bytes()))
        });
        chunks.add_chunk(
            CHUNK_OID_LOOKUP,
            n * ObjectId::LEN as u64,
            |sink: &mut dyn Write| {
                self.object_ids
                    .iter()
                    .try_for_each(|id| sink.write_all(id.as_bytes()))
            },
        );
        chunks.add_chunk(CHUNK_CRC32, n * 4, |sink: &mut dyn Write| {
            self.crc32s
                .iter()
                .try_for_each(|crc| sink.write_all(&crc.to_be_bytes()))
        });
        chunks.add_chunk(CHUNK_OFFSETS, n * 8, |sink: &mut dyn Write| {
            self.offsets
                .iter()
                .try_for_each(|offset| sink.write_all(&offset.to_be_bytes()))
        });
        chunks.add_chunk(
            CHUNK_PACK_CHECKSUM,
            CHECKSUM_LEN as u64,
            |sink: &mut dyn Write| sink.write_all(&self.pack_checksum),
        );
        chunks.write_to(&mut out, INDEX_HEADER_LEN as u64)?;

        let (_, checksum) = out.finish()?;
        Ok(checksum)
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> PackResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Memory-map and parse an index file.
    pub fn open(path: &Path) -> PackResult<Self> {
        let file = File::open(path)?;
        // SAFETY: index files are written to a temporary name and renamed
        // into place, so a mapped index is never modified underneath us.
        let map = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&map)
    }

    /// Check the header and trailing checksum of an index file and decode
    /// its table of contents.
    pub fn table_of_contents(data: &[u8]) -> PackResult<TableOfContents<'_>> {
        if data.len() < INDEX_HEADER_LEN + CHECKSUM_LEN {
            return Err(PackError::IndexCorrupted("too short".into()));
        }
        if &data[0..4] != INDEX_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(INDEX_MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_be32(&data[4..8]);
        if version != INDEX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let body_len = data.len() - CHECKSUM_LEN;
        if blake3::hash(&data[..body_len]).as_bytes() != &data[body_len..] {
            return Err(PackError::ChecksumMismatch("pack index".into()));
        }

        let nr_chunks = read_be32(&data[8..12]) as usize;
        Ok(TableOfContents::read(data, INDEX_HEADER_LEN as u64, nr_chunks)?)
    }

    /// Deserialize from bytes, verifying the trailing checksum.
    pub fn from_bytes(data: &[u8]) -> PackResult<Self> {
        let toc = Self::table_of_contents(data)?;
        let require = |id: u32, name: &str| {
            toc.pair_chunk(id)
                .ok_or_else(|| PackError::IndexCorrupted(format!("missing {name} chunk")))
        };

        let fan_out_bytes = require(CHUNK_FANOUT, "fan-out")?;
        if fan_out_bytes.len() != 256 * 4 {
            return Err(PackError::IndexCorrupted("fan-out truncated".into()));
        }
        let mut fan_out = [0u32; 256];
        for (slot, bytes) in fan_out.iter_mut().zip(fan_out_bytes.chunks_exact(4)) {
            *slot = read_be32(bytes);
        }
        if fan_out.windows(2).any(|w| w[0] > w[1]) {
            return Err(PackError::IndexCorrupted("fan-out not monotonic".into()));
        }

        let count = fan_out[255] as usize;
        let ids = require(CHUNK_OID_LOOKUP, "object id")?;
        let crcs = require(CHUNK_CRC32, "crc32")?;
        let offsets = require(CHUNK_OFFSETS, "offset")?;
        let pack_checksum = require(CHUNK_PACK_CHECKSUM, "pack checksum")?;
        if ids.len() != count * ObjectId::LEN
            || crcs.len() != count * 4
            || offsets.len() != count * 8
            || pack_checksum.len() != CHECKSUM_LEN
        {
            return Err(PackError::IndexCorrupted("chunk sizes disagree with fan-out".into()));
        }

        let object_ids = ids
            .chunks_exact(ObjectId::LEN)
            .map(ObjectId::from_slice)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PackError::IndexCorrupted(e.to_string()))?;
        if object_ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PackError::IndexCorrupted("object ids not sorted".into()));
        }

        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(pack_checksum);

        Ok(Self {
            fan_out,
            object_ids,
            crc32s: crcs.chunks_exact(4).map(read_be32).collect(),
            offsets: offsets.chunks_exact(8).map(read_be64).collect(),
            pack_checksum: checksum,
        })
    }
}
