use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempPath;
use tracing::debug;

use cairn_crypto::{checksum_reader, Checkpoint, ChecksumWriter, CHECKSUM_LEN};
use cairn_types::ObjectId;

use crate::entry::PackEntry;
use crate::error::{PackError, PackResult};
use crate::format::{pack_file_name, PackHeader};
use crate::index::PackIndex;

/// Result of finalizing a pack file.
#[derive(Clone, Debug, Serialize)]
pub struct PackFile {
    pub pack_path: PathBuf,
    /// Companion index; single-object packs are written without one.
    pub index_path: Option<PathBuf>,
    pub checksum: [u8; CHECKSUM_LEN],
    /// Objects in the order they were written.
    pub object_ids: Vec<ObjectId>,
}

impl PackFile {
    pub fn object_count(&self) -> usize {
        self.object_ids.len()
    }
}

/// A pack being assembled in a temporary file.
///
/// The header is written up front claiming a single object; packs that end
/// up holding more get their header and trailer patched on
/// [`finish`](Self::finish). Dropping an unfinished stream unlinks the
/// temporary file.
pub struct PackStream {
    writer: ChecksumWriter<File>,
    temp_path: TempPath,
}

impl PackStream {
    /// Create a temporary pack in `pack_dir` and write its header.
    pub fn create(pack_dir: &Path) -> PackResult<Self> {
        fs::create_dir_all(pack_dir)?;
        let (file, temp_path) = tempfile::Builder::new()
            .prefix("tmp_pack_")
            .tempfile_in(pack_dir)?
            .into_parts();

        let mut writer = ChecksumWriter::new(file);
        writer.write_all(&PackHeader::new(1).encode())?;
        debug!(path = %temp_path.display(), "opened temporary pack");
        Ok(Self { writer, temp_path })
    }

    /// Bytes written so far, header included, trailer excluded.
    pub fn offset(&self) -> u64 {
        self.writer.offset()
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn write(&mut self, buf: &[u8]) -> PackResult<()> {
        self.writer.write_all(buf)?;
        Ok(())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.writer.checkpoint()
    }

    /// Drop everything written after `checkpoint`.
    pub fn truncate(&mut self, checkpoint: &Checkpoint) -> PackResult<()> {
        self.writer.truncate(checkpoint)?;
        Ok(())
    }

    /// Start the CRC32 window for the next entry.
    pub fn crc32_begin(&mut self) {
        self.writer.crc32_begin();
    }

    /// CRC32 of the bytes written since [`crc32_begin`](Self::crc32_begin).
    pub fn crc32_end(&mut self) -> u32 {
        self.writer.crc32_end()
    }

    /// Close and unlink the temporary file.
    pub fn discard(self) -> PackResult<()> {
        let Self { writer, temp_path } = self;
        drop(writer.into_inner()?);
        debug!(path = %temp_path.display(), "discarded empty pack");
        temp_path.close()?;
        Ok(())
    }

    /// Seal the pack, move it to its permanent name in `pack_dir`, and
    /// write an index when it holds more than one object.
    ///
    /// `entries` must be in write order.
    pub fn finish(self, pack_dir: &Path, entries: &[PackEntry]) -> PackResult<PackFile> {
        let Self { writer, temp_path } = self;
        let end = writer.offset();

        let checksum = match entries.len() {
            0 => return Err(PackError::EmptyPack),
            1 => {
                // The header already claims one object; seal it in place.
                let (file, checksum) = writer.finish()?;
                file.sync_all()?;
                checksum
            }
            n => {
                let count = u32::try_from(n).map_err(|_| PackError::TooManyObjects(n))?;
                let mut file = writer.into_inner()?;
                fixup_header_footer(&mut file, count, end)?
            }
        };

        let pack_path = pack_dir.join(pack_file_name(&checksum));
        let index = if entries.len() > 1 {
            let index = PackIndex::build(entries.to_vec(), checksum);
            let mut tmp = tempfile::Builder::new()
                .prefix("tmp_idx_")
                .tempfile_in(pack_dir)?;
            index.write_to(&mut tmp)?;
            tmp.as_file().sync_all()?;
            Some(tmp.into_temp_path())
        } else {
            None
        };

        temp_path.persist(&pack_path).map_err(|e| e.error)?;
        let index_path = match index {
            Some(tmp) => {
                let path = pack_path.with_extension("idx");
                tmp.persist(&path).map_err(|e| e.error)?;
                Some(path)
            }
            None => None,
        };

        debug!(
            pack = %pack_path.display(),
            objects = entries.len(),
            bytes = end + CHECKSUM_LEN as u64,
            "pack finalized"
        );
        Ok(PackFile {
            pack_path,
            index_path,
            checksum,
            object_ids: entries.iter().map(|e| e.id).collect(),
        })
    }
}

/// Rewrite the object count in the header, then checksum the whole pack and
/// append the trailer.
fn fixup_header_footer(file: &mut File, object_count: u32, end: u64) -> PackResult<[u8; CHECKSUM_LEN]> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&PackHeader::new(object_count).encode())?;
    file.seek(SeekFrom::Start(0))?;
    let checksum = checksum_reader(file, end)?;
    file.seek(SeekFrom::Start(end))?;
    file.write_all(&checksum)?;
    file.sync_all()?;
    Ok(checksum)
}
