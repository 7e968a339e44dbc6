use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use cairn_crypto::Checkpoint;
use cairn_pack::{PackEntry, PackFile, PackStream};
use cairn_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectLookup;

/// Whether a batch currently has a temporary pack open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Empty,
    Open,
}

/// What finishing a batch did.
#[derive(Debug)]
pub enum FinishOutcome {
    /// No pack was open.
    Idle,
    /// A pack was open but every object in it was dropped.
    Discarded,
    Finalized(PackFile),
}

/// The pack currently being filled by bulk check-in.
///
/// The temporary pack is created on the first object that needs writing and
/// lives until [`finish`](Self::finish), which either promotes it to a
/// permanent pack or, if nothing was kept, unlinks it.
pub struct PackBatch {
    pack_dir: PathBuf,
    stream: Option<PackStream>,
    written: Vec<PackEntry>,
    written_ids: HashSet<ObjectId>,
    size_limit: Option<u64>,
}

impl PackBatch {
    pub fn new(pack_dir: impl Into<PathBuf>, size_limit: Option<u64>) -> Self {
        Self {
            pack_dir: pack_dir.into(),
            stream: None,
            written: Vec::new(),
            written_ids: HashSet::new(),
            size_limit,
        }
    }

    pub fn pack_dir(&self) -> &Path {
        &self.pack_dir
    }

    pub fn state(&self) -> BatchState {
        if self.stream.is_some() {
            BatchState::Open
        } else {
            BatchState::Empty
        }
    }

    pub fn size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    /// Objects kept in the current pack.
    pub fn nr_written(&self) -> usize {
        self.written.len()
    }

    pub fn entries(&self) -> &[PackEntry] {
        &self.written
    }

    /// Bytes in the current pack, trailer excluded; zero when empty.
    pub fn offset(&self) -> u64 {
        self.stream.as_ref().map(PackStream::offset).unwrap_or(0)
    }

    fn prepare_to_stream(&mut self) -> StoreResult<&mut PackStream> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => PackStream::create(&self.pack_dir).map_err(StoreError::PackWrite)?,
        };
        Ok(self.stream.insert(stream))
    }

    /// Open the pack if needed and mark the start of a new object.
    ///
    /// Returns the rollback point and the object's offset in the pack.
    pub fn begin_object(&mut self) -> StoreResult<(Checkpoint, u64)> {
        let stream = self.prepare_to_stream()?;
        let checkpoint = stream.checkpoint();
        let offset = stream.offset();
        stream.crc32_begin();
        Ok((checkpoint, offset))
    }

    /// Whether appending `pending` more bytes would break the size limit.
    ///
    /// Never true while the pack holds no objects, so a pack always takes
    /// at least one object however large.
    pub fn would_exceed(&self, pending: usize) -> bool {
        match self.size_limit {
            Some(limit) if !self.written.is_empty() => self.offset() + pending as u64 > limit,
            _ => false,
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> StoreResult<()> {
        self.prepare_to_stream()?
            .write(buf)
            .map_err(StoreError::PackWrite)
    }

    /// Roll the pack back to `checkpoint`.
    pub fn truncate(&mut self, checkpoint: &Checkpoint) -> StoreResult<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream.truncate(checkpoint).map_err(StoreError::PackWrite)?;
        }
        Ok(())
    }

    /// Throw away the open pack and everything recorded in it.
    ///
    /// Returns how many kept objects were lost with it.
    pub fn abandon(&mut self) -> usize {
        let lost = self.written.len();
        // Dropping the stream unlinks its temporary file.
        self.stream = None;
        self.written.clear();
        self.written_ids.clear();
        lost
    }

    /// CRC32 of the current object's bytes.
    pub fn crc32_end(&mut self) -> u32 {
        self.stream.as_mut().map(PackStream::crc32_end).unwrap_or(0)
    }

    /// Whether `id` is already stored or already in this pack.
    pub fn already_written(&self, id: &ObjectId, lookup: &dyn ObjectLookup) -> bool {
        lookup.has_object(id) || self.written_ids.contains(id)
    }

    pub fn record(&mut self, entry: PackEntry) {
        self.written_ids.insert(entry.id);
        self.written.push(entry);
    }

    /// Close out the current pack and reset to empty.
    pub fn finish(&mut self) -> StoreResult<FinishOutcome> {
        let Some(stream) = self.stream.take() else {
            return Ok(FinishOutcome::Idle);
        };
        let written = std::mem::take(&mut self.written);
        self.written_ids.clear();

        if written.is_empty() {
            stream.discard().map_err(StoreError::PackWrite)?;
            return Ok(FinishOutcome::Discarded);
        }

        let pack = stream
            .finish(&self.pack_dir, &written)
            .map_err(StoreError::PackWrite)?;
        debug!(
            pack = %pack.pack_path.display(),
            objects = pack.object_count(),
            "bulk check-in pack written"
        );
        Ok(FinishOutcome::Finalized(pack))
    }
}
