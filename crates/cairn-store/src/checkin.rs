use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::Compression;
use serde::Serialize;
use tracing::{debug, info, warn};

use cairn_crypto::ObjectHasher;
use cairn_pack::{PackEntry, PackFile};
use cairn_types::{ObjectId, ObjectKind};

use crate::batch::{FinishOutcome, PackBatch};
use crate::config::{FsyncObjectFiles, StoreConfig};
use crate::durability::{CommitOutcome, PendingRenames};
use crate::error::{StoreError, StoreResult};
use crate::loose::StagedObject;
use crate::pipeline::{hash_stream, stream_to_pack, HashMode, StreamOutcome};
use crate::traits::ObjectLookup;

/// What an unplug made durable.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UnplugReport {
    /// Loose objects renamed into place, in commit order.
    pub renamed: Vec<PathBuf>,
    /// Packs finalized since the last report, oldest first.
    pub packs: Vec<PackFile>,
}

/// Bulk check-in session state.
///
/// Objects streamed in are appended to one temporary pack. Unplugged, the
/// pack is finalized after every object; while plugged it keeps growing
/// (splitting at the size limit) until [`unplug`](Self::unplug). Loose
/// object commits made while plugged in batch fsync mode are deferred to
/// unplug as well.
pub struct BulkCheckin {
    batch: PackBatch,
    plugged: bool,
    renames: PendingRenames,
    compression: Compression,
    fsync_object_files: FsyncObjectFiles,
    finished: Vec<PackFile>,
}

impl BulkCheckin {
    pub fn new(pack_dir: impl Into<PathBuf>, config: &StoreConfig) -> Self {
        Self {
            batch: PackBatch::new(pack_dir, config.clone().normalized().pack_size_limit),
            plugged: false,
            renames: PendingRenames::new(),
            compression: config.compression(),
            fsync_object_files: config.fsync_object_files,
            finished: Vec::new(),
        }
    }

    pub fn pack_dir(&self) -> &Path {
        self.batch.pack_dir()
    }

    pub fn is_plugged(&self) -> bool {
        self.plugged
    }

    /// Loose object renames waiting for unplug.
    pub fn pending_renames(&self) -> &PendingRenames {
        &self.renames
    }

    pub fn batch(&self) -> &PackBatch {
        &self.batch
    }

    /// Start deferring pack finalization and batched fsyncs.
    pub fn plug(&mut self) -> StoreResult<()> {
        if self.plugged {
            return Err(StoreError::AlreadyPlugged);
        }
        self.plugged = true;
        debug!("bulk check-in plugged");
        Ok(())
    }

    /// Finalize the open pack, then flush and rename every deferred loose
    /// object in commit order.
    ///
    /// The session stays plugged until both steps succeed, so commits made
    /// after a failed unplug are still queued behind the earlier ones and
    /// `unplug` can be retried.
    pub fn unplug(&mut self, lookup: &mut dyn ObjectLookup) -> StoreResult<UnplugReport> {
        if !self.plugged {
            return Err(StoreError::NotPlugged);
        }
        self.finish_bulk_checkin(lookup)?;
        let renamed = self.renames.flush()?;
        self.plugged = false;

        let report = UnplugReport {
            renamed,
            packs: self.take_finished_packs(),
        };
        info!(
            renamed = report.renamed.len(),
            packs = report.packs.len(),
            "bulk check-in unplugged"
        );
        Ok(report)
    }

    /// Packs finalized since the last call, oldest first.
    pub fn take_finished_packs(&mut self) -> Vec<PackFile> {
        std::mem::take(&mut self.finished)
    }

    /// Check in `size` bytes read from `source` as one object.
    ///
    /// The source must be positioned at the start of the object; it is
    /// rewound to that position whenever the object has to move to a new
    /// pack. Returns the object's ID, including when it was a duplicate
    /// and nothing was kept.
    pub fn index_bulk_checkin<R: Read + Seek + ?Sized>(
        &mut self,
        lookup: &mut dyn ObjectLookup,
        source: &mut R,
        size: u64,
        kind: ObjectKind,
        mode: HashMode,
    ) -> StoreResult<ObjectId> {
        let result = self.deflate_to_pack(lookup, source, size, kind, mode);
        if !self.plugged {
            self.finish_bulk_checkin(lookup)?;
        }
        result
    }

    fn deflate_to_pack<R: Read + Seek + ?Sized>(
        &mut self,
        lookup: &mut dyn ObjectLookup,
        source: &mut R,
        size: u64,
        kind: ObjectKind,
        mode: HashMode,
    ) -> StoreResult<ObjectId> {
        let mut hasher = ObjectHasher::new(kind, size);
        if mode == HashMode::HashOnly {
            hash_stream(source, &mut hasher, size)?;
            return Ok(hasher.finalize());
        }

        let seekback = source.stream_position().map_err(StoreError::CannotSeek)?;
        let mut already_hashed_to = 0u64;
        let (checkpoint, offset) = loop {
            let (checkpoint, offset) = self.batch.begin_object()?;
            let outcome = stream_to_pack(
                &mut self.batch,
                &mut hasher,
                &mut already_hashed_to,
                source,
                kind,
                size,
                self.compression,
            );
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Drop the partial entry; earlier objects stay unless
                    // the rollback itself fails.
                    if let Err(rollback) = self.batch.truncate(&checkpoint) {
                        let lost = self.batch.abandon();
                        warn!(error = %rollback, lost, "could not roll back pack, abandoned it");
                    }
                    return Err(err);
                }
            };
            if outcome == StreamOutcome::Completed {
                break (checkpoint, offset);
            }

            // Too big for the current pack: drop what was written of this
            // object, seal the pack, and start the object over in a new one.
            self.batch.truncate(&checkpoint)?;
            info!(
                objects = self.batch.nr_written(),
                bytes = checkpoint.offset(),
                "pack size limit reached, starting a new pack"
            );
            self.finish_bulk_checkin(lookup)?;
            source
                .seek(SeekFrom::Start(seekback))
                .map_err(StoreError::CannotSeek)?;
        };

        let id = hasher.finalize();
        let crc32 = self.batch.crc32_end();
        if self.batch.already_written(&id, lookup) {
            self.batch.truncate(&checkpoint)?;
            debug!(%id, "object already stored, dropped from pack");
        } else {
            self.batch.record(PackEntry { id, offset, crc32 });
        }
        Ok(id)
    }

    /// Seal the open pack, if any, and make its objects visible.
    fn finish_bulk_checkin(&mut self, lookup: &mut dyn ObjectLookup) -> StoreResult<()> {
        match self.batch.finish()? {
            FinishOutcome::Idle => return Ok(()),
            FinishOutcome::Discarded => {}
            FinishOutcome::Finalized(pack) => self.finished.push(pack),
        }
        lookup.reprepare()
    }

    /// Durably commit a staged loose object, deferring the rename while
    /// plugged in batch mode.
    pub fn commit_loose_object(
        &mut self,
        staged: StagedObject,
        mtime: Option<SystemTime>,
    ) -> StoreResult<CommitOutcome> {
        self.renames
            .commit(staged, self.fsync_object_files, self.plugged, mtime)
    }
}
