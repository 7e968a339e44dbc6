//! Durable commits of loose object files.
//!
//! An object is written to a temporary file, flushed, and renamed into its
//! final path. While a bulk check-in is plugged in batch mode the expensive
//! part is deferred: each commit only writes back its pages and is queued,
//! and unplugging issues one hardware flush before replaying every queued
//! rename in commit order.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::config::FsyncObjectFiles;
use crate::error::{StoreError, StoreResult};
use crate::loose::StagedObject;

/// How hard to push data towards stable storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsyncMethod {
    /// Write dirty pages back to the device without a cache flush.
    WriteoutOnly,
    /// Full flush, including the device's write cache.
    HardwareFlush,
}

/// Flush `file` with the given method.
pub fn fsync(file: &File, path: &Path, method: FsyncMethod) -> StoreResult<()> {
    let result = match method {
        FsyncMethod::WriteoutOnly => file.sync_data(),
        FsyncMethod::HardwareFlush => file.sync_all(),
    };
    result.map_err(|source| StoreError::Fsync {
        path: path.to_path_buf(),
        source,
    })
}

/// What [`PendingRenames::commit`] did with an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The object is at its final path.
    Renamed(PathBuf),
    /// The rename is queued until the next flush.
    Deferred,
}

#[derive(Debug)]
struct PendingRename {
    temp: TempPath,
    target: PathBuf,
}

/// Renames queued while plugged, in commit order.
#[derive(Debug, Default)]
pub struct PendingRenames {
    queue: Vec<PendingRename>,
}

impl PendingRenames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Final paths of the queued objects, in commit order.
    pub fn targets(&self) -> impl Iterator<Item = &Path> {
        self.queue.iter().map(|p| p.target.as_path())
    }

    /// Durably commit a staged object.
    ///
    /// With `Batch` and `plugged` the object is written back and queued;
    /// otherwise it is flushed per `mode` and renamed immediately. `mtime`,
    /// if given, is applied to the file before it is moved; failing to set
    /// it only logs a warning.
    pub fn commit(
        &mut self,
        staged: StagedObject,
        mode: FsyncObjectFiles,
        plugged: bool,
        mtime: Option<SystemTime>,
    ) -> StoreResult<CommitOutcome> {
        let StagedObject {
            file, temp, target, ..
        } = staged;

        let defer = match mode {
            FsyncObjectFiles::Off => false,
            FsyncObjectFiles::Batch if plugged => {
                fsync(&file, &temp, FsyncMethod::WriteoutOnly)?;
                true
            }
            FsyncObjectFiles::On | FsyncObjectFiles::Batch => {
                fsync(&file, &temp, FsyncMethod::HardwareFlush)?;
                false
            }
        };

        if let Some(mtime) = mtime {
            if let Err(err) = file.set_modified(mtime) {
                warn!(path = %temp.display(), error = %err, "failed to set mtime");
            }
        }
        drop(file);

        if defer {
            debug!(target = %target.display(), "deferring rename until unplug");
            // Temp names are unique, so the queue never holds a path twice.
            self.queue.push(PendingRename { temp, target });
            return Ok(CommitOutcome::Deferred);
        }

        finalize_object_file(temp, &target)?;
        Ok(CommitOutcome::Renamed(target))
    }

    /// Flush the most recently committed object with a hardware barrier,
    /// then perform every queued rename in commit order.
    ///
    /// Returns the final paths, in the order they were renamed. If a rename
    /// fails, that object and every later one stay queued with their
    /// temporary files intact, and a later flush resumes from there.
    pub fn flush(&mut self) -> StoreResult<Vec<PathBuf>> {
        let Some(last) = self.queue.last() else {
            return Ok(Vec::new());
        };

        // Writeback already happened per object; one cache flush on the
        // device covers them all.
        let file = File::open(&last.temp)?;
        fsync(&file, &last.temp, FsyncMethod::HardwareFlush)?;
        drop(file);

        let mut renamed = Vec::with_capacity(self.queue.len());
        let mut queue = std::mem::take(&mut self.queue).into_iter();
        while let Some(PendingRename { temp, target }) = queue.next() {
            if let Err((err, temp)) = persist_object_file(temp, &target) {
                warn!(
                    renamed = renamed.len(),
                    remaining = queue.len() + 1,
                    error = %err,
                    "deferred rename failed"
                );
                self.queue.push(PendingRename { temp, target });
                self.queue.extend(queue);
                return Err(err);
            }
            renamed.push(target);
        }
        debug!(count = renamed.len(), "applied deferred renames");
        Ok(renamed)
    }
}

/// Move a committed temporary file to its final name.
fn finalize_object_file(temp: TempPath, target: &Path) -> StoreResult<()> {
    persist_object_file(temp, target).map_err(|(err, _)| err)
}

/// Like [`finalize_object_file`], but hands the temporary file back on
/// failure.
fn persist_object_file(temp: TempPath, target: &Path) -> Result<(), (StoreError, TempPath)> {
    let from = temp.to_path_buf();
    temp.persist(target).map_err(|e| {
        let err = StoreError::RenameFailed {
            from,
            to: target.to_path_buf(),
            source: e.error,
        };
        (err, e.path)
    })
}
