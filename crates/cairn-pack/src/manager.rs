use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cairn_types::ObjectId;

use crate::entry::RawObject;
use crate::error::PackResult;
use crate::reader::PackReader;

/// The set of packs in one pack directory.
pub struct PackManager {
    pack_dir: PathBuf,
    packs: Vec<PackReader>,
    loaded: HashSet<PathBuf>,
}

impl PackManager {
    /// Load all packs from `pack_dir`. A missing directory yields an empty
    /// set.
    pub fn load(pack_dir: &Path) -> PackResult<Self> {
        let mut mgr = Self {
            pack_dir: pack_dir.to_path_buf(),
            packs: Vec::new(),
            loaded: HashSet::new(),
        };
        mgr.reprepare()?;
        Ok(mgr)
    }

    /// Create an empty pack manager (for testing).
    pub fn empty() -> Self {
        Self {
            pack_dir: PathBuf::new(),
            packs: Vec::new(),
            loaded: HashSet::new(),
        }
    }

    pub fn pack_dir(&self) -> &Path {
        &self.pack_dir
    }

    /// Pick up packs that appeared since the last scan. Returns how many
    /// were added.
    pub fn reprepare(&mut self) -> PackResult<usize> {
        if self.pack_dir.as_os_str().is_empty() || !self.pack_dir.exists() {
            return Ok(0);
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.pack_dir)? {
            let path = entry?.path();
            if is_pack_name(&path) && !self.loaded.contains(&path) {
                found.push(path);
            }
        }
        found.sort();

        let mut added = 0;
        for path in found {
            match PackReader::open(&path) {
                Ok(reader) => {
                    self.packs.push(reader);
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!("skipping corrupt pack {:?}: {}", path, e);
                }
            }
            self.loaded.insert(path);
        }
        if added > 0 {
            tracing::debug!(added, total = self.packs.len(), "pack set refreshed");
        }
        Ok(added)
    }

    /// Read an object from any loaded pack.
    pub fn read_object(&self, id: &ObjectId) -> PackResult<Option<RawObject>> {
        for pack in &self.packs {
            if let Some(obj) = pack.read_object(id)? {
                return Ok(Some(obj));
            }
        }
        Ok(None)
    }

    /// Check containment across all packs.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.packs.iter().any(|p| p.contains(id))
    }

    /// Total objects across all packs.
    pub fn total_objects(&self) -> usize {
        self.packs.iter().map(|p| p.object_count()).sum()
    }

    /// Number of loaded packs.
    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    pub fn packs(&self) -> &[PackReader] {
        &self.packs
    }
}

/// `pack-<hex>.pack`; temporaries and stray files are ignored.
fn is_pack_name(path: &Path) -> bool {
    path.extension().map(|e| e == "pack").unwrap_or(false)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("pack-"))
            .unwrap_or(false)
}
