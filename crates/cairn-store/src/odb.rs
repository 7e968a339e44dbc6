use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use cairn_crypto::ObjectHasher;
use cairn_pack::{PackFile, PackManager, RawObject};
use cairn_types::{ObjectId, ObjectKind};

use crate::checkin::{BulkCheckin, UnplugReport};
use crate::config::{StoreConfig, CONFIG_FILE};
use crate::durability::CommitOutcome;
use crate::error::{StoreError, StoreResult};
use crate::loose::LooseObjectStore;
use crate::pipeline::HashMode;
use crate::traits::ObjectLookup;

/// Where objects can be found: loose files and packs.
struct ObjectSources {
    loose: LooseObjectStore,
    packs: PackManager,
}

impl ObjectLookup for ObjectSources {
    fn has_object(&self, id: &ObjectId) -> bool {
        self.loose.contains(id) || self.packs.contains(id)
    }

    fn reprepare(&mut self) -> StoreResult<()> {
        self.packs.reprepare()?;
        Ok(())
    }
}

/// An on-disk object database.
///
/// Layout under the root directory:
///
/// ```text
/// config.toml
/// objects/<xx>/<rest-of-hex>    loose objects
/// objects/pack/pack-<hex>.pack  packs
/// objects/pack/pack-<hex>.idx   indexes for multi-object packs
/// ```
///
/// The handle owns the bulk check-in session, so plug state and the
/// pack being filled belong to this database alone.
pub struct ObjectDatabase {
    root: PathBuf,
    config: StoreConfig,
    sources: ObjectSources,
    checkin: BulkCheckin,
}

impl ObjectDatabase {
    /// Create the directory layout and write `config` to the root.
    pub fn init(root: &Path, config: StoreConfig) -> StoreResult<Self> {
        let config = config.normalized();
        config.validate()?;
        fs::create_dir_all(Self::pack_dir_in(root))?;
        config.save(&root.join(CONFIG_FILE))?;
        info!(root = %root.display(), "initialized object database");
        Self::with_config(root, config)
    }

    /// Open an existing database, reading its `config.toml` if present.
    pub fn open(root: &Path) -> StoreResult<Self> {
        let objects = root.join("objects");
        if !objects.is_dir() {
            return Err(StoreError::Config(format!(
                "{} is not an object database",
                root.display()
            )));
        }
        let config = StoreConfig::load_or_default(&root.join(CONFIG_FILE))?;
        Self::with_config(root, config)
    }

    /// Open with an explicit configuration, ignoring `config.toml`.
    pub fn with_config(root: &Path, config: StoreConfig) -> StoreResult<Self> {
        let config = config.normalized();
        config.validate()?;
        let pack_dir = Self::pack_dir_in(root);
        let sources = ObjectSources {
            loose: LooseObjectStore::new(root.join("objects")),
            packs: PackManager::load(&pack_dir)?,
        };
        debug!(
            root = %root.display(),
            packs = sources.packs.pack_count(),
            "opened object database"
        );
        Ok(Self {
            root: root.to_path_buf(),
            checkin: BulkCheckin::new(pack_dir, &config),
            config,
            sources,
        })
    }

    fn pack_dir_in(root: &Path) -> PathBuf {
        root.join("objects").join("pack")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn packs(&self) -> &PackManager {
        &self.sources.packs
    }

    pub fn loose(&self) -> &LooseObjectStore {
        &self.sources.loose
    }

    pub fn checkin(&self) -> &BulkCheckin {
        &self.checkin
    }

    /// Whether the object is stored, loose or packed.
    pub fn has_object(&self, id: &ObjectId) -> bool {
        self.sources.has_object(id)
    }

    /// Read an object, trying loose objects before packs.
    pub fn read_object(&self, id: &ObjectId) -> StoreResult<Option<RawObject>> {
        if let Some(obj) = self.sources.loose.read(id)? {
            return Ok(Some(obj));
        }
        Ok(self.sources.packs.read_object(id)?)
    }

    /// Like [`read_object`](Self::read_object), but a missing object is an
    /// error.
    pub fn require_object(&self, id: &ObjectId) -> StoreResult<RawObject> {
        self.read_object(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Compute an object's ID without storing it.
    pub fn hash_object(kind: ObjectKind, data: &[u8]) -> ObjectId {
        ObjectHasher::hash(kind, data)
    }

    /// Stream `size` bytes from `source` through bulk check-in.
    pub fn index_stream<R: Read + Seek + ?Sized>(
        &mut self,
        source: &mut R,
        size: u64,
        kind: ObjectKind,
        mode: HashMode,
    ) -> StoreResult<ObjectId> {
        self.checkin
            .index_bulk_checkin(&mut self.sources, source, size, kind, mode)
    }

    /// Check in the contents of a file.
    pub fn index_file(&mut self, path: &Path, kind: ObjectKind, mode: HashMode) -> StoreResult<ObjectId> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        self.index_stream(&mut file, size, kind, mode)
    }

    /// Write one object as a loose file.
    ///
    /// The commit honours the fsync policy; in batch mode while plugged the
    /// object only becomes visible after [`unplug`](Self::unplug).
    pub fn write_loose(
        &mut self,
        kind: ObjectKind,
        data: &[u8],
        mtime: Option<SystemTime>,
    ) -> StoreResult<ObjectId> {
        let (id, staged) = self
            .sources
            .loose
            .stage(kind, data, self.config.compression())?;
        match staged {
            Some(staged) => {
                if let CommitOutcome::Renamed(path) = self.checkin.commit_loose_object(staged, mtime)? {
                    debug!(%id, path = %path.display(), "wrote loose object");
                }
            }
            None => debug!(%id, "loose object already present"),
        }
        Ok(id)
    }

    pub fn is_plugged(&self) -> bool {
        self.checkin.is_plugged()
    }

    /// Start a bulk check-in batch.
    pub fn plug(&mut self) -> StoreResult<()> {
        self.checkin.plug()
    }

    /// End the batch: finalize the open pack and apply deferred renames.
    pub fn unplug(&mut self) -> StoreResult<UnplugReport> {
        self.checkin.unplug(&mut self.sources)
    }

    /// Packs finalized since the last call.
    pub fn take_finished_packs(&mut self) -> Vec<PackFile> {
        self.checkin.take_finished_packs()
    }

    /// Pick up packs written by other processes.
    pub fn reprepare(&mut self) -> StoreResult<()> {
        self.sources.reprepare()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn init_then_open_keeps_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            pack_size_limit: Some(1 << 20),
            ..StoreConfig::default()
        };
        ObjectDatabase::init(dir.path(), config.clone()).unwrap();
        assert!(dir.path().join("objects/pack").is_dir());

        let db = ObjectDatabase::open(dir.path()).unwrap();
        assert_eq!(db.config(), &config);
    }

    #[test]
    fn zero_limit_from_code_is_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            pack_size_limit: Some(0),
            ..StoreConfig::default()
        };
        let db = ObjectDatabase::init(dir.path(), config).unwrap();
        assert_eq!(db.config().pack_size_limit, None);
        assert_eq!(db.checkin().batch().size_limit(), None);
    }

    #[test]
    fn open_rejects_non_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ObjectDatabase::open(dir.path()),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn packed_object_readable_after_checkin() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = ObjectDatabase::init(dir.path(), StoreConfig::default()).unwrap();
        let data = b"streamed straight into a pack";
        let id = db
            .index_stream(
                &mut Cursor::new(data),
                data.len() as u64,
                ObjectKind::Blob,
                HashMode::Write,
            )
            .unwrap();

        assert!(db.has_object(&id));
        assert_eq!(db.packs().pack_count(), 1);
        let obj = db.require_object(&id).unwrap();
        assert_eq!(obj.data, data);
    }

    #[test]
    fn loose_object_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = ObjectDatabase::init(dir.path(), StoreConfig::default()).unwrap();
        let id = db.write_loose(ObjectKind::Tag, b"v1.0", None).unwrap();
        assert_eq!(id, ObjectDatabase::hash_object(ObjectKind::Tag, b"v1.0"));
        assert!(db.loose().contains(&id));

        let obj = db.read_object(&id).unwrap().unwrap();
        assert_eq!(obj.kind, ObjectKind::Tag);
        assert_eq!(obj.data, b"v1.0");
    }

    #[test]
    fn loose_object_skips_pack_checkin() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = ObjectDatabase::init(dir.path(), StoreConfig::default()).unwrap();
        let id = db.write_loose(ObjectKind::Blob, b"already here", None).unwrap();

        let again = db
            .index_stream(
                &mut Cursor::new(b"already here"),
                12,
                ObjectKind::Blob,
                HashMode::Write,
            )
            .unwrap();
        assert_eq!(again, id);
        assert_eq!(db.packs().pack_count(), 0);
        assert!(db.take_finished_packs().is_empty());
    }

    #[test]
    fn missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let db = ObjectDatabase::init(dir.path(), StoreConfig::default()).unwrap();
        let id = ObjectId::from_bytes(b"absent");
        assert!(db.read_object(&id).unwrap().is_none());
        assert!(matches!(db.require_object(&id), Err(StoreError::NotFound(_))));
    }
}
