use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use rand::{Rng, RngCore, SeedableRng};
use rand::rngs::StdRng;

use cairn_crypto::CHECKSUM_LEN;
use cairn_pack::{PackIndex, PackReader, PACK_HEADER_LEN};
use cairn_store::{
    FsyncObjectFiles, HashMode, ObjectDatabase, ObjectId, ObjectKind, PackFile, StoreConfig,
};

fn noise(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

fn open(dir: &Path, pack_size_limit: Option<u64>) -> ObjectDatabase {
    let config = StoreConfig {
        pack_size_limit,
        ..StoreConfig::default()
    };
    ObjectDatabase::init(dir, config).unwrap()
}

fn checkin(db: &mut ObjectDatabase, data: &[u8]) -> ObjectId {
    db.index_stream(
        &mut Cursor::new(data),
        data.len() as u64,
        ObjectKind::Blob,
        HashMode::Write,
    )
    .unwrap()
}

fn pack_files(dir: &Path) -> Vec<PathBuf> {
    let mut packs: Vec<_> = fs::read_dir(dir.join("objects/pack"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map(|e| e == "pack").unwrap_or(false))
        .collect();
    packs.sort();
    packs
}

fn no_temporaries(dir: &Path) {
    for entry in fs::read_dir(dir.join("objects/pack")).unwrap() {
        let name = entry.unwrap().file_name();
        assert!(
            !name.to_string_lossy().starts_with("tmp_"),
            "leftover temporary {name:?}"
        );
    }
}

#[test]
fn hash_only_matches_tagged_hash() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path(), None);
    let data = noise(&mut StdRng::seed_from_u64(1), 50_000);

    let hash = |db: &mut ObjectDatabase| {
        db.index_stream(
            &mut Cursor::new(&data),
            data.len() as u64,
            ObjectKind::Commit,
            HashMode::HashOnly,
        )
        .unwrap()
    };
    let first = hash(&mut db);
    let second = hash(&mut db);
    assert_eq!(first, second);

    let mut tagged = format!("commit {}\0", data.len()).into_bytes();
    tagged.extend_from_slice(&data);
    assert_eq!(first, ObjectId::from_bytes(&tagged));

    assert!(!db.has_object(&first));
    assert!(pack_files(dir.path()).is_empty());
}

#[test]
fn plugged_batch_without_limit_makes_one_pack() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path(), None);
    let mut rng = StdRng::seed_from_u64(2);

    db.plug().unwrap();
    let objects: Vec<Vec<u8>> = (0..20)
        .map(|i| noise(&mut rng, 1_000 + i * 3_000))
        .collect();
    let ids: Vec<ObjectId> = objects.iter().map(|o| checkin(&mut db, o)).collect();
    assert!(pack_files(dir.path()).is_empty());

    let report = db.unplug().unwrap();
    assert_eq!(report.packs.len(), 1);
    let pack = &report.packs[0];
    assert_eq!(pack.object_ids, ids);
    assert_eq!(pack_files(dir.path()), vec![pack.pack_path.clone()]);
    no_temporaries(dir.path());

    let index = PackIndex::open(pack.index_path.as_ref().unwrap()).unwrap();
    assert_eq!(index.object_count(), 20);
    let offsets: Vec<u64> = ids.iter().map(|id| index.lookup(id).unwrap().0).collect();
    assert_eq!(offsets[0], PACK_HEADER_LEN as u64);
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));

    // Each offset inflates to the object it names.
    let reader = PackReader::open(&pack.pack_path).unwrap();
    reader.verify().unwrap();
    for (id, data) in ids.iter().zip(&objects) {
        assert_eq!(&reader.read_object(id).unwrap().unwrap().data, data);
        assert!(db.has_object(id));
    }
}

#[test]
fn size_limit_splits_packs_without_losing_objects() {
    let dir = tempfile::tempdir().unwrap();
    let limit = 64 * 1024;
    let mut db = open(dir.path(), Some(limit));
    let mut rng = StdRng::seed_from_u64(3);

    db.plug().unwrap();
    let objects: Vec<Vec<u8>> = (0..40)
        .map(|_| {
            let len = rng.gen_range(2_000..40_000);
            noise(&mut rng, len)
        })
        .collect();
    let ids: Vec<ObjectId> = objects.iter().map(|o| checkin(&mut db, o)).collect();
    let report = db.unplug().unwrap();

    assert!(report.packs.len() >= 2);
    let written: Vec<ObjectId> = report
        .packs
        .iter()
        .flat_map(|p: &PackFile| p.object_ids.iter().copied())
        .collect();
    assert_eq!(written, ids);
    assert_eq!(written.iter().collect::<HashSet<_>>().len(), ids.len());

    for pack in &report.packs {
        let len = fs::metadata(&pack.pack_path).unwrap().len();
        if pack.object_count() > 1 {
            assert!(len - CHECKSUM_LEN as u64 <= limit, "{len} over limit");
        }
        let reader = PackReader::open(&pack.pack_path).unwrap();
        reader.verify().unwrap();
        assert_eq!(reader.object_count(), pack.object_count());
    }
    no_temporaries(dir.path());

    for (id, data) in ids.iter().zip(&objects) {
        assert_eq!(&db.require_object(id).unwrap().data, data);
    }
}

#[test]
fn oversized_object_gets_its_own_pack() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path(), Some(1024));
    let data = noise(&mut StdRng::seed_from_u64(4), 100_000);

    let id = checkin(&mut db, &data);
    let packs = db.take_finished_packs();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].object_ids, vec![id]);
    assert!(packs[0].index_path.is_none());
    assert_eq!(pack_files(dir.path()).len(), 1);
    assert_eq!(db.require_object(&id).unwrap().data, data);
}

#[test]
fn oversized_object_mid_batch_moves_to_next_pack() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path(), Some(8 * 1024));
    let mut rng = StdRng::seed_from_u64(5);

    db.plug().unwrap();
    let small = checkin(&mut db, &noise(&mut rng, 100));
    let big = checkin(&mut db, &noise(&mut rng, 100_000));
    let report = db.unplug().unwrap();

    let layout: Vec<Vec<ObjectId>> = report.packs.iter().map(|p| p.object_ids.clone()).collect();
    assert_eq!(layout, vec![vec![small], vec![big]]);
}

#[test]
fn duplicates_are_stored_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path(), None);

    db.plug().unwrap();
    let a = checkin(&mut db, b"alpha");
    let b = checkin(&mut db, b"beta");
    let a_again = checkin(&mut db, b"alpha");
    let report = db.unplug().unwrap();
    assert_eq!(a, a_again);
    assert_eq!(report.packs[0].object_ids, vec![a, b]);

    // Already packed: a later batch keeps nothing.
    db.plug().unwrap();
    checkin(&mut db, b"beta");
    let report = db.unplug().unwrap();
    assert!(report.packs.is_empty());
    assert_eq!(pack_files(dir.path()).len(), 1);
    no_temporaries(dir.path());
}

#[test]
fn empty_object_checks_in() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path(), None);
    let id = checkin(&mut db, b"");
    assert_eq!(id, ObjectId::from_bytes(b"blob 0\0"));
    let obj = db.require_object(&id).unwrap();
    assert!(obj.data.is_empty());
}

fn batch_db(dir: &Path) -> ObjectDatabase {
    let config = StoreConfig {
        fsync_object_files: FsyncObjectFiles::Batch,
        ..StoreConfig::default()
    };
    ObjectDatabase::init(dir, config).unwrap()
}

#[test]
fn plugged_loose_objects_renamed_in_commit_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = batch_db(dir.path());

    db.plug().unwrap();
    let ids: Vec<ObjectId> = [&b"one"[..], b"two", b"three"]
        .iter()
        .map(|data| db.write_loose(ObjectKind::Blob, data, None).unwrap())
        .collect();
    let targets: Vec<PathBuf> = ids.iter().map(|id| db.loose().path_for(id)).collect();
    assert!(targets.iter().all(|t| !t.exists()));
    assert_eq!(db.checkin().pending_renames().len(), 3);

    let report = db.unplug().unwrap();
    assert_eq!(report.renamed, targets);
    assert!(report.packs.is_empty());
    for (id, target) in ids.iter().zip(&targets) {
        assert!(target.exists());
        assert!(db.has_object(id));
    }
}

#[test]
fn crash_before_unplug_renames_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = batch_db(dir.path());

    db.plug().unwrap();
    let ids: Vec<ObjectId> = [&b"one"[..], b"two", b"three"]
        .iter()
        .map(|data| db.write_loose(ObjectKind::Blob, data, None).unwrap())
        .collect();
    checkin(&mut db, b"packed but never sealed");
    drop(db);

    let db = ObjectDatabase::open(dir.path()).unwrap();
    for id in &ids {
        assert!(!db.has_object(id));
        assert!(!db.loose().path_for(id).exists());
    }
    assert!(pack_files(dir.path()).is_empty());
    no_temporaries(dir.path());
}

#[test]
fn failed_unplug_stays_plugged_and_keeps_commit_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = batch_db(dir.path());

    db.plug().unwrap();
    let earlier = db.write_loose(ObjectKind::Blob, b"earlier", None).unwrap();
    checkin(&mut db, b"packed");
    // Sealing the pack needs its directory.
    fs::remove_dir_all(dir.path().join("objects/pack")).unwrap();

    let err = db.unplug().unwrap_err();
    assert!(err.is_fatal(), "{err}");
    assert!(db.is_plugged());
    assert_eq!(db.checkin().pending_renames().len(), 1);

    // Still deferred, so it cannot overtake the earlier object.
    let later = db.write_loose(ObjectKind::Blob, b"later", None).unwrap();
    assert!(!db.has_object(&later));
    assert!(!db.has_object(&earlier));

    let report = db.unplug().unwrap();
    assert_eq!(
        report.renamed,
        vec![db.loose().path_for(&earlier), db.loose().path_for(&later)]
    );
    assert!(!db.is_plugged());
    assert!(db.has_object(&earlier) && db.has_object(&later));
}

#[test]
fn zero_pack_size_limit_means_unlimited() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path(), Some(0));
    let mut rng = StdRng::seed_from_u64(6);

    db.plug().unwrap();
    let ids: Vec<ObjectId> = (0..5).map(|_| checkin(&mut db, &noise(&mut rng, 4_000))).collect();
    let report = db.unplug().unwrap();
    assert_eq!(report.packs.len(), 1);
    assert_eq!(report.packs[0].object_ids, ids);
}
