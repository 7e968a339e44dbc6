//! Pack file format for the Cairn object store.
//!
//! A pack is a sequence of zlib-deflated objects written as they stream in,
//! so it can be assembled without knowing its contents up front.
//!
//! # Layout
//!
//! - **Pack file** (`.pack`): `CRNP` header with version and object count,
//!   the deflated entries, then a BLAKE3 checksum of everything before it
//! - **Pack index** (`.idx`): chunked container holding a fan-out table,
//!   sorted IDs, CRC32s, and offsets; written for packs of two or more
//!   objects
//! - **PackStream**: a pack under construction in a temporary file
//! - **PackReader**: random-access reading through the index
//! - **PackManager**: all packs in a directory

pub mod entry;
pub mod error;
pub mod format;
pub mod index;
pub mod manager;
pub mod reader;
pub mod writer;

pub use entry::{PackEntry, RawObject};
pub use error::{PackError, PackResult};
pub use format::{pack_file_name, PackHeader, PACK_HEADER_LEN};
pub use index::PackIndex;
pub use manager::PackManager;
pub use reader::PackReader;
pub use writer::{PackFile, PackStream};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::deflate_entry;
    use cairn_types::{ObjectId, ObjectKind};

    #[test]
    fn disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let objects = [
            (ObjectKind::Blob, b"disk roundtrip".to_vec()),
            (ObjectKind::Tree, b"tree".to_vec()),
            (ObjectKind::Tag, Vec::new()),
        ];

        let mut stream = PackStream::create(dir.path()).unwrap();
        let mut entries = Vec::new();
        for (kind, data) in &objects {
            let offset = stream.offset();
            stream.crc32_begin();
            let (id, bytes) = deflate_entry(*kind, data);
            stream.write(&bytes).unwrap();
            entries.push(PackEntry {
                id,
                offset,
                crc32: stream.crc32_end(),
            });
        }
        let pack = stream.finish(dir.path(), &entries).unwrap();
        assert_eq!(pack.object_count(), 3);
        assert!(pack.index_path.as_ref().unwrap().exists());

        let reader = PackReader::open(&pack.pack_path).unwrap();
        reader.verify().unwrap();
        assert_eq!(reader.checksum(), pack.checksum);
        for (entry, (kind, data)) in entries.iter().zip(&objects) {
            let obj = reader.read_object(&entry.id).unwrap().unwrap();
            assert_eq!(obj.kind, *kind);
            assert_eq!(&obj.data, data);
            assert_eq!(obj.compute_id(), entry.id);
        }
        assert!(reader
            .read_object(&ObjectId::from_bytes(b"absent"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn pack_bad_magic() {
        let mut data = vec![0u8; 100];
        data[0..4].copy_from_slice(b"BADM");
        let err = PackReader::from_bytes(data, None).unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn pack_bad_version() {
        let mut data = vec![0u8; 100];
        data[0..4].copy_from_slice(b"CRNP");
        data[4..8].copy_from_slice(&99u32.to_be_bytes());
        let err = PackReader::from_bytes(data, None).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedVersion(99)));
    }
}
