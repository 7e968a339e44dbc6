use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tempfile::TempPath;

use cairn_crypto::{object_header, parse_object_header, ObjectHasher};
use cairn_pack::RawObject;
use cairn_types::{ObjectId, ObjectKind};

use crate::error::{StoreError, StoreResult};

/// A loose object written to a temporary file, waiting to be committed.
///
/// Dropping it unlinks the temporary file.
#[derive(Debug)]
pub struct StagedObject {
    pub(crate) id: ObjectId,
    pub(crate) file: File,
    pub(crate) temp: TempPath,
    pub(crate) target: PathBuf,
}

impl StagedObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Where the object lands once committed.
    pub fn target(&self) -> &Path {
        &self.target
    }
}

/// Individually stored objects under `objects/<xx>/<rest-of-hex>`.
///
/// Each file holds the zlib-deflated tagged byte sequence, so the file
/// name can always be recomputed from the inflated contents.
#[derive(Clone, Debug)]
pub struct LooseObjectStore {
    objects_dir: PathBuf,
}

impl LooseObjectStore {
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Final path of the object file for `id`.
    pub fn path_for(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.loose_path_parts();
        self.objects_dir.join(dir).join(file)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.path_for(id).is_file()
    }

    /// Deflate an object into a temporary file next to its final path.
    ///
    /// Returns `None` when the object is already stored.
    pub fn stage(
        &self,
        kind: ObjectKind,
        data: &[u8],
        level: Compression,
    ) -> StoreResult<(ObjectId, Option<StagedObject>)> {
        let id = ObjectHasher::hash(kind, data);
        let target = self.path_for(&id);
        if target.is_file() {
            return Ok((id, None));
        }

        let dir = target.parent().unwrap_or(&self.objects_dir);
        fs::create_dir_all(dir)?;
        let (file, temp) = tempfile::Builder::new()
            .prefix("tmp_obj_")
            .tempfile_in(dir)?
            .into_parts();

        let mut encoder = ZlibEncoder::new(file, level);
        encoder.write_all(&object_header(kind, data.len() as u64))?;
        encoder.write_all(data)?;
        let file = encoder.finish()?;

        Ok((
            id,
            Some(StagedObject {
                id,
                file,
                temp,
                target,
            }),
        ))
    }

    /// Read and verify a loose object.
    pub fn read(&self, id: &ObjectId) -> StoreResult<Option<RawObject>> {
        let file = match File::open(self.path_for(id)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let corrupt = |reason: String| StoreError::CorruptObject { id: *id, reason };
        let mut tagged = Vec::new();
        ZlibDecoder::new(file)
            .read_to_end(&mut tagged)
            .map_err(|e| corrupt(format!("inflate failed: {e}")))?;

        let (kind, size, header_len) =
            parse_object_header(&tagged).ok_or_else(|| corrupt("malformed header".into()))?;
        if (tagged.len() - header_len) as u64 != size {
            return Err(corrupt(format!(
                "header claims {size} bytes, found {}",
                tagged.len() - header_len
            )));
        }
        if ObjectId::from_bytes(&tagged) != *id {
            return Err(corrupt("content does not hash to its name".into()));
        }

        let data = tagged.split_off(header_len);
        Ok(Some(RawObject::new(kind, data)))
    }
}
