use std::fs;
use std::io;
use std::path::Path;

use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// File name of the configuration inside a database root.
pub const CONFIG_FILE: &str = "config.toml";

/// When loose object files are flushed to stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsyncObjectFiles {
    /// Never fsync; rely on the OS page cache.
    Off,
    /// Fsync every object before renaming it into place.
    #[default]
    On,
    /// Like `On`, but while plugged only write back each object and defer
    /// the hardware flush and renames to unplug.
    Batch,
}

/// Object database configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Largest pack the bulk writer may produce, in bytes. A pack's first
    /// object is always written even if it alone exceeds the limit.
    pub pack_size_limit: Option<u64>,
    /// zlib level, 0 through 9.
    pub compression_level: u32,
    pub fsync_object_files: FsyncObjectFiles,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pack_size_limit: None,
            compression_level: 6,
            fsync_object_files: FsyncObjectFiles::default(),
        }
    }
}

impl StoreConfig {
    /// Parse and validate a TOML document. A `pack_size_limit` of zero
    /// means no limit.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Canonical form: a zero `pack_size_limit` becomes no limit.
    pub fn normalized(mut self) -> Self {
        self.pack_size_limit = self.pack_size_limit.filter(|&limit| limit > 0);
        self
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.compression_level > 9 {
            return Err(StoreError::Config(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Load from `path`, falling back to defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> StoreResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    pub fn save(&self, path: &Path) -> StoreResult<()> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn compression(&self) -> Compression {
        Compression::new(self.compression_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.pack_size_limit, None);
        assert_eq!(c.compression_level, 6);
        assert_eq!(c.fsync_object_files, FsyncObjectFiles::On);
    }

    #[test]
    fn zero_limit_normalizes_to_none() {
        let c = StoreConfig {
            pack_size_limit: Some(0),
            ..StoreConfig::default()
        };
        assert_eq!(c.normalized().pack_size_limit, None);
        let c = StoreConfig {
            pack_size_limit: Some(4096),
            ..StoreConfig::default()
        };
        assert_eq!(c.normalized().pack_size_limit, Some(4096));
    }

    #[test]
    fn parse_full() {
        let c = StoreConfig::from_toml_str(
            r#"
            pack_size_limit = 1048576
            compression_level = 1
            fsync_object_files = "batch"
            "#,
        )
        .unwrap();
        assert_eq!(c.pack_size_limit, Some(1 << 20));
        assert_eq!(c.compression_level, 1);
        assert_eq!(c.fsync_object_files, FsyncObjectFiles::Batch);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let c = StoreConfig::from_toml_str("fsync_object_files = \"off\"").unwrap();
        assert_eq!(c.compression_level, 6);
        assert_eq!(c.fsync_object_files, FsyncObjectFiles::Off);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let c = StoreConfig::from_toml_str("pack_size_limit = 0").unwrap();
        assert_eq!(c.pack_size_limit, None);
    }

    #[test]
    fn rejects_bad_level_and_mode() {
        assert!(matches!(
            StoreConfig::from_toml_str("compression_level = 12"),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml_str("fsync_object_files = \"sometimes\""),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert_eq!(StoreConfig::load_or_default(&path).unwrap(), StoreConfig::default());

        let c = StoreConfig {
            pack_size_limit: Some(4096),
            compression_level: 9,
            fsync_object_files: FsyncObjectFiles::Batch,
        };
        c.save(&path).unwrap();
        assert_eq!(StoreConfig::load_or_default(&path).unwrap(), c);
    }
}
