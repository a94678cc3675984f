//! Manifest
//!
//! Records the on-disk geometry of a store so that reopening it with an
//! incompatible config fails at init instead of misreading the tiers.
//!
//! ## File Format
//! ```text
//! ┌────────────┬──────────┬────────────┬───────────────────────────┐
//! │ magic (4)  │ crc (4)  │ length (4) │ payload (bincode)         │
//! └────────────┴──────────┴────────────┴───────────────────────────┘
//! ```
//! `crc` covers the payload. Writes go to `MANIFEST.tmp` and are renamed
//! into place.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{PlateError, Result};
use crate::record::RECORD_SIZE;

pub const MANIFEST_FILENAME: &str = "MANIFEST";
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";
const MAGIC: &[u8; 4] = b"PLDB";
const HEADER_SIZE: usize = 12;

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub record_size: u32,
    pub shards: u32,
    pub buffers_per_shard: u32,
    pub buffer_capacity: u32,
}

impl Manifest {
    /// Geometry described by `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            version: MANIFEST_VERSION,
            record_size: RECORD_SIZE as u32,
            shards: config.shards as u32,
            buffers_per_shard: config.buffers_per_shard as u32,
            buffer_capacity: config.buffer_capacity as u32,
        }
    }

    /// Load the manifest in `dir` and check it against `config`, or write a
    /// new one if the store is fresh
    pub fn load_or_create(dir: &Path, config: &Config) -> Result<Self> {
        let expected = Self::from_config(config);
        let path = dir.join(MANIFEST_FILENAME);

        if !path.exists() {
            expected.write(dir)?;
            tracing::debug!(path = %path.display(), "Created manifest");
            return Ok(expected);
        }

        let found = Self::read(&path)?;
        if found != expected {
            return Err(PlateError::Config(format!(
                "store at {} has geometry {:?}, config requires {:?}",
                dir.display(),
                found,
                expected
            )));
        }
        Ok(found)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_SIZE {
            return Err(PlateError::ManifestCorruption(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(PlateError::ManifestCorruption("bad magic".to_string()));
        }

        let crc = le_u32(&bytes, 4)?;
        let len = le_u32(&bytes, 8)? as usize;
        let payload = bytes.get(HEADER_SIZE..HEADER_SIZE + len).ok_or_else(|| {
            PlateError::ManifestCorruption(format!("payload truncated, expected {} bytes", len))
        })?;

        let actual = crc32fast::hash(payload);
        if actual != crc {
            return Err(PlateError::ManifestCorruption(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                crc, actual
            )));
        }

        bincode::deserialize(payload).map_err(|e| PlateError::ManifestCorruption(e.to_string()))
    }

    /// Atomically replace the manifest in `dir`
    pub fn write(&self, dir: &Path) -> Result<()> {
        let payload =
            bincode::serialize(self).map_err(|e| PlateError::Serialization(e.to_string()))?;

        let tmp_path = dir.join(MANIFEST_TMP_FILENAME);
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(MAGIC)?;
            writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
            writer.write_all(&(payload.len() as u32).to_le_bytes())?;
            writer.write_all(&payload)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, dir.join(MANIFEST_FILENAME))?;
        Ok(())
    }
}

fn le_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .and_then(|field| field.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| PlateError::ManifestCorruption(format!("header truncated at byte {}", at)))
}
