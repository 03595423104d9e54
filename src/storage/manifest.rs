use std::fs;
use std::io::Write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::SegmentId;

/// A segment listed in the manifest with the documents deleted from it since it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub id: SegmentId,
    pub deleted: Vec<u32>,
}

/// The committed state of the index. Replaced atomically on every commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generation: u64,
    pub segments: Vec<SegmentEntry>,
    pub timestamp: DateTime<Utc>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            generation: 0,
            segments: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

impl Manifest {
    /// Load manifest from disk
    pub fn load(storage: &StorageLayout) -> Result<Option<Self>> {
        let path = storage.manifest_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(path)?;
        let manifest = bincode::deserialize(&data)?;
        Ok(Some(manifest))
    }

    /// Save manifest through a temporary file and a rename.
    pub fn save(&self, storage: &StorageLayout) -> Result<()> {
        let data = bincode::serialize(self)?;
        let path = storage.manifest_path();
        let tmp = path.with_extension("bin.tmp");

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
