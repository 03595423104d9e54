use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::Result;

/// Empty sentinel file present while a full reindex is in progress.
///
/// Finding it at startup means the previous reindex never completed.
#[derive(Debug, Clone)]
pub struct ReindexMarker {
    path: PathBuf,
}

impl ReindexMarker {
    pub fn new(path: PathBuf) -> Self {
        ReindexMarker { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the marker and syncs it so it survives a crash.
    pub fn create(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(&self.path)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
