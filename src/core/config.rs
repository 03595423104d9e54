use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::query::types::ValidationConfig;
use crate::storage::merge_policy::MergePolicyConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,
    pub marker_file: Option<PathBuf>,            // Defaults to <storage_path>/reindex.marker

    pub reindex_flush_threshold: usize,          // Buffered changes per recovery flush

    pub auto_merge: bool,                        // Ask the merge policy after every save
    pub background_merge: bool,                  // Merge on a spawned thread instead of inline
    pub merge_policy: MergePolicyConfig,

    pub validation: ValidationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            marker_file: None,
            reindex_flush_threshold: 100,
            auto_merge: true,
            background_merge: true,
            merge_policy: MergePolicyConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Config {
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Reads a JSON config file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.marker_file.clone()
            .unwrap_or_else(|| self.storage_path.join("reindex.marker"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"storage_path": "/var/index", "merge_policy": {{"policy": "document_count", "min": 2, "max": 50}}}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/var/index"));
        assert_eq!(config.reindex_flush_threshold, 100);
        assert_eq!(config.merge_policy, MergePolicyConfig::DocumentCount { min: 2, max: 50 });
        assert_eq!(config.marker_path(), PathBuf::from("/var/index/reindex.marker"));
    }
}
