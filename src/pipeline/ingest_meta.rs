use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::Result;

/// Per-source fetch markers persisted under the data directory. Backs the
/// cadence guard: a source fetched more recently than the configured
/// minimum interval is skipped for the run instead of hammered again.
pub struct IngestMeta {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetaFile {
    last_fetched_at: HashMap<String, i64>,
}

impl IngestMeta {
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Result<Self> {
        let root = data_root.as_ref();
        fs::create_dir_all(root)?;
        Ok(Self {
            path: root.join("ingest_meta.json"),
        })
    }

    fn read(&self) -> Result<MetaFile> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MetaFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_last_fetched_at(&self, source_id: &str) -> Result<Option<i64>> {
        Ok(self.read()?.last_fetched_at.get(source_id).copied())
    }

    pub fn set_last_fetched_at(&self, source_id: &str, epoch_secs: i64) -> Result<()> {
        let mut meta = self.read()?;
        meta.last_fetched_at.insert(source_id.to_string(), epoch_secs);
        fs::write(&self.path, serde_json::to_string_pretty(&meta)?)?;
        Ok(())
    }

    /// True when the source was fetched less than `min_interval_secs` ago.
    pub fn within_cadence(&self, source_id: &str, now: i64, min_interval_secs: i64) -> Result<bool> {
        Ok(self
            .get_last_fetched_at(source_id)?
            .is_some_and(|last| now - last < min_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn markers_round_trip() {
        let dir = tempdir().unwrap();
        let meta = IngestMeta::open_at_root(dir.path()).unwrap();

        assert_eq!(meta.get_last_fetched_at("src-a").unwrap(), None);
        meta.set_last_fetched_at("src-a", 1_000).unwrap();
        assert_eq!(meta.get_last_fetched_at("src-a").unwrap(), Some(1_000));
    }

    #[test]
    fn cadence_window_is_respected() {
        let dir = tempdir().unwrap();
        let meta = IngestMeta::open_at_root(dir.path()).unwrap();
        meta.set_last_fetched_at("src-a", 1_000).unwrap();

        assert!(meta.within_cadence("src-a", 1_500, 3_600).unwrap());
        assert!(!meta.within_cadence("src-a", 10_000, 3_600).unwrap());
        assert!(!meta.within_cadence("never-fetched", 1_500, 3_600).unwrap());
    }
}
