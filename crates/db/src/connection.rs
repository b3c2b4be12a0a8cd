use std::path::{Path, PathBuf};

use freightq_core::config::AppConfig;
use freightq_core::ports::StoreError;

use crate::{FsArtifactStore, JsonFileStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreSettings {
    pub data_dir: PathBuf,
    pub transient_dir: PathBuf,
    pub archive_dir: PathBuf,
}

impl StoreSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            data_dir: config.storage.data_dir.clone(),
            transient_dir: config.contracts.transient_dir(),
            archive_dir: config.contracts.archive_dir.clone(),
        }
    }
}

/// Opens the record store rooted at `data_dir`, creating it when missing.
pub fn open(data_dir: impl AsRef<Path>) -> Result<JsonFileStore, StoreError> {
    JsonFileStore::open(data_dir)
}

pub fn open_with_settings(
    settings: &StoreSettings,
) -> Result<(JsonFileStore, FsArtifactStore), StoreError> {
    let store = JsonFileStore::open(&settings.data_dir)?;
    let artifacts = FsArtifactStore::new(&settings.transient_dir, &settings.archive_dir);
    Ok((store, artifacts))
}
