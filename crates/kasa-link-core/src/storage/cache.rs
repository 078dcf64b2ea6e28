//! Warm-start cache of last-known sysinfo per device id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::device::Device;
use crate::error::StorageError;
use crate::protocol::Sysinfo;

pub const CACHE_FILE_NAME: &str = "startupcache.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartupCache {
    pub devices: BTreeMap<String, Sysinfo>,
}

impl StartupCache {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CACHE_FILE_NAME)
    }

    /// Capture the last report of every record.
    pub fn from_devices(devices: &[Device]) -> Self {
        let devices = devices
            .iter()
            .map(|d| (d.id.clone(), d.report.clone()))
            .collect();
        Self { devices }
    }

    /// Load the cache in `dir`. A missing file is an empty cache.
    pub async fn load(dir: &Path) -> Result<Self, StorageError> {
        let path = Self::path(dir);
        if !path.exists() {
            debug!(path = %path.display(), "no startup cache");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).await.map_err(StorageError::Io)?;
        let cache = serde_json::from_str(&content).map_err(StorageError::Serialization)?;
        Ok(cache)
    }

    /// Write the cache to `dir` through a temporary file and rename.
    pub async fn save(&self, dir: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(dir).await.map_err(|e| {
            StorageError::DirectoryAccess(format!("{}: {}", dir.display(), e))
        })?;

        let path = Self::path(dir);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self).map_err(StorageError::Serialization)?;

        fs::write(&tmp, content).await.map_err(StorageError::Io)?;
        fs::rename(&tmp, &path).await.map_err(StorageError::Io)?;

        debug!(path = %path.display(), devices = self.devices.len(), "startup cache saved");
        Ok(())
    }

    pub fn reports(&self) -> impl Iterator<Item = &Sysinfo> {
        self.devices.values()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
