//! Watermark stores
//!
//! `FileWatermarkStore` survives restarts; `MemoryWatermarkStore` serves
//! dry-runs, explicit-range one-shots and tests.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use contracts::{ContractError, WatermarkStore};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    watermarks: BTreeMap<String, DateTime<Utc>>,
}

/// JSON state file, replaced atomically on every write
#[derive(Debug)]
pub struct FileWatermarkStore {
    path: PathBuf,
    values: BTreeMap<String, DateTime<Utc>>,
}

impl FileWatermarkStore {
    /// Load the state file, starting empty when it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ContractError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => {
                let state: StateFile = serde_json::from_str(&content).map_err(|e| {
                    ContractError::watermark_store(format!(
                        "corrupt state file '{}': {e}",
                        path.display()
                    ))
                })?;
                if state.version != STATE_VERSION {
                    return Err(ContractError::watermark_store(format!(
                        "state file '{}' has unsupported version {}",
                        path.display(),
                        state.version
                    )));
                }
                state.watermarks
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no state file yet, starting without watermarks");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(ContractError::watermark_store(format!(
                    "cannot read '{}': {e}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), scopes = values.len(), "watermark store opened");
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, DateTime<Utc>>) -> std::io::Result<()> {
        let state = StateFile {
            version: STATE_VERSION,
            watermarks: values.clone(),
        };
        let json = serde_json::to_vec_pretty(&state)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn get(&self, key: &str) -> Result<Option<DateTime<Utc>>, ContractError> {
        Ok(self.values.get(key).copied())
    }

    fn set(&mut self, key: &str, watermark: DateTime<Utc>) -> Result<(), ContractError> {
        let mut next = self.values.clone();
        next.insert(key.to_string(), watermark);
        self.persist(&next).map_err(|e| {
            ContractError::watermark_store(format!("cannot write '{}': {e}", self.path.display()))
        })?;
        self.values = next;
        Ok(())
    }
}

/// Process-local store, forgotten at exit
#[derive(Debug, Default, Clone)]
pub struct MemoryWatermarkStore {
    values: BTreeMap<String, DateTime<Utc>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a watermark
    pub fn with(mut self, key: impl Into<String>, watermark: DateTime<Utc>) -> Self {
        self.values.insert(key.into(), watermark);
        self
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn get(&self, key: &str) -> Result<Option<DateTime<Utc>>, ContractError> {
        Ok(self.values.get(key).copied())
    }

    fn set(&mut self, key: &str, watermark: DateTime<Utc>) -> Result<(), ContractError> {
        self.values.insert(key.to_string(), watermark);
        Ok(())
    }
}
