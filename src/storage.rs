//! Durable storage for saved ROI sets.
//!
//! The control panel only ever hands a repository opaque bytes produced by
//! [`crate::roi_store::RoiStore::serialize`], keyed by machine. Two backends:
//!
//! - [`FileRoiRepository`]: one JSON file per machine under a directory. Writes
//!   go to a temporary file that is then renamed over the target, so a reader
//!   never observes a half-written set. All I/O uses `tokio::fs`.
//! - [`MemoryRoiRepository`]: in-process map, for tests and the CLI dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::PersistenceError;
use crate::panel::MachineId;

/// File suffix for saved ROI sets.
const ROI_FILE_SUFFIX: &str = "roi.json";

/// Storage backend for serialized ROI sets.
#[async_trait]
pub trait RoiRepository: Send + Sync {
    /// Persist `data` as the saved set for `machine`, replacing any previous one.
    async fn save(&self, machine: &MachineId, data: &[u8]) -> Result<(), PersistenceError>;

    /// Fetch the saved set for `machine`.
    ///
    /// Fails with [`PersistenceError::NotFound`] when nothing was saved yet.
    async fn load(&self, machine: &MachineId) -> Result<Vec<u8>, PersistenceError>;
}

/// Directory-backed repository, one file per machine.
#[derive(Debug, Clone)]
pub struct FileRoiRepository {
    root: PathBuf,
}

impl FileRoiRepository {
    /// Repository rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the saved sets.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the saved set for `machine`.
    pub fn path_for(&self, machine: &MachineId) -> PathBuf {
        self.root
            .join(format!("{}.{}", machine.file_stem(), ROI_FILE_SUFFIX))
    }
}

fn unavailable(action: &str, path: &Path, err: std::io::Error) -> PersistenceError {
    PersistenceError::StorageUnavailable(format!("{action} {}: {err}", path.display()))
}

#[async_trait]
impl RoiRepository for FileRoiRepository {
    async fn save(&self, machine: &MachineId, data: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| unavailable("create", &self.root, e))?;

        let target = self.path_for(machine);
        let staging = target.with_extension("json.tmp");

        let write = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&staging, &target).await
        };

        if let Err(e) = write.await {
            // Best effort: a stale staging file is harmless but untidy.
            let _ = fs::remove_file(&staging).await;
            return Err(unavailable("write", &target, e));
        }

        tracing::debug!(machine = %machine, path = %target.display(), bytes = data.len(), "Saved ROI set");
        Ok(())
    }

    async fn load(&self, machine: &MachineId) -> Result<Vec<u8>, PersistenceError> {
        let path = self.path_for(machine);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(machine.to_string()))
            }
            Err(e) => Err(unavailable("read", &path, e)),
        }
    }
}

/// In-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRoiRepository {
    saved: RwLock<HashMap<MachineId, Vec<u8>>>,
}

impl MemoryRoiRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the saved set for a machine.
    pub async fn insert(&self, machine: MachineId, data: Vec<u8>) {
        self.saved.write().await.insert(machine, data);
    }
}

#[async_trait]
impl RoiRepository for MemoryRoiRepository {
    async fn save(&self, machine: &MachineId, data: &[u8]) -> Result<(), PersistenceError> {
        self.saved
            .write()
            .await
            .insert(machine.clone(), data.to_vec());
        Ok(())
    }

    async fn load(&self, machine: &MachineId) -> Result<Vec<u8>, PersistenceError> {
        self.saved
            .read()
            .await
            .get(machine)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(machine.to_string()))
    }
}
