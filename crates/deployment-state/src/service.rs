//! Loading and saving the state document.

use crate::error::{Error, Result};
use crate::id::IdGenerator;
use crate::types::DeploymentState;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Storage backend for a deployment's state document.
pub trait StateService: Send + Sync {
    /// Whether a state document has ever been written.
    fn exists(&self) -> bool;

    /// Load the state.
    ///
    /// When nothing has been written yet, returns a fresh state with
    /// generated `uuid` and `installation_id`. Loading never writes.
    fn load(&self) -> Result<DeploymentState>;

    /// Replace the stored state.
    fn save(&self, state: &DeploymentState) -> Result<()>;
}

/// Path of the state file kept next to a deployment manifest:
/// `/dir/app.yml` → `/dir/app-state.json`.
pub fn state_path_for_manifest(manifest_path: &Path) -> PathBuf {
    let stem = manifest_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deployment".to_string());
    manifest_path.with_file_name(format!("{}-state.json", stem))
}

fn fill_identity(state: &mut DeploymentState, ids: &dyn IdGenerator) {
    if state.uuid.is_empty() {
        state.uuid = ids.generate();
    }
    if state.installation_id.is_empty() {
        state.installation_id = ids.generate();
    }
}

// ============================================================================
// File-backed
// ============================================================================

/// JSON state file written with temp-file-and-rename.
pub struct FileStateService {
    path: PathBuf,
    ids: Arc<dyn IdGenerator>,
}

impl FileStateService {
    /// Create a service for the state file at `path`.
    pub fn new(path: impl Into<PathBuf>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            path: path.into(),
            ids,
        }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }
}

impl StateService for FileStateService {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<DeploymentState> {
        let mut state = if self.exists() {
            let content =
                fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
            serde_json::from_str(&content).map_err(|source| Error::Parse {
                path: self.path.clone(),
                source,
            })?
        } else {
            log::debug!(
                "State file {} does not exist, using empty state",
                self.path.display()
            );
            DeploymentState::default()
        };

        fill_identity(&mut state, self.ids.as_ref());
        Ok(state)
    }

    fn save(&self, state: &DeploymentState) -> Result<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let content = serde_json::to_string_pretty(state).map_err(Error::Serialize)?;

        // Same directory as the target so the rename stays on one filesystem.
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Error::io(&dir, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| Error::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::io(&self.path, e.error))?;

        log::debug!("Saved deployment state to {}", self.path.display());
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// State held in memory, for tests and dry runs.
pub struct MemoryStateService {
    state: Mutex<Option<DeploymentState>>,
    ids: Arc<dyn IdGenerator>,
}

impl MemoryStateService {
    /// Create a service with no state written yet.
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(None),
            ids,
        }
    }

    /// Create a service that already holds `state`.
    pub fn with_state(state: DeploymentState, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ids,
        }
    }
}

impl StateService for MemoryStateService {
    fn exists(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn load(&self) -> Result<DeploymentState> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default();
        fill_identity(&mut state, self.ids.as_ref());
        Ok(state)
    }

    fn save(&self, state: &DeploymentState) -> Result<()> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        Ok(())
    }
}
