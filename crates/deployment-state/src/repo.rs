//! Repositories over the state document.
//!
//! Each operation is a full load → modify → save cycle, so every successful
//! call is durable on its own.

use crate::error::{Error, Result};
use crate::id::IdGenerator;
use crate::service::StateService;
use crate::types::{DeploymentState, DiskRecord, StemcellRecord};
use serde_json::Value;
use std::sync::Arc;

fn mutate<T>(
    service: &dyn StateService,
    f: impl FnOnce(&mut DeploymentState) -> Result<T>,
) -> Result<T> {
    let mut state = service.load()?;
    let result = f(&mut state)?;
    service.save(&state)?;
    Ok(result)
}

// ============================================================================
// VM
// ============================================================================

/// Current VM pointer. Past VMs are not tracked.
#[derive(Clone)]
pub struct VmRepo {
    service: Arc<dyn StateService>,
}

impl VmRepo {
    /// Create a repository backed by `service`.
    pub fn new(service: Arc<dyn StateService>) -> Self {
        Self { service }
    }

    /// CID of the current VM, if any.
    pub fn find_current(&self) -> Result<Option<String>> {
        Ok(self.service.load()?.current_vm_cid)
    }

    /// Point the deployment at a new VM.
    pub fn update_current(&self, cid: &str) -> Result<()> {
        mutate(self.service.as_ref(), |state| {
            state.current_vm_cid = Some(cid.to_string());
            Ok(())
        })
    }

    /// Forget the current VM.
    pub fn clear_current(&self) -> Result<()> {
        mutate(self.service.as_ref(), |state| {
            state.current_vm_cid = None;
            Ok(())
        })
    }
}

// ============================================================================
// Disks
// ============================================================================

/// Disk records and the current disk pointer.
#[derive(Clone)]
pub struct DiskRepo {
    service: Arc<dyn StateService>,
    ids: Arc<dyn IdGenerator>,
}

impl DiskRepo {
    /// Create a repository backed by `service`.
    pub fn new(service: Arc<dyn StateService>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { service, ids }
    }

    /// Record a newly created disk. It does not become current.
    pub fn save(&self, cid: &str, size: u64, cloud_properties: Value) -> Result<DiskRecord> {
        let record = DiskRecord {
            id: self.ids.generate(),
            cid: cid.to_string(),
            size,
            cloud_properties,
        };
        mutate(self.service.as_ref(), |state| {
            state.disks.push(record.clone());
            Ok(())
        })?;
        log::debug!("Saved disk record {} (cid {})", record.id, record.cid);
        Ok(record)
    }

    /// Find a disk record by provider CID.
    pub fn find(&self, cid: &str) -> Result<Option<DiskRecord>> {
        Ok(self
            .service
            .load()?
            .disks
            .into_iter()
            .find(|d| d.cid == cid))
    }

    /// Make the record with `id` current. The previous current disk, if any,
    /// stays recorded as an orphan.
    pub fn update_current(&self, id: &str) -> Result<()> {
        mutate(self.service.as_ref(), |state| {
            if !state.disks.iter().any(|d| d.id == id) {
                return Err(Error::RecordNotFound {
                    kind: "disk",
                    id: id.to_string(),
                });
            }
            state.current_disk_id = Some(id.to_string());
            Ok(())
        })
    }

    /// Unset the current disk pointer without deleting the record.
    pub fn clear_current(&self) -> Result<()> {
        mutate(self.service.as_ref(), |state| {
            state.current_disk_id = None;
            Ok(())
        })
    }

    /// The current disk record, if a pointer is set.
    pub fn find_current(&self) -> Result<Option<DiskRecord>> {
        let state = self.service.load()?;
        let Some(id) = state.current_disk_id else {
            return Ok(None);
        };
        state
            .disks
            .into_iter()
            .find(|d| d.id == id)
            .map(Some)
            .ok_or(Error::DanglingPointer { kind: "disk", id })
    }

    /// Every disk record, current and orphaned, in creation order.
    pub fn all(&self) -> Result<Vec<DiskRecord>> {
        Ok(self.service.load()?.disks)
    }

    /// Disk records other than the current one.
    pub fn orphans(&self) -> Result<Vec<DiskRecord>> {
        Ok(self.service.load()?.orphan_disks().cloned().collect())
    }

    /// Remove a record, clearing the pointer if it was current.
    /// Deleting an unknown id is a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.service.load()?;
        let before = state.disks.len();
        state.disks.retain(|d| d.id != id);
        if state.disks.len() == before {
            log::debug!("Disk record {} already deleted", id);
            return Ok(());
        }
        if state.current_disk_id.as_deref() == Some(id) {
            state.current_disk_id = None;
        }
        self.service.save(&state)
    }
}

// ============================================================================
// Stemcells
// ============================================================================

/// Stemcell records and the current stemcell pointer.
#[derive(Clone)]
pub struct StemcellRepo {
    service: Arc<dyn StateService>,
    ids: Arc<dyn IdGenerator>,
}

impl StemcellRepo {
    /// Create a repository backed by `service`.
    pub fn new(service: Arc<dyn StateService>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { service, ids }
    }

    /// Record an uploaded stemcell. It does not become current.
    pub fn save(&self, name: &str, version: &str, cid: &str) -> Result<StemcellRecord> {
        let record = StemcellRecord {
            id: self.ids.generate(),
            name: name.to_string(),
            version: version.to_string(),
            cid: cid.to_string(),
        };
        mutate(self.service.as_ref(), |state| {
            state.stemcells.push(record.clone());
            Ok(())
        })?;
        log::debug!("Saved stemcell record {} (cid {})", record.id, record.cid);
        Ok(record)
    }

    /// Find a stemcell record by name and version.
    pub fn find(&self, name: &str, version: &str) -> Result<Option<StemcellRecord>> {
        Ok(self
            .service
            .load()?
            .stemcells
            .into_iter()
            .find(|s| s.name == name && s.version == version))
    }

    /// Make the record with `id` current. The previous current stemcell, if
    /// any, stays recorded as an orphan.
    pub fn update_current(&self, id: &str) -> Result<()> {
        mutate(self.service.as_ref(), |state| {
            if !state.stemcells.iter().any(|s| s.id == id) {
                return Err(Error::RecordNotFound {
                    kind: "stemcell",
                    id: id.to_string(),
                });
            }
            state.current_stemcell_id = Some(id.to_string());
            Ok(())
        })
    }

    /// Unset the current stemcell pointer without deleting the record.
    pub fn clear_current(&self) -> Result<()> {
        mutate(self.service.as_ref(), |state| {
            state.current_stemcell_id = None;
            Ok(())
        })
    }

    /// The current stemcell record, if a pointer is set.
    pub fn find_current(&self) -> Result<Option<StemcellRecord>> {
        let state = self.service.load()?;
        let Some(id) = state.current_stemcell_id else {
            return Ok(None);
        };
        state
            .stemcells
            .into_iter()
            .find(|s| s.id == id)
            .map(Some)
            .ok_or(Error::DanglingPointer {
                kind: "stemcell",
                id,
            })
    }

    /// Every stemcell record, current and orphaned, in upload order.
    pub fn all(&self) -> Result<Vec<StemcellRecord>> {
        Ok(self.service.load()?.stemcells)
    }

    /// Stemcell records other than the current one.
    pub fn orphans(&self) -> Result<Vec<StemcellRecord>> {
        Ok(self.service.load()?.orphan_stemcells().cloned().collect())
    }

    /// Remove a record, clearing the pointer if it was current.
    /// Deleting an unknown id is a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.service.load()?;
        let before = state.stemcells.len();
        state.stemcells.retain(|s| s.id != id);
        if state.stemcells.len() == before {
            log::debug!("Stemcell record {} already deleted", id);
            return Ok(());
        }
        if state.current_stemcell_id.as_deref() == Some(id) {
            state.current_stemcell_id = None;
        }
        self.service.save(&state)
    }
}
