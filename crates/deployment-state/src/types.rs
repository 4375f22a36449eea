//! State document types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The persisted state of one deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Deployment identity, passed to the CPI as the director uuid.
    #[serde(default)]
    pub uuid: String,

    /// Names the CPI installation directory for this deployment.
    #[serde(default)]
    pub installation_id: String,

    /// CID of the VM currently in use.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub current_vm_cid: Option<String>,

    /// Id of the current disk record.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub current_disk_id: Option<String>,

    /// Id of the current stemcell record.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub current_stemcell_id: Option<String>,

    /// Every disk not yet deleted, current or orphaned.
    #[serde(default)]
    pub disks: Vec<DiskRecord>,

    /// Every stemcell not yet deleted, current or orphaned.
    #[serde(default)]
    pub stemcells: Vec<StemcellRecord>,
}

/// A persistent disk created through the CPI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRecord {
    /// Internally generated id.
    pub id: String,
    /// Provider-assigned id.
    pub cid: String,
    /// Size in MiB.
    pub size: u64,
    /// Opaque provider properties the disk was created with.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub cloud_properties: Value,
}

/// A stemcell uploaded through the CPI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemcellRecord {
    /// Internally generated id.
    pub id: String,
    /// Stemcell name.
    pub name: String,
    /// Stemcell version.
    pub version: String,
    /// Provider-assigned id.
    pub cid: String,
}

impl DeploymentState {
    /// Whether nothing is recorded: no pointers and no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current_vm_cid.is_none()
            && self.current_disk_id.is_none()
            && self.current_stemcell_id.is_none()
            && self.disks.is_empty()
            && self.stemcells.is_empty()
    }

    /// Disk records that are not the current disk.
    pub fn orphan_disks(&self) -> impl Iterator<Item = &DiskRecord> {
        self.disks
            .iter()
            .filter(|d| self.current_disk_id.as_deref() != Some(d.id.as_str()))
    }

    /// Stemcell records that are not the current stemcell.
    pub fn orphan_stemcells(&self) -> impl Iterator<Item = &StemcellRecord> {
        self.stemcells
            .iter()
            .filter(|s| self.current_stemcell_id.as_deref() != Some(s.id.as_str()))
    }
}

// Older state files write unset pointers as "".
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
