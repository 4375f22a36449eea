//! # cpi
//!
//! Everything needed to talk to infrastructure through an external cloud
//! provider interface (CPI) release.
//!
//! This crate provides:
//! - the [`Cloud`] trait, the narrow capability the deployer drives
//! - [`ExternalCloud`], which runs the release's `bin/cpi` executable once
//!   per call with a JSON request on stdin
//! - [`release`], extraction and validation of CPI release tarballs
//! - [`Installer`] and [`ReleaseInstaller`], which unpack a release, start
//!   its support jobs and hand back a [`Cloud`]
//!
//! ## Example
//!
//! ```no_run
//! use cpi::{CloudContext, Installer, ReleaseInstaller};
//! use std::path::Path;
//!
//! let installer = ReleaseInstaller::new(
//!     Path::new("/tmp/installations"),
//!     "3f2b9c1e",
//!     CloudContext::new("director-uuid"),
//! );
//!
//! let cloud = installer.install(Path::new("cpi-release.tgz")).unwrap();
//! cloud.delete_vm("vm-1234").unwrap();
//! installer.uninstall().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cloud;
pub mod error;
pub mod installer;
pub mod release;
pub mod ruby;

pub use cloud::{CloudContext, ExternalCloud};
pub use error::{Error, ErrorCategory, Result};
pub use installer::ReleaseInstaller;
pub use release::{Release, ReleaseExtractor, ReleaseJob, ReleaseValidator};

use serde_json::Value;
use std::path::Path;

/// Operations on the provisioned infrastructure.
///
/// Every call is synchronous. Cloud properties are opaque JSON handed to the
/// provider unchanged.
pub trait Cloud: Send + Sync {
    /// Upload a stemcell image, returning its CID.
    fn create_stemcell(&self, image_path: &Path, cloud_properties: &Value) -> Result<String>;

    /// Delete a stemcell.
    fn delete_stemcell(&self, stemcell_cid: &str) -> Result<()>;

    /// Create a VM from a stemcell, returning its CID.
    fn create_vm(
        &self,
        agent_id: &str,
        stemcell_cid: &str,
        cloud_properties: &Value,
        networks: &Value,
        env: &Value,
    ) -> Result<String>;

    /// Delete a VM.
    fn delete_vm(&self, vm_cid: &str) -> Result<()>;

    /// Create a persistent disk of `size` MiB, returning its CID.
    fn create_disk(&self, size: u64, cloud_properties: &Value, vm_cid: &str) -> Result<String>;

    /// Attach a persistent disk to a VM.
    fn attach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()>;

    /// Detach a persistent disk from a VM.
    fn detach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()>;

    /// Delete a persistent disk.
    fn delete_disk(&self, disk_cid: &str) -> Result<()>;
}

/// Installs a CPI release and later removes it again.
pub trait Installer: Send + Sync {
    /// Extract, validate and install the release at `tarball`.
    ///
    /// May be called again after [`Installer::uninstall`].
    fn install(&self, tarball: &Path) -> Result<Box<dyn Cloud>>;

    /// Stop the release's support jobs and delete the installation.
    fn uninstall(&self) -> Result<()>;
}
