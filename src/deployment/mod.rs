//! Deploying and deleting a single-VM deployment.
//!
//! Both flows share the same shape: validate inputs, install the CPI from
//! its release, do the work inside one progress stage, then uninstall the
//! CPI whatever the outcome.

pub mod deleter;
pub mod error;
pub mod factory;
pub mod preparer;
mod session;

#[cfg(test)]
pub mod testing;

pub use deleter::Deleter;
pub use error::DeployError;
pub use factory::Dependencies;
pub use preparer::Preparer;

use crate::eventlog::Stage;
use crate::manifest::Manifest;
use cpi::ReleaseValidator;
use deployment_state::{DeploymentState, StateService};
use error::ValidationError;
use std::path::Path;

/// Load and check the deployment manifest as one step.
fn validate_manifest(stage: &Stage<'_>, manifest_path: &Path) -> Result<Manifest, DeployError> {
    stage.perform("Validating deployment manifest", || {
        Manifest::load(manifest_path).map_err(|e| DeployError::from(ValidationError::from(e)))
    })
}

/// Load the state and write it back, so an identity generated while loading
/// is the one the installer and every later save agree on.
fn load_state(service: &dyn StateService) -> Result<DeploymentState, DeployError> {
    let state = service.load()?;
    service.save(&state)?;
    Ok(state)
}

/// Check the CPI release tarball as one step.
fn validate_release(
    stage: &Stage<'_>,
    validator: &ReleaseValidator,
    release_tarball: &Path,
) -> Result<(), DeployError> {
    stage.perform("Validating cpi release", || {
        let release = validator
            .validate_tarball(release_tarball)
            .map_err(ValidationError::Release)?;
        log::debug!("CPI release {}/{} is valid", release.name, release.version);
        Ok(())
    })
}
