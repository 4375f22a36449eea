//! Creating or updating a deployment.

use super::error::{DeployError, ValidationError};
use super::factory::Dependencies;
use super::session::{Session, uninstall_after};
use super::{load_state, validate_manifest, validate_release};
use crate::eventlog::EventLogger;
use crate::stemcell;
use std::path::Path;

/// Brings the deployment's VM up to date with its manifest and stemcell.
pub struct Preparer {
    deps: Dependencies,
}

impl Preparer {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    pub fn deploy(
        &self,
        manifest_path: &Path,
        release_tarball: &Path,
        stemcell_tarball: &Path,
    ) -> Result<(), DeployError> {
        let events = EventLogger::new(self.deps.ui.as_ref(), self.deps.clock.as_ref());

        let (manifest, stemcell) = events.stage("validating", |stage| {
            let manifest = validate_manifest(stage, manifest_path)?;
            validate_release(stage, &self.deps.release_validator, release_tarball)?;
            let stemcell = stage.perform("Validating stemcell", || {
                stemcell::extract(stemcell_tarball).map_err(ValidationError::from)
            })?;
            Ok::<_, DeployError>((manifest, stemcell))
        })?;

        let state = load_state(self.deps.state.as_ref())?;

        let installer = self.deps.installers.create(&state, &manifest);
        let cloud = installer
            .install(release_tarball)
            .map_err(DeployError::CpiInstall)?;

        let session = Session::new(&self.deps, cloud.as_ref(), &manifest);
        let result = events.stage("deploying", |stage| session.deploy(stage, &stemcell));
        uninstall_after(result, installer.as_ref())
    }
}
