pub mod delete;
pub mod deploy;
pub mod deployment;

use crate::config::UserConfig;
use crate::deployment::DeployError;
use std::path::PathBuf;

/// The manifest the deploy and delete commands act on.
fn target(config: &UserConfig) -> Result<PathBuf, DeployError> {
    config
        .deployment
        .clone()
        .ok_or(DeployError::NoDeploymentTarget)
}
