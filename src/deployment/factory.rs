//! Wiring for one invocation.
//!
//! Everything the orchestrator needs is built up front into [`Dependencies`];
//! tests build the same struct from fakes.

use crate::config::UserConfig;
use crate::manifest::Manifest;
use crate::paths;
use crate::ui::{ConsoleUi, Ui};
use agentclient::{AgentClientFactory, Clock, HttpAgentClientFactory, PingPolicy, SystemClock};
use anyhow::Result;
use cpi::{CloudContext, Installer, ReleaseInstaller, ReleaseValidator};
use deployment_state::{
    DeploymentState, DiskRepo, FileStateService, IdGenerator, StateService, StemcellRepo,
    UuidGenerator, VmRepo, state_path_for_manifest,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builds the CPI installer for a deployment once its state is known.
pub trait InstallerFactory: Send + Sync {
    fn create(&self, state: &DeploymentState, manifest: &Manifest) -> Box<dyn Installer>;
}

/// Installs into `<installations>/<installation_id>`.
pub struct ReleaseInstallerFactory {
    installations_dir: PathBuf,
}

impl ReleaseInstallerFactory {
    pub fn new(installations_dir: impl Into<PathBuf>) -> Self {
        Self {
            installations_dir: installations_dir.into(),
        }
    }
}

impl InstallerFactory for ReleaseInstallerFactory {
    fn create(&self, state: &DeploymentState, manifest: &Manifest) -> Box<dyn Installer> {
        let context =
            CloudContext::new(&state.uuid).with_properties(&manifest.cloud_provider.properties);
        Box::new(ReleaseInstaller::new(
            &self.installations_dir,
            &state.installation_id,
            context,
        ))
    }
}

pub struct Dependencies {
    pub ui: Arc<dyn Ui>,
    pub clock: Arc<dyn Clock>,
    pub state: Arc<dyn StateService>,
    pub ids: Arc<dyn IdGenerator>,
    pub installers: Box<dyn InstallerFactory>,
    pub agents: Box<dyn AgentClientFactory>,
    pub release_validator: ReleaseValidator,
    pub ping_policy: PingPolicy,
}

impl Dependencies {
    /// Real implementations for the deployment whose manifest is at `manifest_path`.
    pub fn production(manifest_path: &Path, config: &UserConfig) -> Result<Self> {
        let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
        let state_path = state_path_for_manifest(manifest_path);
        log::debug!("Deployment state file: {}", state_path.display());

        Ok(Self {
            ui: Arc::new(ConsoleUi),
            clock: Arc::new(SystemClock),
            state: Arc::new(FileStateService::new(state_path, ids.clone())),
            ids,
            installers: Box::new(ReleaseInstallerFactory::new(paths::installations_dir()?)),
            agents: Box::new(HttpAgentClientFactory::new(
                config.agent.request_timeout(),
                config.agent.task_polling(),
            )),
            release_validator: ReleaseValidator::default(),
            ping_policy: config.agent.ping_policy(),
        })
    }

    pub fn vm_repo(&self) -> VmRepo {
        VmRepo::new(self.state.clone())
    }

    pub fn disk_repo(&self) -> DiskRepo {
        DiskRepo::new(self.state.clone(), self.ids.clone())
    }

    pub fn stemcell_repo(&self) -> StemcellRepo {
        StemcellRepo::new(self.state.clone(), self.ids.clone())
    }
}
