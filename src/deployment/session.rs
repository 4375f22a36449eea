//! Steps shared by deploying and deleting.

use super::error::{DeployError, error_chain};
use super::factory::Dependencies;
use crate::eventlog::{Completion, Stage};
use crate::manifest::Manifest;
use crate::stemcell::ExtractedStemcell;
use agentclient::ping::wait_until_ready;
use agentclient::{AgentClient, Reachability};
use cpi::{Cloud, Installer};
use deployment_state::{DiskRecord, DiskRepo, StemcellRecord, StemcellRepo, VmRepo};
use serde_json::{Value, json};

/// Instance name shown in progress output; a single-VM deployment has one.
const INSTANCE: &str = "unknown/0";

/// How an unreachable agent is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AgentRequirement {
    /// Tear the VM down without a graceful shutdown.
    BestEffort,
    /// Fail the step.
    Required,
}

/// An installed CPI plus the repositories for one deployment.
pub(crate) struct Session<'a> {
    deps: &'a Dependencies,
    cloud: &'a dyn Cloud,
    manifest: &'a Manifest,
    vms: VmRepo,
    disks: DiskRepo,
    stemcells: StemcellRepo,
}

impl<'a> Session<'a> {
    pub fn new(deps: &'a Dependencies, cloud: &'a dyn Cloud, manifest: &'a Manifest) -> Self {
        Self {
            deps,
            cloud,
            manifest,
            vms: deps.vm_repo(),
            disks: deps.disk_repo(),
            stemcells: deps.stemcell_repo(),
        }
    }

    fn agent(&self) -> Result<Box<dyn AgentClient>, DeployError> {
        self.deps
            .agents
            .create(&self.manifest.cloud_provider.mbus)
            .map_err(DeployError::agent("Connecting to the agent"))
    }

    /// Returns whether the agent answered.
    pub fn wait_for_agent(
        &self,
        stage: &Stage<'_>,
        vm_cid: &str,
        agent: &dyn AgentClient,
        requirement: AgentRequirement,
    ) -> Result<bool, DeployError> {
        let step = format!("Waiting for the agent on VM '{}'", vm_cid);
        let completion = stage.perform_step(&step, || {
            match wait_until_ready(agent, &self.deps.ping_policy, self.deps.clock.as_ref()) {
                Reachability::Reachable { .. } => Ok(Completion::Done),
                Reachability::Unreachable {
                    attempts,
                    last_error,
                } => match requirement {
                    AgentRequirement::Required => Err(DeployError::AgentUnreachable {
                        vm_cid: vm_cid.to_string(),
                        attempts,
                        last_error,
                    }),
                    AgentRequirement::BestEffort => {
                        log::warn!(
                            "Agent on VM '{}' unreachable ({}), deleting without stopping jobs",
                            vm_cid,
                            last_error
                        );
                        Ok(Completion::Skipped("agent unreachable".to_string()))
                    }
                },
            }
        })?;
        Ok(completion == Completion::Done)
    }

    /// Stop jobs, unmount disks and delete the current VM, if there is one.
    ///
    /// With an unreachable agent the VM is deleted without stopping anything.
    pub fn delete_current_vm(&self, stage: &Stage<'_>) -> Result<(), DeployError> {
        let Some(vm_cid) = self.vms.find_current()? else {
            return Ok(());
        };

        let agent = self.agent()?;
        if self.wait_for_agent(stage, &vm_cid, agent.as_ref(), AgentRequirement::BestEffort)? {
            let step = format!("Stopping jobs on instance '{}'", INSTANCE);
            stage.perform(&step, || agent.stop().map_err(DeployError::agent(&step)))?;

            let mounted = agent
                .list_disk()
                .map_err(DeployError::agent("Listing mounted disks"))?;
            for disk_cid in mounted {
                let step = format!("Unmounting disk '{}'", disk_cid);
                stage.perform(&step, || {
                    agent
                        .unmount_disk(&disk_cid)
                        .map_err(DeployError::agent(&step))
                })?;
            }
        }

        let step = format!("Deleting VM '{}'", vm_cid);
        stage.perform(&step, || {
            self.cloud
                .delete_vm(&vm_cid)
                .map_err(DeployError::cloud(&step))?;
            self.vms.clear_current()?;
            Ok(())
        })
    }

    pub fn delete_current_disk(&self, stage: &Stage<'_>) -> Result<(), DeployError> {
        let Some(disk) = self.disks.find_current()? else {
            return Ok(());
        };
        let step = format!("Deleting disk '{}'", disk.cid);
        stage.perform(&step, || self.delete_disk(&step, &disk))
    }

    pub fn delete_current_stemcell(&self, stage: &Stage<'_>) -> Result<(), DeployError> {
        let Some(stemcell) = self.stemcells.find_current()? else {
            return Ok(());
        };
        let step = format!("Deleting stemcell '{}'", stemcell.cid);
        stage.perform(&step, || self.delete_stemcell(&step, &stemcell))
    }

    /// Delete every non-current disk. One failure does not stop the others;
    /// all failures are reported together afterwards.
    pub fn delete_orphan_disks(&self, stage: &Stage<'_>) -> Result<(), DeployError> {
        let mut failures = Vec::new();
        for disk in self.disks.orphans()? {
            let step = format!("Deleting unused disk '{}'", disk.cid);
            if let Err(e) = stage.perform(&step, || self.delete_disk(&step, &disk)) {
                log::warn!("{}", error_chain(&e));
                failures.push(error_chain(&e));
            }
        }
        orphan_result(failures)
    }

    /// Same as [`Session::delete_orphan_disks`] for stemcells.
    pub fn delete_orphan_stemcells(&self, stage: &Stage<'_>) -> Result<(), DeployError> {
        let mut failures = Vec::new();
        for stemcell in self.stemcells.orphans()? {
            let step = format!("Deleting unused stemcell '{}'", stemcell.cid);
            if let Err(e) = stage.perform(&step, || self.delete_stemcell(&step, &stemcell)) {
                log::warn!("{}", error_chain(&e));
                failures.push(error_chain(&e));
            }
        }
        orphan_result(failures)
    }

    fn delete_disk(&self, step: &str, disk: &DiskRecord) -> Result<(), DeployError> {
        self.cloud
            .delete_disk(&disk.cid)
            .map_err(DeployError::cloud(step))?;
        self.disks.delete(&disk.id)?;
        Ok(())
    }

    fn delete_stemcell(&self, step: &str, stemcell: &StemcellRecord) -> Result<(), DeployError> {
        self.cloud
            .delete_stemcell(&stemcell.cid)
            .map_err(DeployError::cloud(step))?;
        self.stemcells.delete(&stemcell.id)?;
        Ok(())
    }

    // ========================================================================
    // Provisioning
    // ========================================================================

    /// Reuse a stemcell with the same name and version, or upload it.
    pub fn upload_stemcell(
        &self,
        stage: &Stage<'_>,
        stemcell: &ExtractedStemcell,
    ) -> Result<StemcellRecord, DeployError> {
        let name = &stemcell.manifest.name;
        let version = &stemcell.manifest.version;
        let step = format!("Uploading stemcell '{}'", stemcell.label());

        stage.perform(&step, || {
            let record = match self.stemcells.find(name, version)? {
                Some(existing) => {
                    log::info!(
                        "Stemcell {} already uploaded as '{}'",
                        stemcell.label(),
                        existing.cid
                    );
                    existing
                }
                None => {
                    let cid = self
                        .cloud
                        .create_stemcell(
                            &stemcell.image_path(),
                            &object_or_empty(&stemcell.manifest.cloud_properties),
                        )
                        .map_err(DeployError::cloud(&step))?;
                    self.stemcells.save(name, version, &cid)?
                }
            };
            self.stemcells.update_current(&record.id)?;
            Ok(record)
        })
    }

    pub fn create_vm(
        &self,
        stage: &Stage<'_>,
        stemcell: &StemcellRecord,
    ) -> Result<String, DeployError> {
        let instance = &self.manifest.instance;
        let step = format!("Creating VM from stemcell '{}'", stemcell.cid);

        stage.perform(&step, || {
            let agent_id = self.deps.ids.generate();
            let vm_cid = self
                .cloud
                .create_vm(
                    &agent_id,
                    &stemcell.cid,
                    &instance.cloud_properties,
                    &instance.networks,
                    &instance.env,
                )
                .map_err(DeployError::cloud(&step))?;
            self.vms.update_current(&vm_cid)?;
            Ok(vm_cid)
        })
    }

    /// Make sure the VM has the requested persistent disk attached and mounted.
    ///
    /// The current disk is reused when its size matches; otherwise a new disk
    /// becomes current and the old one is left as an orphan.
    pub fn attach_persistent_disk(
        &self,
        stage: &Stage<'_>,
        vm_cid: &str,
        size: u64,
        agent: &dyn AgentClient,
    ) -> Result<(), DeployError> {
        let disk = match self.disks.find_current()? {
            Some(disk) if disk.size == size => disk,
            _ => {
                let properties = &self.manifest.instance.disk_cloud_properties;
                let step = "Creating disk";
                stage.perform(step, || {
                    let cid = self
                        .cloud
                        .create_disk(size, properties, vm_cid)
                        .map_err(DeployError::cloud(step))?;
                    let record = self.disks.save(&cid, size, properties.clone())?;
                    self.disks.update_current(&record.id)?;
                    Ok::<_, DeployError>(record)
                })?
            }
        };

        let step = format!("Attaching disk '{}' to VM '{}'", disk.cid, vm_cid);
        stage.perform(&step, || {
            self.cloud
                .attach_disk(vm_cid, &disk.cid)
                .map_err(DeployError::cloud(&step))?;
            agent
                .mount_disk(&disk.cid)
                .map_err(DeployError::agent(&step))
        })
    }

    /// Bring up a fresh VM from `stemcell` and start its jobs.
    pub fn deploy(
        &self,
        stage: &Stage<'_>,
        stemcell: &ExtractedStemcell,
    ) -> Result<(), DeployError> {
        let stemcell_record = self.upload_stemcell(stage, stemcell)?;
        self.delete_current_vm(stage)?;

        let vm_cid = self.create_vm(stage, &stemcell_record)?;
        let agent = self.agent()?;
        self.wait_for_agent(stage, &vm_cid, agent.as_ref(), AgentRequirement::Required)?;

        if let Some(size) = self.manifest.instance.persistent_disk_mib() {
            self.attach_persistent_disk(stage, &vm_cid, size, agent.as_ref())?;
        }

        let step = format!("Starting instance '{}'", INSTANCE);
        stage.perform(&step, || agent.start().map_err(DeployError::agent(&step)))?;

        self.delete_orphan_disks(stage)?;
        self.delete_orphan_stemcells(stage)
    }

    /// Delete everything recorded, in dependency order.
    pub fn delete_all(&self, stage: &Stage<'_>) -> Result<(), DeployError> {
        self.delete_current_vm(stage)?;
        self.delete_current_disk(stage)?;
        self.delete_orphan_disks(stage)?;
        self.delete_current_stemcell(stage)?;
        self.delete_orphan_stemcells(stage)
    }
}

fn orphan_result(failures: Vec<String>) -> Result<(), DeployError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(DeployError::OrphanCleanup { failures })
    }
}

fn object_or_empty(value: &Value) -> Value {
    if value.is_null() { json!({}) } else { value.clone() }
}

/// Uninstall the CPI and combine the outcome with the run's result.
///
/// The run's own error wins; an uninstall failure after it is only logged.
pub(crate) fn uninstall_after<T>(
    result: Result<T, DeployError>,
    installer: &dyn Installer,
) -> Result<T, DeployError> {
    let uninstalled = installer.uninstall();
    match (result, uninstalled) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(DeployError::CpiUninstall(e)),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(uninstall)) => {
            log::warn!(
                "Uninstalling CPI after failure: {}",
                error_chain(&uninstall)
            );
            Err(e)
        }
    }
}
