//! Fakes for orchestrator tests.
//!
//! Every fake appends to one shared call log so tests can assert the exact
//! order of agent, cloud and installer calls.

use super::factory::{Dependencies, InstallerFactory};
use crate::manifest::Manifest;
use crate::testutil::write_cpi_release;
use crate::ui::FakeUi;
use agentclient::{AgentClient, AgentClientFactory, ManualClock, PingPolicy};
use cpi::{Cloud, Installer, ReleaseValidator};
use deployment_state::{
    DeploymentState, DiskRecord, IdGenerator, MemoryStateService, SequentialIdGenerator,
    StateService, StemcellRecord,
};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Calls listed in `failing` return an error instead of succeeding.
#[derive(Clone, Default)]
struct Failures(Arc<Mutex<HashSet<String>>>);

impl Failures {
    fn add(&self, call: &str) {
        self.0.lock().unwrap().insert(call.to_string());
    }

    fn check(&self, call: &str) -> bool {
        self.0.lock().unwrap().contains(call)
    }
}

// ============================================================================
// Cloud
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeCloud {
    log: CallLog,
    failing: Failures,
    created: Arc<Mutex<u32>>,
}

impl FakeCloud {
    pub fn fail_on(&self, call: &str) {
        self.failing.add(call);
    }

    fn call(&self, call: String) -> cpi::Result<()> {
        self.log.record(call.clone());
        if self.failing.check(&call) {
            let method = call.split('(').next().unwrap_or_default().to_string();
            return Err(cpi::Error::cloud(method, format!("fake failure in {}", call)));
        }
        Ok(())
    }

    fn new_cid(&self, kind: &str) -> String {
        let mut created = self.created.lock().unwrap();
        let cid = format!("{}-cid-{}", kind, *created);
        *created += 1;
        cid
    }
}

impl Cloud for FakeCloud {
    fn create_stemcell(
        &self,
        _image_path: &Path,
        _cloud_properties: &Value,
    ) -> cpi::Result<String> {
        self.call("create_stemcell".into())?;
        Ok(self.new_cid("stemcell"))
    }

    fn delete_stemcell(&self, stemcell_cid: &str) -> cpi::Result<()> {
        self.call(format!("delete_stemcell({})", stemcell_cid))
    }

    fn create_vm(
        &self,
        _agent_id: &str,
        stemcell_cid: &str,
        _cloud_properties: &Value,
        _networks: &Value,
        _env: &Value,
    ) -> cpi::Result<String> {
        self.call(format!("create_vm({})", stemcell_cid))?;
        Ok(self.new_cid("vm"))
    }

    fn delete_vm(&self, vm_cid: &str) -> cpi::Result<()> {
        self.call(format!("delete_vm({})", vm_cid))
    }

    fn create_disk(
        &self,
        size: u64,
        _cloud_properties: &Value,
        vm_cid: &str,
    ) -> cpi::Result<String> {
        self.call(format!("create_disk({}, {})", size, vm_cid))?;
        Ok(self.new_cid("disk"))
    }

    fn attach_disk(&self, vm_cid: &str, disk_cid: &str) -> cpi::Result<()> {
        self.call(format!("attach_disk({}, {})", vm_cid, disk_cid))
    }

    fn detach_disk(&self, vm_cid: &str, disk_cid: &str) -> cpi::Result<()> {
        self.call(format!("detach_disk({}, {})", vm_cid, disk_cid))
    }

    fn delete_disk(&self, disk_cid: &str) -> cpi::Result<()> {
        self.call(format!("delete_disk({})", disk_cid))
    }
}

// ============================================================================
// Agent
// ============================================================================

#[derive(Clone)]
pub struct FakeAgent {
    log: CallLog,
    failing: Failures,
    reachable: Arc<Mutex<bool>>,
    mounted: Arc<Mutex<Vec<String>>>,
}

impl FakeAgent {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            failing: Failures::default(),
            reachable: Arc::new(Mutex::new(true)),
            mounted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock().unwrap() = reachable;
    }

    pub fn set_mounted(&self, disks: &[&str]) {
        *self.mounted.lock().unwrap() = disks.iter().map(|d| (*d).to_string()).collect();
    }

    pub fn fail_on(&self, call: &str) {
        self.failing.add(call);
    }

    fn call(&self, call: String) -> agentclient::Result<()> {
        self.log.record(call.clone());
        if self.failing.check(&call) {
            return Err(agentclient::Error::Agent {
                method: call,
                message: "fake failure".into(),
            });
        }
        Ok(())
    }
}

impl AgentClient for FakeAgent {
    fn ping(&self) -> agentclient::Result<String> {
        self.log.record("ping");
        if *self.reachable.lock().unwrap() {
            Ok("running".into())
        } else {
            Err(agentclient::Error::http("connection refused", None))
        }
    }

    fn stop(&self) -> agentclient::Result<()> {
        self.call("stop".into())
    }

    fn start(&self) -> agentclient::Result<()> {
        self.call("start".into())
    }

    fn list_disk(&self) -> agentclient::Result<Vec<String>> {
        self.call("list_disk".into())?;
        Ok(self.mounted.lock().unwrap().clone())
    }

    fn mount_disk(&self, disk_cid: &str) -> agentclient::Result<()> {
        self.call(format!("mount_disk({})", disk_cid))
    }

    fn unmount_disk(&self, disk_cid: &str) -> agentclient::Result<()> {
        self.call(format!("unmount_disk({})", disk_cid))
    }
}

pub struct FakeAgentFactory {
    log: CallLog,
    agent: FakeAgent,
}

impl AgentClientFactory for FakeAgentFactory {
    fn create(&self, mbus_url: &str) -> agentclient::Result<Box<dyn AgentClient>> {
        self.log.record(format!("create_agent({})", mbus_url));
        Ok(Box::new(self.agent.clone()))
    }
}

// ============================================================================
// Installer
// ============================================================================

#[derive(Clone)]
pub struct FakeInstaller {
    log: CallLog,
    cloud: FakeCloud,
    failing: Failures,
    identities: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeInstaller {
    pub fn fail_on(&self, call: &str) {
        self.failing.add(call);
    }

    /// `(uuid, installation_id)` of every state an installer was created for.
    pub fn identities(&self) -> Vec<(String, String)> {
        self.identities.lock().unwrap().clone()
    }
}

impl Installer for FakeInstaller {
    fn install(&self, _tarball: &Path) -> cpi::Result<Box<dyn Cloud>> {
        self.log.record("install");
        if self.failing.check("install") {
            return Err(cpi::Error::InvalidRelease {
                problems: vec!["fake install failure".into()],
            });
        }
        Ok(Box::new(self.cloud.clone()))
    }

    fn uninstall(&self) -> cpi::Result<()> {
        self.log.record("uninstall");
        if self.failing.check("uninstall") {
            return Err(cpi::Error::io(
                "/installations",
                std::io::Error::other("fake uninstall failure"),
            ));
        }
        Ok(())
    }
}

impl InstallerFactory for FakeInstaller {
    fn create(&self, state: &DeploymentState, _manifest: &Manifest) -> Box<dyn Installer> {
        self.identities
            .lock()
            .unwrap()
            .push((state.uuid.clone(), state.installation_id.clone()));
        Box::new(self.clone())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub const MBUS: &str = "http://fake-mbus-url";

/// A deployment directory with a manifest and a valid CPI release, plus fakes.
pub struct Harness {
    pub dir: TempDir,
    pub log: CallLog,
    pub ui: Arc<FakeUi>,
    pub clock: Arc<ManualClock>,
    pub state: Arc<MemoryStateService>,
    pub ids: Arc<SequentialIdGenerator>,
    pub cloud: FakeCloud,
    pub agent: FakeAgent,
    pub installer: FakeInstaller,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("deployment.yml"),
            format!(
                "name: test-deployment\ncloud_provider:\n  mbus: {}\ninstance:\n  persistent_disk: 1024\n",
                MBUS
            ),
        )
        .unwrap();
        write_cpi_release(&dir.path().join("cpi-release.tgz"));

        let log = CallLog::default();
        let ids = Arc::new(SequentialIdGenerator::new("id"));
        let cloud = FakeCloud {
            log: log.clone(),
            ..Default::default()
        };
        Self {
            dir,
            ui: Arc::new(FakeUi::default()),
            clock: Arc::new(ManualClock::new()),
            state: Arc::new(MemoryStateService::new(ids.clone())),
            ids,
            agent: FakeAgent::new(log.clone()),
            installer: FakeInstaller {
                log: log.clone(),
                cloud: cloud.clone(),
                failing: Failures::default(),
                identities: Arc::default(),
            },
            cloud,
            log,
        }
    }

    /// Start from an already written state document.
    pub fn with_state(state: DeploymentState) -> Self {
        let mut harness = Self::new();
        harness.state = Arc::new(MemoryStateService::with_state(state, harness.ids.clone()));
        harness
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.path().join("deployment.yml")
    }

    pub fn release_path(&self) -> PathBuf {
        self.dir.path().join("cpi-release.tgz")
    }

    pub fn deps(&self) -> Dependencies {
        let ids: Arc<dyn IdGenerator> = self.ids.clone();
        Dependencies {
            ui: self.ui.clone(),
            clock: self.clock.clone(),
            state: self.state.clone(),
            ids,
            installers: Box::new(self.installer.clone()),
            agents: Box::new(FakeAgentFactory {
                log: self.log.clone(),
                agent: self.agent.clone(),
            }),
            release_validator: ReleaseValidator::default(),
            ping_policy: PingPolicy::new(Duration::from_secs(10), Duration::from_millis(500)),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }

    /// Cloud and agent calls only.
    pub fn resource_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c.as_str(), "install" | "uninstall"))
            .collect()
    }

    pub fn saved_state(&self) -> DeploymentState {
        self.state.load().unwrap()
    }
}

/// The state a completed deploy leaves behind: current VM, disk and stemcell.
pub fn deployed_state() -> DeploymentState {
    DeploymentState {
        uuid: "uuid-1".into(),
        installation_id: "inst-1".into(),
        current_vm_cid: Some("vm-1".into()),
        current_disk_id: Some("disk-guid-1".into()),
        current_stemcell_id: Some("stemcell-guid-1".into()),
        disks: vec![disk("disk-guid-1", "disk-1")],
        stemcells: vec![stemcell("stemcell-guid-1", "sc-1")],
    }
}

pub fn disk(id: &str, cid: &str) -> DiskRecord {
    DiskRecord {
        id: id.into(),
        cid: cid.into(),
        size: 1024,
        cloud_properties: Value::Null,
    }
}

pub fn stemcell(id: &str, cid: &str) -> StemcellRecord {
    StemcellRecord {
        id: id.into(),
        name: "ubuntu".into(),
        version: "1".into(),
        cid: cid.into(),
    }
}
