//! Tearing a deployment down.

use super::error::DeployError;
use super::factory::Dependencies;
use super::session::{Session, uninstall_after};
use super::{load_state, validate_manifest, validate_release};
use crate::eventlog::EventLogger;
use std::path::Path;

const STAGE: &str = "deleting deployment";

/// Deletes the VM, disks and stemcells recorded for a deployment.
///
/// Re-running after a partial failure picks up where the last run stopped,
/// since records are removed only once the cloud has confirmed the delete.
pub struct Deleter {
    deps: Dependencies,
}

impl Deleter {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    pub fn delete(&self, manifest_path: &Path, release_tarball: &Path) -> Result<(), DeployError> {
        let events = EventLogger::new(self.deps.ui.as_ref(), self.deps.clock.as_ref());

        let manifest = events.stage("validating", |stage| {
            let manifest = validate_manifest(stage, manifest_path)?;
            validate_release(stage, &self.deps.release_validator, release_tarball)?;
            Ok::<_, DeployError>(manifest)
        })?;

        if !self.deps.state.exists() {
            log::info!("No deployment state for '{}', nothing to delete", manifest.name);
            return events.stage(STAGE, |_| Ok(()));
        }

        let state = load_state(self.deps.state.as_ref())?;
        let installer = self.deps.installers.create(&state, &manifest);
        let cloud = installer
            .install(release_tarball)
            .map_err(DeployError::CpiInstall)?;

        let session = Session::new(&self.deps, cloud.as_ref(), &manifest);
        let result = events.stage(STAGE, |stage| session.delete_all(stage));
        uninstall_after(result, installer.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::testing::{Harness, deployed_state, disk, stemcell};
    use deployment_state::{DeploymentState, StateService};

    fn run(harness: &Harness) -> Result<(), DeployError> {
        Deleter::new(harness.deps()).delete(&harness.manifest_path(), &harness.release_path())
    }

    const VALIDATING: [&str; 7] = [
        "Started validating",
        "Started validating > Validating deployment manifest...",
        " done. (00:00:00)",
        "Started validating > Validating cpi release...",
        " done. (00:00:00)",
        "Done validating",
        "",
    ];

    fn with_validating(lines: &[&str]) -> Vec<String> {
        VALIDATING
            .iter()
            .chain(lines.iter())
            .map(|s| (*s).to_string())
            .collect()
    }

    #[test]
    fn test_deletes_everything_in_order() {
        let harness = Harness::with_state(deployed_state());
        harness.agent.set_mounted(&["disk-1"]);

        run(&harness).unwrap();

        assert_eq!(
            harness.calls(),
            vec![
                "install",
                "create_agent(http://fake-mbus-url)",
                "ping",
                "stop",
                "list_disk",
                "unmount_disk(disk-1)",
                "delete_vm(vm-1)",
                "delete_disk(disk-1)",
                "delete_stemcell(sc-1)",
                "uninstall",
            ]
        );
        assert_eq!(
            harness.ui.said(),
            with_validating(&[
                "Started deleting deployment",
                "Started deleting deployment > Waiting for the agent on VM 'vm-1'...",
                " done. (00:00:00)",
                "Started deleting deployment > Stopping jobs on instance 'unknown/0'...",
                " done. (00:00:00)",
                "Started deleting deployment > Unmounting disk 'disk-1'...",
                " done. (00:00:00)",
                "Started deleting deployment > Deleting VM 'vm-1'...",
                " done. (00:00:00)",
                "Started deleting deployment > Deleting disk 'disk-1'...",
                " done. (00:00:00)",
                "Started deleting deployment > Deleting stemcell 'sc-1'...",
                " done. (00:00:00)",
                "Done deleting deployment",
                "",
            ])
        );

        let state = harness.saved_state();
        assert_eq!(state.current_vm_cid, None);
        assert_eq!(state.current_disk_id, None);
        assert_eq!(state.current_stemcell_id, None);
        assert!(state.disks.is_empty());
        assert!(state.stemcells.is_empty());
        assert_eq!(state.uuid, "uuid-1");
    }

    #[test]
    fn test_deletes_orphans_after_current_records() {
        let mut state = deployed_state();
        state.disks.push(disk("disk-guid-2", "disk-2"));
        state.stemcells.push(stemcell("stemcell-guid-2", "sc-2"));
        let harness = Harness::with_state(state);

        run(&harness).unwrap();

        assert_eq!(
            harness.resource_calls(),
            vec![
                "create_agent(http://fake-mbus-url)",
                "ping",
                "stop",
                "list_disk",
                "delete_vm(vm-1)",
                "delete_disk(disk-1)",
                "delete_disk(disk-2)",
                "delete_stemcell(sc-1)",
                "delete_stemcell(sc-2)",
            ]
        );
        let said = harness.ui.said();
        let started = |step: &str| format!("Started deleting deployment > {}...", step);
        assert!(said.contains(&started("Deleting unused disk 'disk-2'")));
        assert!(said.contains(&started("Deleting unused stemcell 'sc-2'")));
        assert!(harness.saved_state().disks.is_empty());
        assert!(harness.saved_state().stemcells.is_empty());
    }

    #[test]
    fn test_no_state_file_does_nothing() {
        let harness = Harness::new();

        run(&harness).unwrap();

        assert!(harness.calls().is_empty());
        assert_eq!(
            harness.ui.said(),
            with_validating(&["Started deleting deployment", "Done deleting deployment", ""])
        );
        assert!(!harness.state.exists());
    }

    #[test]
    fn test_empty_state_installs_and_uninstalls() {
        let harness = Harness::with_state(DeploymentState {
            uuid: "uuid-1".into(),
            installation_id: "inst-1".into(),
            ..Default::default()
        });

        run(&harness).unwrap();

        assert_eq!(harness.calls(), vec!["install", "uninstall"]);
        assert_eq!(
            harness.ui.said(),
            with_validating(&["Started deleting deployment", "Done deleting deployment", ""])
        );
    }

    #[test]
    fn test_second_run_touches_nothing() {
        let harness = Harness::with_state(deployed_state());
        run(&harness).unwrap();
        harness.log.clear();

        run(&harness).unwrap();

        assert_eq!(harness.calls(), vec!["install", "uninstall"]);
    }

    #[test]
    fn test_unreachable_agent_skips_graceful_shutdown() {
        let harness = Harness::with_state(deployed_state());
        harness.agent.set_reachable(false);
        harness.agent.set_mounted(&["disk-1"]);

        run(&harness).unwrap();

        let calls = harness.resource_calls();
        // 10s timeout at a 500ms delay, with a final probe at the deadline
        assert_eq!(calls.iter().filter(|c| *c == "ping").count(), 21);
        assert!(!calls.iter().any(|c| c.starts_with("unmount_disk")));
        let without_pings: Vec<_> = calls.iter().filter(|c| *c != "ping").collect();
        assert_eq!(
            without_pings,
            vec![
                "create_agent(http://fake-mbus-url)",
                "delete_vm(vm-1)",
                "delete_disk(disk-1)",
                "delete_stemcell(sc-1)",
            ]
        );

        let said = harness.ui.said();
        let wait = said
            .iter()
            .position(|l| l.ends_with("Waiting for the agent on VM 'vm-1'..."))
            .unwrap();
        assert_eq!(said[wait + 1], " skipped (agent unreachable)");
        assert_eq!(harness.saved_state().current_vm_cid, None);
    }

    /// An agent call that fails ends the run before the VM is deleted.
    fn assert_agent_failure(harness: &Harness, expected_step: &str) {
        let err = run(harness).unwrap_err();

        assert!(
            matches!(err, DeployError::Agent { ref step, .. } if step == expected_step),
            "unexpected error: {err:?}"
        );
        let calls = harness.calls();
        assert!(!calls.iter().any(|c| c.starts_with("delete_vm")));
        assert_eq!(calls.last().map(String::as_str), Some("uninstall"));
        assert_eq!(harness.saved_state().current_vm_cid.as_deref(), Some("vm-1"));
    }

    #[test]
    fn test_stop_failure_keeps_vm() {
        let harness = Harness::with_state(deployed_state());
        harness.agent.fail_on("stop");

        assert_agent_failure(&harness, "Stopping jobs on instance 'unknown/0'");
        assert!(!harness.calls().contains(&"list_disk".to_string()));
    }

    #[test]
    fn test_list_disk_failure_keeps_vm() {
        let harness = Harness::with_state(deployed_state());
        harness.agent.fail_on("list_disk");

        assert_agent_failure(&harness, "Listing mounted disks");
        assert_eq!(
            harness.calls(),
            vec![
                "install",
                "create_agent(http://fake-mbus-url)",
                "ping",
                "stop",
                "list_disk",
                "uninstall",
            ]
        );
    }

    #[test]
    fn test_unmount_failure_keeps_vm() {
        let harness = Harness::with_state(deployed_state());
        harness.agent.set_mounted(&["disk-1"]);
        harness.agent.fail_on("unmount_disk(disk-1)");

        assert_agent_failure(&harness, "Unmounting disk 'disk-1'");
        assert!(harness.ui.said().contains(&" failed (00:00:00)".to_string()));
    }

    #[test]
    fn test_blank_identity_is_generated_once() {
        let mut state = deployed_state();
        state.uuid.clear();
        state.installation_id.clear();
        let harness = Harness::with_state(state);

        run(&harness).unwrap();

        let saved = harness.saved_state();
        assert!(!saved.uuid.is_empty());
        assert!(!saved.installation_id.is_empty());
        assert_eq!(
            harness.installer.identities(),
            vec![(saved.uuid.clone(), saved.installation_id.clone())]
        );
    }

    #[test]
    fn test_cloud_failure_keeps_record_and_uninstalls() {
        let harness = Harness::with_state(deployed_state());
        harness.cloud.fail_on("delete_disk(disk-1)");

        let err = run(&harness).unwrap_err();

        assert!(
            matches!(err, DeployError::Cloud { ref step, .. } if step == "Deleting disk 'disk-1'")
        );
        let calls = harness.calls();
        assert_eq!(calls.last().map(String::as_str), Some("uninstall"));
        assert!(!calls.contains(&"delete_stemcell(sc-1)".to_string()));

        let said = harness.ui.said();
        assert!(said.contains(&" failed (00:00:00)".to_string()));
        assert!(!said.contains(&"Done deleting deployment".to_string()));

        let state = harness.saved_state();
        assert_eq!(state.current_vm_cid, None);
        assert_eq!(state.current_disk_id.as_deref(), Some("disk-guid-1"));
        assert_eq!(state.disks.len(), 1);
        assert_eq!(state.stemcells.len(), 1);
    }

    #[test]
    fn test_rerun_after_failure_resumes() {
        let harness = Harness::with_state(deployed_state());
        harness.cloud.fail_on("delete_disk(disk-1)");
        run(&harness).unwrap_err();

        let harness2 = Harness::with_state(harness.saved_state());
        run(&harness2).unwrap();

        assert_eq!(
            harness2.resource_calls(),
            vec!["delete_disk(disk-1)", "delete_stemcell(sc-1)"]
        );
    }

    #[test]
    fn test_orphan_failures_are_collected() {
        let mut state = deployed_state();
        state.disks.push(disk("disk-guid-2", "disk-2"));
        state.disks.push(disk("disk-guid-3", "disk-3"));
        let harness = Harness::with_state(state);
        harness.cloud.fail_on("delete_disk(disk-2)");

        let err = run(&harness).unwrap_err();

        match err {
            DeployError::OrphanCleanup { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].contains("disk-2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let calls = harness.calls();
        assert!(calls.contains(&"delete_disk(disk-3)".to_string()));
        assert!(!calls.contains(&"delete_stemcell(sc-1)".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("uninstall"));

        let remaining: Vec<_> = harness.saved_state().disks.into_iter().map(|d| d.cid).collect();
        assert_eq!(remaining, vec!["disk-2"]);
    }

    #[test]
    fn test_invalid_manifest_calls_nothing() {
        let harness = Harness::with_state(deployed_state());
        std::fs::write(harness.manifest_path(), "name: ''\ncloud_provider:\n  mbus: ''\n").unwrap();

        let err = run(&harness).unwrap_err();

        assert!(matches!(err, DeployError::Validation(_)));
        assert!(harness.calls().is_empty());
        assert_eq!(
            harness.ui.said(),
            vec![
                "Started validating",
                "Started validating > Validating deployment manifest...",
                " failed (00:00:00)",
            ]
        );
    }

    #[test]
    fn test_missing_release_calls_nothing() {
        let harness = Harness::with_state(deployed_state());
        std::fs::remove_file(harness.release_path()).unwrap();

        let err = run(&harness).unwrap_err();

        assert!(matches!(
            err,
            DeployError::Validation(crate::deployment::error::ValidationError::Release(_))
        ));
        assert!(harness.calls().is_empty());
    }

    #[test]
    fn test_install_failure_skips_uninstall() {
        let harness = Harness::with_state(deployed_state());
        harness.installer.fail_on("install");

        let err = run(&harness).unwrap_err();

        assert!(matches!(err, DeployError::CpiInstall(_)));
        assert_eq!(harness.calls(), vec!["install"]);
        assert_eq!(harness.saved_state(), deployed_state());
    }

    #[test]
    fn test_uninstall_failure_is_reported() {
        let harness = Harness::with_state(deployed_state());
        harness.installer.fail_on("uninstall");

        let err = run(&harness).unwrap_err();

        assert!(matches!(err, DeployError::CpiUninstall(_)));
        assert!(harness.saved_state().stemcells.is_empty());
    }

    #[test]
    fn test_uninstall_failure_does_not_hide_run_error() {
        let harness = Harness::with_state(deployed_state());
        harness.installer.fail_on("uninstall");
        harness.cloud.fail_on("delete_vm(vm-1)");

        let err = run(&harness).unwrap_err();

        assert!(matches!(err, DeployError::Cloud { .. }));
    }
}
