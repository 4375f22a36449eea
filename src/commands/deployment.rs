use anyhow::{Context as _, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::Context;
use crate::config::UserConfig;
use crate::manifest::Manifest;
use crate::paths;
use crate::ui;
use deployment_state::{FileStateService, StateService, UuidGenerator, state_path_for_manifest};

pub fn run(ctx: &Context, manifest: Option<&Path>) -> Result<()> {
    let config_path = paths::config_file()?;
    match manifest {
        Some(manifest) => {
            let target = set_target(&config_path, manifest)?;
            if !ctx.quiet {
                ui::success(&format!("Deployment set to '{}'", target.display()));
            }
            Ok(())
        }
        None => show(&config_path),
    }
}

/// Record `manifest` as the deployment target; returns the stored absolute path.
pub fn set_target(config_path: &Path, manifest: &Path) -> Result<PathBuf> {
    if !manifest.is_file() {
        bail!("Deployment manifest '{}' does not exist", manifest.display());
    }
    let absolute = fs::canonicalize(manifest)
        .with_context(|| format!("Could not resolve {}", manifest.display()))?;

    let mut config = UserConfig::load_from(config_path)?;
    config.deployment = Some(absolute.clone());
    config.save_to(config_path)?;
    log::info!("Deployment target is now {}", absolute.display());
    Ok(absolute)
}

fn show(config_path: &Path) -> Result<()> {
    let config = UserConfig::load_from(config_path)?;
    let manifest_path = super::target(&config)?;

    ui::header("Deployment");
    ui::kv("Manifest", &manifest_path.display().to_string());

    match Manifest::load(&manifest_path) {
        Ok(manifest) => {
            ui::kv("Name", &manifest.name);
            let disk = manifest
                .instance
                .persistent_disk_mib()
                .map_or_else(|| "none".to_string(), ui::format_mib);
            ui::kv("Persistent disk", &disk);
        }
        Err(e) => ui::warn(&format!("Could not read manifest: {}", e)),
    }

    let state_path = state_path_for_manifest(&manifest_path);
    ui::kv("State", &state_path.display().to_string());
    let state = FileStateService::new(&state_path, Arc::new(UuidGenerator));
    if !state.exists() {
        println!();
        ui::info("Nothing deployed yet. Run 'microdeploy deploy <cpi-release> <stemcell>'.");
        return Ok(());
    }

    let state = state.load()?;
    ui::kv("VM", state.current_vm_cid.as_deref().unwrap_or("none"));
    ui::kv("Disks", &state.disks.len().to_string());
    ui::kv("Stemcells", &state.stemcells.len().to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_target_stores_absolute_path() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("app.yml");
        fs::write(&manifest, "name: app\n").unwrap();
        let config_path = dir.path().join("config").join("config.toml");

        let stored = set_target(&config_path, &manifest).unwrap();

        assert!(stored.is_absolute());
        assert_eq!(stored, fs::canonicalize(&manifest).unwrap());
        let config = UserConfig::load_from(&config_path).unwrap();
        assert_eq!(config.deployment, Some(stored));
    }

    #[test]
    fn test_set_target_keeps_agent_settings() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("app.yml");
        fs::write(&manifest, "name: app\n").unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[agent]\nping_timeout_secs = 30\n").unwrap();

        set_target(&config_path, &manifest).unwrap();

        let config = UserConfig::load_from(&config_path).unwrap();
        assert_eq!(config.agent.ping_timeout_secs, 30);
    }

    #[test]
    fn test_set_target_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let err = set_target(&config_path, &dir.path().join("nope.yml")).unwrap_err();

        assert!(err.to_string().contains("does not exist"));
        assert!(!config_path.exists());
    }

    #[test]
    fn test_show_without_target() {
        let dir = TempDir::new().unwrap();
        let err = show(&dir.path().join("config.toml")).unwrap_err();
        assert_eq!(err.to_string(), "No deployment set");
    }
}
