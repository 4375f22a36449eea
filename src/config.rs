//! User configuration (`config.toml`).
//!
//! ```toml
//! deployment = "/home/me/deployments/app.yml"
//!
//! [agent]
//! ping_timeout_secs = 10
//! ping_delay_ms = 500
//! request_timeout_secs = 1
//! task_poll_ms = 500
//! task_max_checks = 600
//! ```

use crate::paths;
use agentclient::{PingPolicy, TaskPolling};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Absolute path of the deployment manifest commands act on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<PathBuf>,
    pub agent: AgentConfig,
}

/// Timings for talking to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub ping_timeout_secs: u64,
    pub ping_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub task_poll_ms: u64,
    pub task_max_checks: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ping_timeout_secs: 10,
            ping_delay_ms: 500,
            request_timeout_secs: 1,
            task_poll_ms: 500,
            task_max_checks: 600,
        }
    }
}

impl AgentConfig {
    pub fn ping_policy(&self) -> PingPolicy {
        PingPolicy::new(
            Duration::from_secs(self.ping_timeout_secs),
            Duration::from_millis(self.ping_delay_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn task_polling(&self) -> TaskPolling {
        TaskPolling {
            interval: Duration::from_millis(self.task_poll_ms),
            max_checks: self.task_max_checks,
        }
    }
}

impl UserConfig {
    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Could not serialize config")?;
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))?;
        log::debug!("Saved config to {}", path.display());
        Ok(())
    }
}
