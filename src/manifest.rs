//! Deployment manifest parsing and validation.

use agentclient::Endpoint;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").ok());

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("reading deployment manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing deployment manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid deployment manifest: {}", problems.join("; "))]
    Invalid { problems: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub cloud_provider: CloudProvider,
    #[serde(default)]
    pub instance: InstanceSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CloudProvider {
    /// Agent message-bus endpoint.
    pub mbus: String,
    /// Passed through to every CPI call as request context.
    #[serde(default = "empty_object", deserialize_with = "object_or_empty")]
    pub properties: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstanceSpec {
    #[serde(default = "empty_object", deserialize_with = "object_or_empty")]
    pub cloud_properties: Value,
    #[serde(default = "empty_object", deserialize_with = "object_or_empty")]
    pub networks: Value,
    #[serde(default = "empty_object", deserialize_with = "object_or_empty")]
    pub env: Value,
    /// MiB; 0 means no persistent disk.
    #[serde(default)]
    pub persistent_disk: i64,
    #[serde(default = "empty_object", deserialize_with = "object_or_empty")]
    pub disk_cloud_properties: Value,
}

impl Default for InstanceSpec {
    fn default() -> Self {
        Self {
            cloud_properties: empty_object(),
            networks: empty_object(),
            env: empty_object(),
            persistent_disk: 0,
            disk_cloud_properties: empty_object(),
        }
    }
}

impl InstanceSpec {
    /// Requested persistent disk size in MiB, if any.
    pub fn persistent_disk_mib(&self) -> Option<u64> {
        u64::try_from(self.persistent_disk).ok().filter(|&mib| mib > 0)
    }
}

fn empty_object() -> Value {
    json!({})
}

/// A key present with no value (`env:`) reads as an empty object.
fn object_or_empty<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .filter(|v| !v.is_null())
        .unwrap_or_else(empty_object))
}

impl Manifest {
    /// Read, parse and validate the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self =
            serde_yaml::from_str(&content).map_err(|e| ManifestError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        manifest.validate()?;
        log::debug!("Loaded deployment manifest '{}'", manifest.name);
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut problems = Vec::new();

        let name_ok = NAME_PATTERN
            .as_ref()
            .is_some_and(|re| re.is_match(&self.name));
        if !name_ok {
            problems.push(format!(
                "name '{}' must only contain letters, digits, '.', '_' and '-'",
                self.name
            ));
        }

        if self.cloud_provider.mbus.trim().is_empty() {
            problems.push("cloud_provider.mbus must be provided".to_string());
        } else if Endpoint::parse(&self.cloud_provider.mbus).is_err() {
            problems.push(format!(
                "cloud_provider.mbus '{}' must look like scheme://[user:pass@]host[:port]",
                self.cloud_provider.mbus
            ));
        }

        if self.instance.persistent_disk < 0 {
            problems.push(format!(
                "instance.persistent_disk must be non-negative, got {}",
                self.instance.persistent_disk
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ManifestError::Invalid { problems })
        }
    }
}
