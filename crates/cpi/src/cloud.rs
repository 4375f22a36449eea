//! The external CPI protocol.
//!
//! Each call spawns the provider executable, writes one JSON request to its
//! stdin and reads one JSON response from its stdout:
//!
//! ```text
//! -> {"method": "delete_vm", "arguments": ["vm-1"], "context": {"director_uuid": ".."}}
//! <- {"result": null, "error": null, "log": ""}
//! <- {"result": null, "error": {"type": "Bosh::Clouds::VMNotFound", "message": "..", "ok_to_retry": false}, "log": ".."}
//! ```

use crate::Cloud;
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Values sent as the `context` of every CPI request.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudContext {
    director_uuid: String,
    properties: Map<String, Value>,
}

impl CloudContext {
    /// Context identifying the deployment by its UUID.
    pub fn new(director_uuid: impl Into<String>) -> Self {
        Self {
            director_uuid: director_uuid.into(),
            properties: Map::new(),
        }
    }

    /// Add provider properties (from the manifest's `cloud_provider.properties`).
    ///
    /// Non-object values are ignored.
    pub fn with_properties(mut self, properties: &Value) -> Self {
        if let Some(map) = properties.as_object() {
            self.properties = map.clone();
        }
        self
    }

    fn to_json(&self) -> Value {
        let mut context = self.properties.clone();
        context.insert("director_uuid".into(), json!(self.director_uuid));
        Value::Object(context)
    }
}

#[derive(Deserialize)]
struct CpiResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<CpiError>,
    #[serde(default)]
    log: String,
}

#[derive(Deserialize)]
struct CpiError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    ok_to_retry: bool,
}

/// A [`Cloud`] backed by a CPI executable.
#[derive(Debug, Clone)]
pub struct ExternalCloud {
    executable: PathBuf,
    extra_path: Option<PathBuf>,
    context: CloudContext,
}

impl ExternalCloud {
    /// Drive the provider at `executable`.
    pub fn new(executable: impl Into<PathBuf>, context: CloudContext) -> Self {
        Self {
            executable: executable.into(),
            extra_path: None,
            context,
        }
    }

    /// Put `dir` first on the provider's `PATH`.
    pub fn with_path_prefix(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_path = Some(dir.into());
        self
    }

    /// Path of the provider executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn call(&self, method: &str, arguments: Vec<Value>) -> Result<Value> {
        let request = json!({
            "method": method,
            "arguments": arguments,
            "context": self.context.to_json(),
        });
        let payload =
            serde_json::to_vec(&request).map_err(|e| Error::cloud(method, e.to_string()))?;

        log::debug!("CPI '{}' via {}", method, self.executable.display());

        let mut command = Command::new(&self.executable);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.extra_path {
            let current = env::var_os("PATH").unwrap_or_default();
            let joined = env::join_paths(
                std::iter::once(dir.clone()).chain(env::split_paths(&current)),
            )
            .map_err(|e| Error::cloud(method, e.to_string()))?;
            command.env("PATH", joined);
        }

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            path: self.executable.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|e| Error::io(&self.executable, e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::io(&self.executable, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::cloud(
                method,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let response: CpiResponse = serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::cloud(method, format!("unparseable response: {}", e))
        })?;

        if !response.log.is_empty() {
            log::debug!("CPI '{}' log:\n{}", method, response.log.trim_end());
        }

        if let Some(err) = response.error {
            return Err(Error::Cloud {
                method: method.to_string(),
                message: if err.kind.is_empty() {
                    err.message
                } else {
                    format!("{}: {}", err.kind, err.message)
                },
                ok_to_retry: err.ok_to_retry,
            });
        }

        Ok(response.result)
    }

    fn call_for_cid(&self, method: &str, arguments: Vec<Value>) -> Result<String> {
        match self.call(method, arguments)? {
            Value::String(cid) if !cid.is_empty() => Ok(cid),
            other => Err(Error::cloud(
                method,
                format!("expected a CID, got {}", other),
            )),
        }
    }
}

impl Cloud for ExternalCloud {
    fn create_stemcell(&self, image_path: &Path, cloud_properties: &Value) -> Result<String> {
        self.call_for_cid(
            "create_stemcell",
            vec![json!(image_path.to_string_lossy()), cloud_properties.clone()],
        )
    }

    fn delete_stemcell(&self, stemcell_cid: &str) -> Result<()> {
        self.call("delete_stemcell", vec![json!(stemcell_cid)])
            .map(|_| ())
    }

    fn create_vm(
        &self,
        agent_id: &str,
        stemcell_cid: &str,
        cloud_properties: &Value,
        networks: &Value,
        env: &Value,
    ) -> Result<String> {
        self.call_for_cid(
            "create_vm",
            vec![
                json!(agent_id),
                json!(stemcell_cid),
                cloud_properties.clone(),
                networks.clone(),
                json!([]),
                env.clone(),
            ],
        )
    }

    fn delete_vm(&self, vm_cid: &str) -> Result<()> {
        self.call("delete_vm", vec![json!(vm_cid)]).map(|_| ())
    }

    fn create_disk(&self, size: u64, cloud_properties: &Value, vm_cid: &str) -> Result<String> {
        self.call_for_cid(
            "create_disk",
            vec![json!(size), cloud_properties.clone(), json!(vm_cid)],
        )
    }

    fn attach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()> {
        self.call("attach_disk", vec![json!(vm_cid), json!(disk_cid)])
            .map(|_| ())
    }

    fn detach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<()> {
        self.call("detach_disk", vec![json!(vm_cid), json!(disk_cid)])
            .map(|_| ())
    }

    fn delete_disk(&self, disk_cid: &str) -> Result<()> {
        self.call("delete_disk", vec![json!(disk_cid)]).map(|_| ())
    }
}
