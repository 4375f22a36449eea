//! JSON-over-HTTP agent client.
//!
//! Every call is a `POST <mbus>/agent` carrying
//! `{"method": .., "arguments": [..], "reply_to": ..}`. The agent answers
//! `{"value": ..}` or `{"exception": {"message": ..}}`.
//!
//! Long-running methods (`stop`, `mount_disk`, `unmount_disk`) may answer with
//! a running task, `{"value": {"agent_task_id": "..", "state": "running"}}`,
//! which is then polled through `get_task` until it settles.

use crate::error::{Error, Result};
use crate::{AgentClient, AgentClientFactory};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::thread;
use std::time::Duration;

// ============================================================================
// Endpoint
// ============================================================================

/// A parsed message-bus endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl Endpoint {
    /// Parse `scheme://[user[:pass]@]host[:port][/path]`.
    pub fn parse(mbus_url: &str) -> Result<Self> {
        let invalid = || Error::InvalidEndpoint(mbus_url.to_string());

        let (scheme, rest) = mbus_url.split_once("://").ok_or_else(invalid)?;
        let scheme_ok = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(invalid());
        }

        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        let (userinfo, host) = match authority.rsplit_once('@') {
            Some((userinfo, host)) => (Some(userinfo), host),
            None => (None, authority),
        };

        if host.is_empty() {
            return Err(invalid());
        }
        if let Some((name, port)) = host.rsplit_once(':') {
            if name.is_empty() || port.parse::<u16>().is_err() {
                return Err(invalid());
            }
        }

        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(info.to_string()), None),
            },
            None => (None, None),
        };

        Ok(Self {
            base_url: format!("{}://{}{}", scheme, host, path.trim_end_matches('/')),
            username,
            password,
        })
    }

    /// URL without credentials.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL requests are posted to.
    #[must_use]
    pub fn agent_url(&self) -> String {
        format!("{}/agent", self.base_url)
    }

    /// `Authorization` header value when the endpoint carries credentials.
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        let user = self.username.as_deref()?;
        let pass = self.password.as_deref().unwrap_or("");
        Some(format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", user, pass))
        ))
    }
}

// Credentials never reach logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

// ============================================================================
// Replies
// ============================================================================

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    exception: Option<Exception>,
}

#[derive(Deserialize)]
struct Exception {
    message: String,
}

fn parse_reply(method: &str, body: &str) -> Result<Value> {
    let reply: Reply = serde_json::from_str(body).map_err(|e| Error::InvalidResponse {
        method: method.to_string(),
        message: e.to_string(),
    })?;

    if let Some(exception) = reply.exception {
        return Err(Error::Agent {
            method: method.to_string(),
            message: exception.message,
        });
    }

    Ok(reply.value.unwrap_or(Value::Null))
}

/// Task id when `value` describes a task that is still running.
fn running_task(value: &Value) -> Option<String> {
    let task = value.as_object()?;
    if task.get("state")?.as_str()? != "running" {
        return None;
    }
    task.get("agent_task_id")?.as_str().map(str::to_string)
}

// ============================================================================
// Client
// ============================================================================

/// How long-running agent tasks are awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPolling {
    /// Pause between `get_task` calls.
    pub interval: Duration,
    /// Maximum number of `get_task` calls before giving up.
    pub max_checks: u32,
}

impl Default for TaskPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_checks: 600,
        }
    }
}

/// Agent client speaking JSON over HTTP.
pub struct HttpAgentClient {
    endpoint: Endpoint,
    http: ureq::Agent,
    reply_to: String,
    tasks: TaskPolling,
}

impl HttpAgentClient {
    /// Create a client for `endpoint`.
    pub fn new(endpoint: Endpoint, request_timeout: Duration, tasks: TaskPolling) -> Self {
        let http: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            endpoint,
            http,
            reply_to: uuid::Uuid::new_v4().to_string(),
            tasks,
        }
    }

    fn send(&self, method: &str, arguments: Vec<Value>) -> Result<Value> {
        let request = json!({
            "method": method,
            "arguments": arguments,
            "reply_to": self.reply_to,
        });
        log::debug!("Sending '{}' to agent at {}", method, self.endpoint);

        let mut builder = self
            .http
            .post(self.endpoint.agent_url())
            .header("Content-Type", "application/json");
        if let Some(auth) = self.endpoint.authorization() {
            builder = builder.header("Authorization", auth);
        }

        let mut response = builder.send_json(&request)?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;

        if !(200..300).contains(&status) {
            return Err(Error::http(
                format!("agent returned HTTP {}: {}", status, body.trim()),
                Some(status),
            ));
        }

        parse_reply(method, &body)
    }

    /// Send a method that may start an agent task and wait for it.
    fn send_and_wait(&self, method: &str, arguments: Vec<Value>) -> Result<Value> {
        let mut value = self.send(method, arguments)?;
        let mut checks = 0;

        while let Some(task_id) = running_task(&value) {
            if checks >= self.tasks.max_checks {
                return Err(Error::TaskTimeout {
                    method: method.to_string(),
                    task_id,
                    checks,
                });
            }
            checks += 1;
            thread::sleep(self.tasks.interval);
            value = self.send("get_task", vec![json!(task_id)])?;
        }

        Ok(value)
    }
}

impl AgentClient for HttpAgentClient {
    fn ping(&self) -> Result<String> {
        let value = self.send("ping", vec![])?;
        Ok(value
            .as_str()
            .map_or_else(|| value.to_string(), str::to_string))
    }

    fn stop(&self) -> Result<()> {
        self.send_and_wait("stop", vec![]).map(|_| ())
    }

    fn start(&self) -> Result<()> {
        self.send("start", vec![]).map(|_| ())
    }

    fn list_disk(&self) -> Result<Vec<String>> {
        let value = self.send("list_disk", vec![])?;
        match value {
            Value::Null => Ok(vec![]),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(cid) => Ok(cid),
                    other => Err(Error::InvalidResponse {
                        method: "list_disk".to_string(),
                        message: format!("expected disk cid, got {}", other),
                    }),
                })
                .collect(),
            other => Err(Error::InvalidResponse {
                method: "list_disk".to_string(),
                message: format!("expected a list of disk cids, got {}", other),
            }),
        }
    }

    fn mount_disk(&self, disk_cid: &str) -> Result<()> {
        self.send_and_wait("mount_disk", vec![json!(disk_cid)])
            .map(|_| ())
    }

    fn unmount_disk(&self, disk_cid: &str) -> Result<()> {
        self.send_and_wait("unmount_disk", vec![json!(disk_cid)])
            .map(|_| ())
    }
}

/// Builds [`HttpAgentClient`]s.
#[derive(Debug, Clone, Copy)]
pub struct HttpAgentClientFactory {
    request_timeout: Duration,
    tasks: TaskPolling,
}

impl HttpAgentClientFactory {
    /// Create a factory whose clients use the given timings.
    #[must_use]
    pub fn new(request_timeout: Duration, tasks: TaskPolling) -> Self {
        Self {
            request_timeout,
            tasks,
        }
    }
}

impl Default for HttpAgentClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), TaskPolling::default())
    }
}

impl AgentClientFactory for HttpAgentClientFactory {
    fn create(&self, mbus_url: &str) -> Result<Box<dyn AgentClient>> {
        let endpoint = Endpoint::parse(mbus_url)?;
        Ok(Box::new(HttpAgentClient::new(
            endpoint,
            self.request_timeout,
            self.tasks,
        )))
    }
}
