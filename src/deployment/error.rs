use crate::manifest::ManifestError;
use crate::stemcell::StemcellError;
use std::error::Error as StdError;

/// Input that failed the validation stage. Nothing has been touched yet.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("validating deployment manifest")]
    Manifest(#[from] ManifestError),

    #[error("validating cpi release")]
    Release(#[source] cpi::Error),

    #[error("validating stemcell")]
    Stemcell(#[from] StemcellError),
}

/// Errors from deploying or deleting a deployment.
///
/// Step-scoped variants name the step so the message reads like the
/// progress line that failed.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No deployment set")]
    NoDeploymentTarget,

    #[error("installing CPI")]
    CpiInstall(#[source] cpi::Error),

    #[error("uninstalling CPI")]
    CpiUninstall(#[source] cpi::Error),

    #[error("agent on VM '{vm_cid}' did not respond after {attempts} attempt(s): {last_error}")]
    AgentUnreachable {
        vm_cid: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{step}")]
    Agent {
        step: String,
        #[source]
        source: agentclient::Error,
    },

    #[error("{step}")]
    Cloud {
        step: String,
        #[source]
        source: cpi::Error,
    },

    #[error("deleting unused resources: {}", failures.join("; "))]
    OrphanCleanup { failures: Vec<String> },

    #[error("deployment state")]
    State(#[from] deployment_state::Error),
}

impl DeployError {
    pub fn agent(step: &str) -> impl FnOnce(agentclient::Error) -> Self + '_ {
        move |source| Self::Agent {
            step: step.to_string(),
            source,
        }
    }

    pub fn cloud(step: &str) -> impl FnOnce(cpi::Error) -> Self + '_ {
        move |source| Self::Cloud {
            step: step.to_string(),
            source,
        }
    }
}

/// `outer: inner: innermost`
pub fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
