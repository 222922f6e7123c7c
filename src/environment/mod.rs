//! Build environments.
//!
//! A build target runs its tools either directly on the host, after a
//! preflight check that every tool exists, or inside a Docker container
//! built from a rendered Dockerfile for the target's platform.

mod container;
mod host;

pub use container::{ContainerEnvironment, ImageSpec};
pub use host::{required_tools, HostEnvironment};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BuilderConfig, ToolPaths};
use crate::error::{ProvisionError, ToolError};
use crate::process::{Invocation, ToolOutput};
use crate::target::BuildTarget;

/// Where build tools run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    #[default]
    Host,
    Docker,
}

impl EnvironmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentKind::Host => "host",
            EnvironmentKind::Docker => "docker",
        }
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "host" => Ok(EnvironmentKind::Host),
            "docker" => Ok(EnvironmentKind::Docker),
            other => Err(format!(
                "unsupported environment '{other}'; expected 'host' or 'docker'"
            )),
        }
    }
}

/// Runs tool invocations for one build target.
pub trait Environment: Send + Sync {
    /// Short description for logs, e.g. `host` or the image tag.
    fn name(&self) -> String;

    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;
}

/// Shared handle to a provisioned environment.
#[derive(Clone)]
pub struct EnvironmentHandle {
    inner: Arc<dyn Environment>,
}

impl EnvironmentHandle {
    pub fn new(environment: impl Environment + 'static) -> Self {
        Self {
            inner: Arc::new(environment),
        }
    }

    pub fn name(&self) -> String {
        self.inner.name()
    }

    pub fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        self.inner.run(invocation)
    }
}

impl fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("name", &self.inner.name())
            .finish()
    }
}

/// Resolves an environment for a build target.
#[derive(Debug, Clone)]
pub struct Provisioner {
    kind: EnvironmentKind,
    tools: ToolPaths,
    work_dir: PathBuf,
    templates_dir: Option<PathBuf>,
    maintainer: String,
    timeout: Option<Duration>,
}

impl Provisioner {
    pub fn new(config: &BuilderConfig) -> Self {
        Self {
            kind: config.environment,
            tools: config.tools.clone(),
            work_dir: config.work_dir.clone(),
            templates_dir: config.templates_dir.clone(),
            maintainer: config.maintainer.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    /// Prepare the environment `target` builds in. Failure here makes every
    /// build of the target impossible.
    pub fn provision(&self, target: &BuildTarget) -> Result<EnvironmentHandle, ProvisionError> {
        match self.kind {
            EnvironmentKind::Host => {
                let host = HostEnvironment::preflight(target, &self.tools, self.timeout)?;
                info!(target = %target, "host environment ready");
                Ok(EnvironmentHandle::new(host))
            }
            EnvironmentKind::Docker => {
                let container = ContainerEnvironment::build(
                    target,
                    &self.tools,
                    &self.work_dir,
                    self.templates_dir.as_deref(),
                    &self.maintainer,
                    self.timeout,
                )?;
                info!(target = %target, image = %container.image(), "container environment ready");
                Ok(EnvironmentHandle::new(container))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Tool;

    struct Echo;

    impl Environment for Echo {
        fn name(&self) -> String {
            "echo".to_string()
        }

        fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput {
                code: Some(0),
                output: invocation.command_line(),
            })
        }
    }

    #[test]
    fn handle_delegates_to_environment() {
        let handle = EnvironmentHandle::new(Echo);
        let clone = handle.clone();
        let output = clone
            .run(&Invocation::new(Tool::Make, "/tmp").arg("dist"))
            .unwrap();
        assert_eq!(output.output, "make dist");
        assert_eq!(format!("{handle:?}"), "EnvironmentHandle { name: \"echo\" }");
    }

    #[test]
    fn environment_kind_parses() {
        assert_eq!("docker".parse::<EnvironmentKind>(), Ok(EnvironmentKind::Docker));
        assert!("vagrant".parse::<EnvironmentKind>().is_err());
    }
}
