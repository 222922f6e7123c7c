//! Host environment with preflight checks.
//!
//! Tool paths resolve in order:
//! 1. `[tools]` config entry or `DEP_BUILDER_*` env var
//! 2. System PATH (`which`)

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use super::Environment;
use crate::config::ToolPaths;
use crate::error::{ProvisionError, ToolError};
use crate::process::{find_program, run_invocation, Invocation, Tool, ToolOutput};
use crate::target::{BuildTarget, PackageFormat};

/// Helper commands the packaging tools call themselves, as
/// (command, package) pairs.
fn helper_commands(format: PackageFormat) -> &'static [(&'static str, &'static str)] {
    match format {
        PackageFormat::Dpkg => &[("dh", "debhelper"), ("fakeroot", "fakeroot")],
        _ => &[],
    }
}

/// Tools invoked directly when building `target`.
pub fn required_tools(target: &BuildTarget) -> &'static [Tool] {
    match target.format {
        PackageFormat::Dpkg => &[Tool::DpkgBuildpackage, Tool::Patch],
        PackageFormat::DpkgSource => &[Tool::DpkgSource, Tool::Patch],
        PackageFormat::Rpm | PackageFormat::Srpm => &[Tool::Rpmbuild, Tool::Patch],
        PackageFormat::Wheel => &[Tool::Python, Tool::Patch],
        PackageFormat::Source => &[Tool::Python, Tool::Patch, Tool::Shell, Tool::Make],
    }
}

fn resolve(tool: Tool, overrides: &ToolPaths) -> Option<PathBuf> {
    match overrides.get(tool) {
        Some(path) if path.is_file() => Some(path.to_path_buf()),
        Some(path) => find_program(path),
        None => find_program(tool.program()),
    }
}

/// Runs tools directly on the build host.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    programs: HashMap<Tool, PathBuf>,
    overrides: ToolPaths,
    timeout: Option<Duration>,
}

impl HostEnvironment {
    /// Check that every tool `target` needs exists, listing all missing
    /// tools with the package that provides them.
    pub fn preflight(
        target: &BuildTarget,
        overrides: &ToolPaths,
        timeout: Option<Duration>,
    ) -> Result<Self, ProvisionError> {
        let mut missing = Vec::new();
        let mut programs = HashMap::new();

        for &tool in required_tools(target) {
            match resolve(tool, overrides) {
                Some(path) => {
                    debug!(tool = %tool, path = %path.display(), "resolved tool");
                    programs.insert(tool, path);
                }
                None => {
                    let name = overrides
                        .get(tool)
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| tool.program().to_string());
                    missing.push((name, tool.package().to_string()));
                }
            }
        }
        for (command, package) in helper_commands(target.format) {
            if find_program(command).is_none() {
                missing.push((command.to_string(), package.to_string()));
            }
        }

        if !missing.is_empty() {
            return Err(ProvisionError::MissingTools(missing));
        }
        Ok(Self {
            programs,
            overrides: overrides.clone(),
            timeout,
        })
    }
}

impl Environment for HostEnvironment {
    fn name(&self) -> String {
        "host".to_string()
    }

    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let program = self
            .programs
            .get(&invocation.tool)
            .cloned()
            .or_else(|| resolve(invocation.tool, &self.overrides))
            .unwrap_or_else(|| PathBuf::from(invocation.tool.program()));
        run_invocation(&program, invocation, self.timeout)
    }
}
