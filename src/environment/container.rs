use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use super::Environment;
use crate::config::ToolPaths;
use crate::error::{ProvisionError, ToolError};
use crate::process::{find_program, run_command, Invocation, Tool, ToolOutput};
use crate::target::{BuildTarget, PackageFamily};
use crate::template::{builtin, load_override_or, TemplateContext};

const DEBIAN_CODENAMES: &[&str] = &["buster", "bullseye", "bookworm", "trixie", "sid"];

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

const KILL_TIMEOUT: Option<Duration> = Some(Duration::from_secs(30));

/// Image a target's tools run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    /// Platform name used in the image tag and template overrides, e.g.
    /// `debian`, `ubuntu`, `fedora` or `python`.
    pub platform: &'static str,
    pub base_image: &'static str,
    pub base_tag: String,
}

impl ImageSpec {
    pub fn for_target(target: &BuildTarget) -> Self {
        let distribution = target.distribution.as_deref();
        match target.family() {
            PackageFamily::Dpkg => {
                let codename = distribution.unwrap_or("jammy");
                let platform = if DEBIAN_CODENAMES.contains(&codename) {
                    "debian"
                } else {
                    "ubuntu"
                };
                Self {
                    platform,
                    base_image: platform,
                    base_tag: codename.to_string(),
                }
            }
            PackageFamily::Rpm => {
                let release = distribution.unwrap_or("fc40");
                Self {
                    platform: "fedora",
                    base_image: "fedora",
                    base_tag: release.trim_start_matches("fc").to_string(),
                }
            }
            PackageFamily::Pypi => Self {
                platform: "python",
                base_image: "python",
                base_tag: "3.12-slim".to_string(),
            },
        }
    }

    /// Tag of the built image, e.g. `dep-builder-debian:bookworm`.
    pub fn tag(&self) -> String {
        format!("dep-builder-{}:{}", self.platform, self.base_tag)
    }

    fn dockerfile_builtin(&self) -> &'static str {
        match self.platform {
            "fedora" => builtin::DOCKERFILE_RPM,
            "python" => builtin::DOCKERFILE_PYTHON,
            _ => builtin::DOCKERFILE_DPKG,
        }
    }

    /// Render the Dockerfile; `<templates>/docker/<platform>/Dockerfile`
    /// replaces the built-in body.
    pub fn render_dockerfile(
        &self,
        templates_dir: Option<&Path>,
        maintainer: &str,
    ) -> Result<String, ProvisionError> {
        let candidates = templates_dir
            .map(|dir| vec![dir.join("docker").join(self.platform).join("Dockerfile")])
            .unwrap_or_default();
        let render_error = |source| ProvisionError::Render {
            image: self.tag(),
            source,
        };

        let (template, _) = load_override_or("Dockerfile", &candidates, self.dockerfile_builtin())
            .map_err(|e| render_error(e.into()))?;
        let mut context = TemplateContext::new();
        context
            .insert("base_image", self.base_image)
            .insert("image_tag", self.base_tag.as_str())
            .insert("platform", self.platform)
            .insert("maintainer", maintainer);
        template.substitute(&context, &self.tag()).map_err(render_error)
    }
}

/// Runs tools inside a Docker container with the work directory mounted at
/// the same path, as the owner of the work directory.
#[derive(Debug, Clone)]
pub struct ContainerEnvironment {
    docker: PathBuf,
    image: String,
    work_dir: PathBuf,
    user: String,
    timeout: Option<Duration>,
}

impl ContainerEnvironment {
    /// Render the target's Dockerfile and build its image.
    pub fn build(
        target: &BuildTarget,
        tools: &ToolPaths,
        work_dir: &Path,
        templates_dir: Option<&Path>,
        maintainer: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, ProvisionError> {
        let docker = match tools.get(Tool::Docker) {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => find_program(path).ok_or(ProvisionError::DockerNotFound)?,
            None => find_program(Tool::Docker.program()).ok_or(ProvisionError::DockerNotFound)?,
        };

        let spec = ImageSpec::for_target(target);
        let image = spec.tag();
        let dockerfile = spec.render_dockerfile(templates_dir, maintainer)?;

        let context_dir = work_dir
            .join("docker")
            .join(format!("{}-{}", spec.platform, spec.base_tag));
        let io_error = |source| ProvisionError::Io {
            path: context_dir.clone(),
            source,
        };
        fs::create_dir_all(&context_dir).map_err(io_error)?;
        fs::write(context_dir.join("Dockerfile"), dockerfile).map_err(io_error)?;

        info!(image = %image, "building environment image");
        let mut command = Command::new(&docker);
        command.arg("build").arg("-t").arg(&image).arg(&context_dir);
        run_command(command, &format!("docker build -t {image}"), None)
            .map_err(|source| ProvisionError::ImageBuild {
                image: image.clone(),
                source,
            })?;

        let io_error = |source| ProvisionError::Io {
            path: work_dir.to_path_buf(),
            source,
        };
        let work_dir = work_dir.canonicalize().map_err(io_error)?;
        let owner = fs::metadata(&work_dir).map_err(io_error)?;
        Ok(Self {
            docker,
            image,
            user: format!("{}:{}", owner.uid(), owner.gid()),
            work_dir,
            timeout,
        })
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// `docker run` arguments for `invocation` in a container called `name`.
    fn run_args(&self, name: &str, invocation: &Invocation) -> Vec<String> {
        let mount = self.work_dir.display().to_string();
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--init".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--user".to_string(),
            self.user.clone(),
            "-v".to_string(),
            format!("{mount}:{mount}"),
            "-w".to_string(),
            absolute_in(&self.work_dir, &invocation.cwd)
                .display()
                .to_string(),
        ];
        for (key, value) in &invocation.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args.push(invocation.tool.program().to_string());
        args.extend(invocation.args.iter().cloned());
        args
    }
}

impl Environment for ContainerEnvironment {
    fn name(&self) -> String {
        self.image.clone()
    }

    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let name = format!(
            "dep-builder-{}-{}",
            std::process::id(),
            CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let mut command = Command::new(&self.docker);
        command.args(self.run_args(&name, invocation));
        let result = run_command(command, &invocation.command_line(), self.timeout);
        if let Err(ToolError::TimedOut { .. }) = &result {
            // Killing the client leaves the container running.
            let mut kill = Command::new(&self.docker);
            kill.arg("kill").arg(&name);
            if let Err(err) = run_command(kill, &format!("docker kill {name}"), KILL_TIMEOUT) {
                warn!(container = %name, error = %err, "container not stopped after timeout");
            }
        }
        result
    }
}

fn absolute_in(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
