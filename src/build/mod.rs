//! Build orchestration.
//!
//! Every selected entry runs the same pipeline of typed steps:
//!
//! 1. Prepare a fresh working directory `<work>/<target-slug>/<name>/`
//! 2. Extract the source archive, fetching it first when it is missing
//!    and a [`SourceFetcher`] is set
//! 3. Apply the entry's patches
//! 4. Render the target's packaging files
//! 5. Invoke the packaging tools inside the environment
//! 6. Collect the produced package into the output directory
//!
//! A failing step fails the entry. What happens next is decided by the
//! [`FailurePolicy`].

pub mod collect;
pub mod download;
pub mod plan;
pub mod source;
pub mod steps;

pub use collect::{CollectedOutput, OutputLock};
pub use download::{PypiDownloader, SourceFetcher};
pub use plan::{BuildPlan, PlannedEntry};

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{BuilderConfig, RenderConfig};
use crate::environment::EnvironmentHandle;
use crate::error::PlanError;
use crate::manifest::DependencyEntry;
use crate::process::Invocation;
use crate::target::{BuildTarget, PackageFamily, PackageFormat};
use crate::template::{render_bundle, TemplateSet};
use steps::Workspace;

/// What to do after an entry fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and keep building independent entries.
    Continue,
    /// Stop at the first failure; later entries are not attempted.
    #[default]
    Abort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::Continue => "continue",
            FailurePolicy::Abort => "abort",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
            BuildStatus::Skipped => "skipped",
        })
    }
}

/// Pipeline step of an entry build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStep {
    Prepare,
    Extract,
    Patch,
    Render,
    Invoke,
    Collect,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStep::Prepare => "prepare",
            BuildStep::Extract => "extract",
            BuildStep::Patch => "patch",
            BuildStep::Render => "render",
            BuildStep::Invoke => "invoke",
            BuildStep::Collect => "collect",
        })
    }
}

/// Outcome of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub name: String,
    pub version: String,
    pub status: BuildStatus,
    #[serde(default)]
    pub outputs: Vec<CollectedOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<BuildStep>,
    /// Failure reason, or why the entry was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
    #[serde(default)]
    pub duration_ms: u64,
    /// Captured tool output; kept in the build log, not the report.
    #[serde(skip)]
    pub tool_output: String,
}

impl BuildResult {
    fn skipped(entry: &DependencyEntry, reason: impl Into<String>) -> Self {
        Self {
            name: entry.name.clone(),
            version: entry.version_string().to_string(),
            status: BuildStatus::Skipped,
            outputs: Vec::new(),
            failed_step: None,
            message: Some(reason.into()),
            log: None,
            duration_ms: 0,
            tool_output: String::new(),
        }
    }
}

/// Ordered results of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub target: String,
    pub format: PackageFormat,
    pub environment: String,
    pub policy: FailurePolicy,
    pub results: Vec<BuildResult>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn count(&self, status: BuildStatus) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == status)
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(BuildStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(BuildStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(BuildStatus::Skipped)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn outputs(&self) -> impl Iterator<Item = &CollectedOutput> {
        self.results.iter().flat_map(|result| result.outputs.iter())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Build summary for {} ({}): {} succeeded, {} failed, {} skipped",
            self.target,
            self.environment,
            self.succeeded(),
            self.failed(),
            self.skipped()
        )?;
        for result in &self.results {
            match result.status {
                BuildStatus::Succeeded => {
                    for output in &result.outputs {
                        writeln!(f, "  built:   {} -> {}", result.name, output.file_name())?;
                    }
                }
                BuildStatus::Failed => {
                    let step = result
                        .failed_step
                        .map(|step| step.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    writeln!(
                        f,
                        "  failed:  {} ({}): {}",
                        result.name,
                        step,
                        result.message.as_deref().unwrap_or("")
                    )?;
                    if let Some(log) = &result.log {
                        writeln!(f, "           log: {}", log.display())?;
                    }
                }
                BuildStatus::Skipped => writeln!(
                    f,
                    "  skipped: {} ({})",
                    result.name,
                    result.message.as_deref().unwrap_or("")
                )?,
            }
        }
        Ok(())
    }
}

struct StepFailure {
    step: BuildStep,
    error: anyhow::Error,
}

fn at(step: BuildStep) -> impl FnOnce(anyhow::Error) -> StepFailure {
    move |error| StepFailure { step, error }
}

/// Drives the build pipeline for planned entries.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    environment: EnvironmentHandle,
    render_config: RenderConfig,
    sources_dir: PathBuf,
    work_dir: PathBuf,
    output_dir: PathBuf,
    templates_dir: Option<PathBuf>,
    policy: FailurePolicy,
    jobs: usize,
    fetcher: Option<Arc<dyn SourceFetcher>>,
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Create `path` and resolve it the way the container mount does, so work
/// paths handed to tools exist on both sides of a symlinked work dir.
fn resolved_work_dir(path: &Path) -> PathBuf {
    if let Err(err) = fs::create_dir_all(path) {
        debug!(path = %path.display(), error = %err, "work dir not created");
    }
    path.canonicalize().unwrap_or_else(|_| absolute(path))
}

impl Orchestrator {
    pub fn new(
        config: &BuilderConfig,
        render_config: RenderConfig,
        environment: EnvironmentHandle,
    ) -> Self {
        Self {
            environment,
            render_config,
            sources_dir: absolute(&config.sources_dir),
            work_dir: resolved_work_dir(&config.work_dir),
            output_dir: absolute(&config.output_dir),
            templates_dir: config.templates_dir.clone(),
            policy: config.policy,
            jobs: config.jobs.max(1),
            fetcher: None,
        }
    }

    /// Fetch source archives of Python entries missing from the sources
    /// directory through `fetcher`.
    pub fn with_fetcher(mut self, fetcher: impl SourceFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Plan and build `entries` for `target`.
    pub fn build(
        &self,
        entries: &[&DependencyEntry],
        target: &BuildTarget,
    ) -> Result<RunSummary, PlanError> {
        let plan = BuildPlan::new(entries, target, false)?;
        Ok(self.run(&plan))
    }

    /// Build every entry of `plan`. Results are in plan order.
    pub fn run(&self, plan: &BuildPlan<'_>) -> RunSummary {
        let start = Instant::now();
        let target = plan.target();
        let entries = plan.entries();
        info!(
            target = %target,
            entries = entries.len(),
            policy = %self.policy,
            jobs = self.jobs,
            "starting build"
        );

        let pool = if self.jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
                Ok(pool) => Some(pool),
                Err(err) => {
                    warn!(error = %err, "thread pool unavailable; building sequentially");
                    None
                }
            }
        } else {
            None
        };

        let mut results: Vec<Option<BuildResult>> = vec![None; entries.len()];
        // Entries whose dependents must not be built.
        let mut blocked: BTreeSet<String> = BTreeSet::new();
        let mut aborted_by: Option<String> = None;

        for wave in plan.waves() {
            let mut runnable = Vec::new();
            for index in wave {
                let planned = &entries[index];
                let entry = planned.entry;
                if let Some(failed) = &aborted_by {
                    results[index] = Some(BuildResult::skipped(
                        entry,
                        format!("not attempted: run aborted after '{failed}' failed"),
                    ));
                } else if planned.disabled {
                    results[index] = Some(BuildResult::skipped(
                        entry,
                        format!("disabled for {}", target.format),
                    ));
                } else if let Some(hint) = entry.depends_on.iter().find(|hint| blocked.contains(*hint)) {
                    blocked.insert(entry.name.clone());
                    results[index] = Some(BuildResult::skipped(
                        entry,
                        format!("depends on '{hint}', which was not built"),
                    ));
                } else {
                    runnable.push(index);
                }
            }

            let outcomes: Vec<(usize, BuildResult)> = match &pool {
                Some(pool) if runnable.len() > 1 => pool.install(|| {
                    runnable
                        .par_iter()
                        .map(|&index| (index, self.build_entry(&entries[index], target)))
                        .collect()
                }),
                _ => {
                    let mut outcomes = Vec::with_capacity(runnable.len());
                    for &index in &runnable {
                        if let Some(failed) = &aborted_by {
                            outcomes.push((
                                index,
                                BuildResult::skipped(
                                    entries[index].entry,
                                    format!("not attempted: run aborted after '{failed}' failed"),
                                ),
                            ));
                            continue;
                        }
                        let result = self.build_entry(&entries[index], target);
                        if result.status == BuildStatus::Failed
                            && self.policy == FailurePolicy::Abort
                        {
                            aborted_by = Some(result.name.clone());
                        }
                        outcomes.push((index, result));
                    }
                    outcomes
                }
            };

            for (index, result) in outcomes {
                if result.status != BuildStatus::Succeeded {
                    blocked.insert(result.name.clone());
                }
                if result.status == BuildStatus::Failed
                    && self.policy == FailurePolicy::Abort
                    && aborted_by.is_none()
                {
                    aborted_by = Some(result.name.clone());
                }
                results[index] = Some(result);
            }
        }

        let results = results
            .into_iter()
            .zip(entries)
            .map(|(result, planned)| {
                result.unwrap_or_else(|| BuildResult::skipped(planned.entry, "not scheduled"))
            })
            .collect::<Vec<_>>();
        let summary = RunSummary {
            target: target.slug(),
            format: target.format,
            environment: self.environment.name(),
            policy: self.policy,
            results,
            duration_ms: millis(start.elapsed()),
        };
        info!(
            target = %target,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "build finished"
        );
        summary
    }

    /// Run the pipeline for one entry. Never panics on tool or I/O failure;
    /// every error becomes a failed result.
    fn build_entry(&self, planned: &PlannedEntry<'_>, target: &BuildTarget) -> BuildResult {
        let start = Instant::now();
        let entry = planned.entry;
        let entry_dir = self.work_dir.join(target.slug()).join(&entry.name);
        let mut tool_output = String::new();

        info!(entry = %entry.name, version = entry.version_string(), "building");
        let outcome = self.run_steps(planned, target, &entry_dir, &mut tool_output);

        let log_path = entry_dir.join("build.log");
        let log = match fs::write(&log_path, &tool_output) {
            Ok(()) => Some(log_path),
            Err(err) => {
                debug!(path = %log_path.display(), error = %err, "build log not written");
                None
            }
        };

        let mut result = BuildResult {
            name: entry.name.clone(),
            version: entry.version_string().to_string(),
            status: BuildStatus::Succeeded,
            outputs: Vec::new(),
            failed_step: None,
            message: None,
            log,
            duration_ms: millis(start.elapsed()),
            tool_output,
        };
        match outcome {
            Ok(output) => {
                info!(entry = %entry.name, package = %output.file_name(), "built");
                result.outputs.push(output);
            }
            Err(failure) => {
                let message = format!("{:#}", failure.error);
                warn!(entry = %entry.name, step = %failure.step, error = %message, "build failed");
                result.status = BuildStatus::Failed;
                result.failed_step = Some(failure.step);
                result.message = Some(message);
            }
        }
        result
    }

    fn run_steps(
        &self,
        planned: &PlannedEntry<'_>,
        target: &BuildTarget,
        entry_dir: &Path,
        tool_output: &mut String,
    ) -> Result<CollectedOutput, StepFailure> {
        let entry = planned.entry;

        debug!(entry = %entry.name, dir = %entry_dir.display(), "prepare");
        prepare_dir(entry_dir).map_err(at(BuildStep::Prepare))?;

        debug!(entry = %entry.name, "extract");
        let archive = self.source_archive(entry).map_err(at(BuildStep::Extract))?;
        let source_tree = source::extract_source(&archive, entry_dir)
            .and_then(|tree| source::rename_tree(&tree, &steps::source_dir_name(entry)))
            .map_err(at(BuildStep::Extract))?;
        let workspace = Workspace {
            entry_dir: entry_dir.to_path_buf(),
            source_tree,
        };
        if target.family() == PackageFamily::Dpkg {
            steps::write_orig_tarball(entry, &workspace).map_err(at(BuildStep::Extract))?;
        }

        for patch in &entry.patches {
            debug!(entry = %entry.name, patch = %patch, "patch");
            let copied = self
                .copy_patch(patch, &workspace)
                .map_err(at(BuildStep::Patch))?;
            let invocation = steps::patch_invocation(&copied, &workspace);
            self.invoke(&invocation, tool_output)
                .map_err(at(BuildStep::Patch))?;
        }

        debug!(entry = %entry.name, "render");
        self.render(entry, target, &workspace)
            .map_err(at(BuildStep::Render))?;

        debug!(entry = %entry.name, "invoke");
        steps::prepare_invoke(target, entry, &workspace).map_err(at(BuildStep::Invoke))?;
        let epoch = self.render_config.build_date.unix_timestamp();
        for invocation in steps::invocations(target, entry, &workspace, epoch) {
            self.invoke(&invocation, tool_output)
                .map_err(at(BuildStep::Invoke))?;
        }

        debug!(entry = %entry.name, "collect");
        let produced =
            steps::locate_package(target, entry, &workspace).map_err(at(BuildStep::Collect))?;
        collect::collect_file(&produced, &self.output_dir, &planned.output_filename)
            .map_err(at(BuildStep::Collect))
    }

    /// The entry's archive in the sources directory, downloaded first when
    /// it is missing and a fetcher is set.
    fn source_archive(&self, entry: &DependencyEntry) -> Result<PathBuf> {
        if let Some(archive) = source::locate_archive(&self.sources_dir, entry) {
            return Ok(archive);
        }
        let missing = format!(
            "no source archive '{}-{}.{{{}}}' in '{}'",
            entry.source_name(),
            entry.version_string(),
            source::ARCHIVE_EXTENSIONS.join(","),
            self.sources_dir.display()
        );
        match &self.fetcher {
            Some(fetcher) if entry.build_system.is_python() => fetcher
                .fetch(entry, &self.sources_dir)
                .with_context(|| format!("{missing} and the download failed")),
            _ => bail!(missing),
        }
    }

    fn copy_patch(&self, patch: &str, workspace: &Workspace) -> Result<PathBuf> {
        let source = self.sources_dir.join(patch);
        let file_name = source
            .file_name()
            .with_context(|| format!("invalid patch path '{patch}'"))?;
        let dest = workspace.patches_dir().join(file_name);
        fs::create_dir_all(workspace.patches_dir())?;
        fs::copy(&source, &dest)
            .with_context(|| format!("copying patch '{}'", source.display()))?;
        Ok(dest)
    }

    fn render(&self, entry: &DependencyEntry, target: &BuildTarget, workspace: &Workspace) -> Result<()> {
        let set = TemplateSet::for_target(target, entry, self.templates_dir.as_deref())?;
        if set.is_empty() {
            return Ok(());
        }
        let bundle = render_bundle(entry, target, &set, &self.render_config)?;
        steps::clear_packaging_dir(target.format, workspace)?;
        let root = workspace.bundle_root(target.format);
        bundle
            .write_to(&root)
            .with_context(|| format!("writing packaging files below '{}'", root.display()))?;
        Ok(())
    }

    fn invoke(&self, invocation: &Invocation, tool_output: &mut String) -> Result<()> {
        info!(command = %invocation.command_line(), "running");
        tool_output.push_str(&format!("$ {}\n", invocation.command_line()));
        match self.environment.run(invocation) {
            Ok(output) => {
                append_output(tool_output, &output.output);
                Ok(())
            }
            Err(err) => {
                append_output(tool_output, err.output());
                Err(err.into())
            }
        }
    }
}

fn append_output(log: &mut String, output: &str) {
    if !output.is_empty() {
        log.push_str(output);
        log.push('\n');
    }
}

fn prepare_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("removing '{}'", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("creating '{}'", dir.display()))
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Track;
    use crate::environment::Environment;
    use crate::error::ToolError;
    use crate::manifest::Manifest;
    use crate::process::{Tool, ToolOutput};
    use crate::target::Architecture;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use time::macros::datetime;

    /// Pretends to be the packaging tools. pip writes a wheel into `dist/`
    /// and dpkg-source writes a `.dsc` next to the tree it is given.
    /// Projects in `failing` exit 1; projects in `hanging` run a real
    /// `sleep` under `timeout`.
    #[derive(Default)]
    struct FakeTools {
        failing: Vec<String>,
        hanging: Vec<String>,
        timeout: Option<Duration>,
        calls: Arc<Mutex<Vec<Invocation>>>,
    }

    impl FakeTools {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|name| name.to_string()).collect(),
                ..Self::default()
            }
        }

        fn hanging(mut self, names: &[&str], timeout: Duration) -> Self {
            self.hanging = names.iter().map(|name| name.to_string()).collect();
            self.timeout = Some(timeout);
            self
        }
    }

    impl Environment for FakeTools {
        fn name(&self) -> String {
            "fake".to_string()
        }

        fn run(&self, invocation: &Invocation) -> std::result::Result<ToolOutput, ToolError> {
            self.calls.lock().unwrap().push(invocation.clone());
            let tree_name = match invocation.tool {
                Tool::Python => invocation.cwd.file_name().unwrap().to_string_lossy().into_owned(),
                Tool::DpkgSource => invocation.args.last().unwrap().clone(),
                other => panic!("unexpected tool {other}"),
            };
            let (project, version) = tree_name.rsplit_once('-').unwrap();
            if self.failing.iter().any(|name| name == project) {
                return Err(ToolError::Failed {
                    command: invocation.command_line(),
                    code: Some(1),
                    output: format!("error: {project} does not build"),
                });
            }
            if self.hanging.iter().any(|name| name == project) {
                let mut command = std::process::Command::new("sh");
                command.args(["-c", "echo compiling; exec sleep 30"]);
                return crate::process::run_command(command, &invocation.command_line(), self.timeout);
            }

            if invocation.tool == Tool::DpkgSource {
                let tree = invocation.cwd.join(&tree_name);
                if !tree.join("debian/control").is_file() {
                    return Err(ToolError::Failed {
                        command: invocation.command_line(),
                        code: Some(255),
                        output: format!("dpkg-source: error: cannot stat {}", tree.display()),
                    });
                }
                let dsc = invocation.cwd.join(format!("{project}_{version}-1.dsc"));
                fs::write(dsc, "Format: 3.0 (quilt)\n").unwrap();
            } else {
                let dist = invocation.cwd.join("dist");
                fs::create_dir_all(&dist).unwrap();
                fs::write(dist.join(format!("{tree_name}-py3-none-any.whl")), tree_name.as_bytes())
                    .unwrap();
            }
            Ok(ToolOutput {
                code: Some(0),
                output: "built".to_string(),
            })
        }
    }

    struct Fixture {
        temp: TempDir,
        manifest: Manifest,
    }

    impl Fixture {
        fn new(manifest_text: &str) -> Self {
            let temp = TempDir::new().unwrap();
            let manifest =
                Manifest::parse(manifest_text, Path::new("dependencies.toml"), &Track::default())
                    .unwrap();
            let sources = temp.path().join("sources");
            fs::create_dir_all(&sources).unwrap();
            for entry in manifest.entries() {
                let tree = temp.path().join("trees").join(&entry.name);
                fs::create_dir_all(&tree).unwrap();
                fs::write(tree.join("setup.py"), "from setuptools import setup\n").unwrap();
                let stem = format!("{}-{}", entry.source_name(), entry.version_string());
                source::pack_tree(&tree, &stem, &sources.join(format!("{stem}.tar.gz"))).unwrap();
            }
            Self { temp, manifest }
        }

        fn config(&self, policy: FailurePolicy) -> BuilderConfig {
            BuilderConfig {
                sources_dir: self.temp.path().join("sources"),
                work_dir: self.temp.path().join("build"),
                output_dir: self.temp.path().join("dist"),
                policy,
                ..BuilderConfig::default()
            }
        }

        fn orchestrator(&self, policy: FailurePolicy, env: FakeTools) -> Orchestrator {
            let render = RenderConfig::new(
                "Packager <packager@example.org>",
                datetime!(2024-03-01 12:00:00 UTC),
                Track::default(),
            );
            Orchestrator::new(&self.config(policy), render, EnvironmentHandle::new(env))
        }

        fn entries(&self) -> Vec<&DependencyEntry> {
            self.manifest.entries().iter().collect()
        }
    }

    fn wheel_target() -> BuildTarget {
        BuildTarget::new(PackageFormat::Wheel).with_architecture(Architecture::X86_64)
    }

    const INDEPENDENT: &str = r#"
[[dependency]]
name = "six"
version = "1.16.0"
flags = ["noarch"]

[[dependency]]
name = "pytsk3"
version = "20231007"

[[dependency]]
name = "yara"
version = "4.5.0"

[[dependency]]
name = "lz4"
version = "4.3.3"
"#;

    fn statuses(summary: &RunSummary) -> Vec<(&str, BuildStatus)> {
        summary
            .results
            .iter()
            .map(|result| (result.name.as_str(), result.status))
            .collect()
    }

    #[test]
    fn continue_visits_every_entry() {
        let fixture = Fixture::new(INDEPENDENT);
        let orchestrator =
            fixture.orchestrator(FailurePolicy::Continue, FakeTools::new(&["pytsk3", "yara"]));
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.skipped(), 0);
        assert_eq!(
            statuses(&summary),
            vec![
                ("six", BuildStatus::Succeeded),
                ("pytsk3", BuildStatus::Failed),
                ("yara", BuildStatus::Failed),
                ("lz4", BuildStatus::Succeeded),
            ]
        );

        let six = &summary.results[0];
        assert_eq!(
            six.outputs[0].path,
            fixture.temp.path().join("dist/six-1.16.0-py3-none-any.whl")
        );
        let failed = &summary.results[1];
        assert_eq!(failed.failed_step, Some(BuildStep::Invoke));
        assert!(failed.message.as_deref().unwrap().contains("exited with exit code 1"));
        let log = fs::read_to_string(failed.log.as_ref().unwrap()).unwrap();
        assert!(log.contains("error: pytsk3 does not build"));
    }

    #[test]
    fn abort_never_attempts_later_entries() {
        let fixture = Fixture::new(INDEPENDENT);
        let env = FakeTools::new(&["pytsk3"]);
        let orchestrator = fixture.orchestrator(FailurePolicy::Abort, env);
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();

        assert_eq!(
            statuses(&summary),
            vec![
                ("six", BuildStatus::Succeeded),
                ("pytsk3", BuildStatus::Failed),
                ("yara", BuildStatus::Skipped),
                ("lz4", BuildStatus::Skipped),
            ]
        );
        assert!(summary.results[2]
            .message
            .as_deref()
            .unwrap()
            .contains("run aborted after 'pytsk3' failed"));
        assert!(!fixture.temp.path().join("build/wheel-x86_64/yara").exists());
    }

    #[test]
    fn dependents_of_failed_entries_are_skipped() {
        let fixture = Fixture::new(
            r#"
[[dependency]]
name = "dfvfs"
version = "20240115"
depends_on = ["pytsk3"]

[[dependency]]
name = "pytsk3"
version = "20231007"

[[dependency]]
name = "plaso"
version = "20240308"
depends_on = ["dfvfs"]

[[dependency]]
name = "six"
version = "1.16.0"
"#,
        );
        let orchestrator =
            fixture.orchestrator(FailurePolicy::Continue, FakeTools::new(&["pytsk3"]));
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();

        assert_eq!(
            statuses(&summary),
            vec![
                ("dfvfs", BuildStatus::Skipped),
                ("pytsk3", BuildStatus::Failed),
                ("plaso", BuildStatus::Skipped),
                ("six", BuildStatus::Succeeded),
            ]
        );
        assert!(summary.has_failures());
    }

    #[test]
    fn missing_source_archive_fails_extract() {
        let fixture = Fixture::new(INDEPENDENT);
        fs::remove_file(fixture.temp.path().join("sources/yara-4.5.0.tar.gz")).unwrap();
        let orchestrator = fixture.orchestrator(FailurePolicy::Continue, FakeTools::new(&[]));
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();

        let yara = &summary.results[2];
        assert_eq!(yara.status, BuildStatus::Failed);
        assert_eq!(yara.failed_step, Some(BuildStep::Extract));
        assert!(yara.message.as_deref().unwrap().contains("no source archive"));
        assert_eq!(summary.succeeded(), 3);
    }

    #[test]
    fn parallel_build_reports_in_manifest_order() {
        let fixture = Fixture::new(INDEPENDENT);
        let orchestrator = fixture
            .orchestrator(FailurePolicy::Continue, FakeTools::new(&["yara"]))
            .with_jobs(3);
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();

        let names = summary
            .results
            .iter()
            .map(|result| result.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["six", "pytsk3", "yara", "lz4"]);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.failed(), 1);
    }

    #[test]
    fn missing_template_field_is_a_render_failure() {
        let fixture = Fixture::new(INDEPENDENT);
        let orchestrator = fixture.orchestrator(FailurePolicy::Continue, FakeTools::new(&[]));
        // The built-in debian/control needs a homepage and descriptions.
        let target = BuildTarget::new(PackageFormat::Dpkg).with_architecture(Architecture::X86_64);
        let summary = orchestrator.build(&fixture.entries()[..1], &target).unwrap();

        let six = &summary.results[0];
        assert_eq!(six.status, BuildStatus::Failed);
        assert_eq!(six.failed_step, Some(BuildStep::Render));
        assert!(six.message.as_deref().unwrap().contains("homepage_url"));
    }

    #[test]
    fn summary_lists_failures_with_step() {
        let fixture = Fixture::new(INDEPENDENT);
        let orchestrator =
            fixture.orchestrator(FailurePolicy::Continue, FakeTools::new(&["lz4"]));
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();
        let text = summary.to_string();
        assert!(text.starts_with(
            "Build summary for wheel-x86_64 (fake): 3 succeeded, 1 failed, 0 skipped"
        ));
        assert!(text.contains("  failed:  lz4 (invoke): "));
        assert!(text.contains("  built:   six -> six-1.16.0-py3-none-any.whl"));
    }

    #[test]
    fn abort_with_jobs_starts_no_later_wave() {
        let fixture = Fixture::new(
            r#"
[[dependency]]
name = "pytsk3"
version = "20231007"

[[dependency]]
name = "six"
version = "1.16.0"

[[dependency]]
name = "dfvfs"
version = "20240115"
depends_on = ["six"]

[[dependency]]
name = "lz4"
version = "4.3.3"
depends_on = ["six"]
"#,
        );
        let orchestrator = fixture
            .orchestrator(FailurePolicy::Abort, FakeTools::new(&["pytsk3"]))
            .with_jobs(2);
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();

        assert_eq!(
            statuses(&summary),
            vec![
                ("pytsk3", BuildStatus::Failed),
                ("six", BuildStatus::Succeeded),
                ("dfvfs", BuildStatus::Skipped),
                ("lz4", BuildStatus::Skipped),
            ]
        );
        for skipped in &summary.results[2..] {
            assert!(skipped
                .message
                .as_deref()
                .unwrap()
                .contains("run aborted after 'pytsk3' failed"));
        }
        assert!(!fixture.temp.path().join("build/wheel-x86_64/dfvfs").exists());
    }

    #[test]
    fn tool_timeout_fails_the_entry() {
        let fixture = Fixture::new(INDEPENDENT);
        let env = FakeTools::new(&[]).hanging(&["yara"], Duration::from_millis(300));
        let orchestrator = fixture.orchestrator(FailurePolicy::Continue, env);
        let start = Instant::now();
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();
        assert!(start.elapsed() < Duration::from_secs(20));

        let yara = &summary.results[2];
        assert_eq!(yara.status, BuildStatus::Failed);
        assert_eq!(yara.failed_step, Some(BuildStep::Invoke));
        assert!(yara.message.as_deref().unwrap().contains("timed out"), "{:?}", yara.message);
        let log = fs::read_to_string(yara.log.as_ref().unwrap()).unwrap();
        assert!(log.contains("compiling"));
        assert_eq!(summary.succeeded(), 3);
    }

    #[test]
    fn dpkg_source_builds_archives_with_any_top_level_name() {
        let fixture = Fixture::new(
            r#"
[[dependency]]
name = "six"
version = "1.16.0"
flags = ["noarch"]
homepage_url = "https://github.com/benjaminp/six"
description_short = "Python 2 and 3 compatibility library"
description_long = "Six provides utilities for wrapping differences between Python 2 and 3."
"#,
        );
        let tree = fixture.temp.path().join("trees/six");
        let archive = fixture.temp.path().join("sources/six-1.16.0.tar.gz");
        source::pack_tree(&tree, "six-release-1.16.0", &archive).unwrap();

        let env = FakeTools::new(&[]);
        let calls = Arc::clone(&env.calls);
        let orchestrator = fixture.orchestrator(FailurePolicy::Abort, env);
        let target = BuildTarget::new(PackageFormat::DpkgSource).with_architecture(Architecture::X86_64);
        let summary = orchestrator.build(&fixture.entries(), &target).unwrap();

        let six = &summary.results[0];
        assert_eq!(six.status, BuildStatus::Succeeded, "{:?}", six.message);
        assert_eq!(six.outputs[0].file_name(), "six-1.16.0-jammy.dsc");
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].command_line(), "dpkg-source --auto-commit -b six-1.16.0");
    }

    #[test]
    fn tools_see_the_resolved_work_dir() {
        let fixture = Fixture::new(INDEPENDENT);
        let real = fixture.temp.path().join("real-build");
        fs::create_dir_all(&real).unwrap();
        std::os::unix::fs::symlink(&real, fixture.temp.path().join("build")).unwrap();

        let env = FakeTools::new(&[]);
        let calls = Arc::clone(&env.calls);
        let orchestrator = fixture.orchestrator(FailurePolicy::Continue, env);
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();
        assert_eq!(summary.succeeded(), 4);

        let real = real.canonicalize().unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        for call in calls.iter() {
            assert!(call.cwd.starts_with(&real), "{}", call.cwd.display());
        }
    }

    /// Serves archives from a directory the orchestrator does not look in.
    #[derive(Debug)]
    struct MirrorFetcher {
        mirror: PathBuf,
    }

    impl SourceFetcher for MirrorFetcher {
        fn fetch(
            &self,
            entry: &DependencyEntry,
            sources_dir: &Path,
        ) -> std::result::Result<PathBuf, crate::error::DownloadError> {
            let name = format!("{}-{}.tar.gz", entry.source_name(), entry.version_string());
            let dest = sources_dir.join(&name);
            fs::copy(self.mirror.join(&name), &dest).map_err(|source| {
                crate::error::DownloadError::Io {
                    path: dest.clone(),
                    source,
                }
            })?;
            Ok(dest)
        }
    }

    #[test]
    fn missing_python_sources_are_fetched() {
        let fixture = Fixture::new(INDEPENDENT);
        let mirror = fixture.temp.path().join("mirror");
        fs::rename(fixture.temp.path().join("sources"), &mirror).unwrap();
        fs::create_dir_all(fixture.temp.path().join("sources")).unwrap();
        fs::remove_file(mirror.join("lz4-4.3.3.tar.gz")).unwrap();

        let orchestrator = fixture
            .orchestrator(FailurePolicy::Continue, FakeTools::new(&[]))
            .with_fetcher(MirrorFetcher { mirror });
        let summary = orchestrator.build(&fixture.entries(), &wheel_target()).unwrap();

        assert_eq!(summary.succeeded(), 3);
        assert!(fixture.temp.path().join("sources/six-1.16.0.tar.gz").is_file());
        let lz4 = &summary.results[3];
        assert_eq!(lz4.failed_step, Some(BuildStep::Extract));
        let message = lz4.message.as_deref().unwrap();
        assert!(message.contains("no source archive"), "{message}");
        assert!(message.contains("the download failed"), "{message}");
    }
}
