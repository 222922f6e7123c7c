use std::process::ExitCode;

use anyhow::{Context, Result};
use dep_builder::build::{BuildPlan, FailurePolicy, Orchestrator, OutputLock, PypiDownloader};
use dep_builder::config::RenderConfig;
use dep_builder::environment::{EnvironmentKind, Provisioner};
use dep_builder::manifest::Selection;
use dep_builder::report::{self, RunReport};
use dep_builder::target::{Architecture, PackageFormat};
use time::OffsetDateTime;
use tracing::info;

use super::layout::{build_target, load_config, load_manifest, GlobalArgs};

/// Command-line overrides of a build run.
#[derive(Debug, Clone)]
pub(crate) struct BuildOptions {
    pub(crate) format: PackageFormat,
    pub(crate) distribution: Option<String>,
    pub(crate) architecture: Option<Architecture>,
    pub(crate) preset: Option<String>,
    pub(crate) projects: Vec<String>,
    pub(crate) continue_on_error: bool,
    pub(crate) jobs: Option<u64>,
    pub(crate) environment: Option<EnvironmentKind>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) download: bool,
}

impl BuildOptions {
    fn selection(&self) -> Selection {
        match (&self.preset, self.projects.is_empty()) {
            (Some(preset), _) => Selection::Preset(preset.clone()),
            (None, false) => Selection::Projects(self.projects.clone()),
            (None, true) => Selection::All,
        }
    }
}

pub(crate) fn build(global: &GlobalArgs, options: BuildOptions) -> Result<ExitCode> {
    let mut config = load_config(global)?;
    if options.continue_on_error {
        config.policy = FailurePolicy::Continue;
    }
    if let Some(jobs) = options.jobs {
        config.jobs = usize::try_from(jobs).context("--jobs is too large")?;
    }
    if let Some(environment) = options.environment {
        config.environment = environment;
    }
    if options.timeout_secs.is_some() {
        config.timeout_secs = options.timeout_secs;
    }
    if options.download {
        config.download = true;
    }

    let manifest = load_manifest(&config)?;
    let selection = options.selection();
    let entries = manifest.select(&selection)?;
    let target = build_target(
        options.format,
        options.distribution.clone(),
        options.architecture,
    );
    let plan = BuildPlan::new(&entries, &target, selection.is_explicit())?;

    let _lock = OutputLock::acquire(&config.output_dir)?;
    let environment = Provisioner::new(&config)
        .provision(&target)
        .with_context(|| format!("provisioning {} environment for {target}", config.environment))?;
    let render_config = RenderConfig::from_builder(&config)?;

    let started = OffsetDateTime::now_utc();
    info!(
        manifest = %manifest.path().display(),
        track = %config.track,
        selected = plan.len(),
        "planned build"
    );
    let mut orchestrator = Orchestrator::new(&config, render_config, environment);
    if config.download {
        orchestrator = orchestrator.with_fetcher(PypiDownloader::new(&config.index_url)?);
    }
    let summary = orchestrator.run(&plan);
    print!("{summary}");

    let failed = summary.failed();
    let run_report = RunReport::new(summary, config.track.as_str(), started);
    report::write(&config.output_dir, &run_report)?;

    if failed > 0 {
        eprintln!(
            "{failed} of {} dependencies failed to build for {target}",
            run_report.summary.results.len()
        );
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
