use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dep_builder::environment::EnvironmentKind;
use dep_builder::target::{Architecture, PackageFormat};
use dep_builder::writers::ProjectFile;
use tracing_subscriber::EnvFilter;

mod workflows;

#[derive(Debug, Parser)]
#[command(
    name = "dep-builder",
    version,
    about = "Build dpkg, RPM and Python packages for the dependencies in a manifest"
)]
struct Cli {
    /// Dependency manifest [default: dependencies.toml]
    #[arg(long, global = true, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Config file [default: ./dep-builder.toml, then the user config dir]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory for packages and the run report
    #[arg(long, global = true, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Log tool output and every step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build packages for the selected dependencies
    Build(BuildArgs),
    /// Write one dependency's packaging files without building
    Render(RenderArgs),
    /// Generate a project-level file from the manifest
    Generate(GenerateArgs),
    /// Prepare the build environment for a target
    Provision(ProvisionArgs),
    /// List manifest entries or presets
    List(ListArgs),
    /// Show the last run report in the output directory
    Status,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Package format: dpkg, dpkg-source, rpm, srpm, wheel or source
    #[arg(long = "target", value_name = "FORMAT")]
    format: PackageFormat,

    /// Distribution, e.g. jammy, bookworm or fc40
    #[arg(long)]
    distribution: Option<String>,

    /// Architecture [default: host]
    #[arg(long = "arch", value_name = "ARCH")]
    architecture: Option<Architecture>,
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Build the projects of a manifest preset
    #[arg(long, conflicts_with = "projects")]
    preset: Option<String>,

    /// Build these projects (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    projects: Vec<String>,

    /// Keep building independent dependencies after a failure
    #[arg(long)]
    continue_on_error: bool,

    /// Build up to N independent dependencies at once
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    jobs: Option<u64>,

    /// Where the tools run: host or docker
    #[arg(long = "env", value_name = "ENV")]
    environment: Option<EnvironmentKind>,

    /// Download missing Python sdists from the package index
    #[arg(long)]
    download: bool,

    /// Kill a packaging tool after SECS seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Dependency to render
    #[arg(long)]
    project: String,

    /// Directory to write into [default: <work_dir>/rendered/<target>/<project>]
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// requirements, gift-ppa, gift-copr, github-actions, tox-ini or dpkg-control
    #[arg(value_name = "FILE_KIND")]
    kind: ProjectFile,

    /// Write to FILE instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ProvisionArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Environment to prepare [default: docker]
    #[arg(long = "env", value_name = "ENV")]
    environment: Option<EnvironmentKind>,
}

#[derive(Debug, Args)]
struct ListArgs {
    /// List presets instead of entries
    #[arg(long)]
    presets: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let global = workflows::GlobalArgs {
        manifest: cli.manifest,
        config: cli.config,
        output: cli.output,
    };

    match cli.command {
        Command::Build(args) => workflows::build(
            &global,
            workflows::BuildOptions {
                format: args.target.format,
                distribution: args.target.distribution,
                architecture: args.target.architecture,
                preset: args.preset,
                projects: args.projects,
                continue_on_error: args.continue_on_error,
                jobs: args.jobs,
                environment: args.environment,
                timeout_secs: args.timeout,
                download: args.download,
            },
        ),
        Command::Render(args) => workflows::render(
            &global,
            args.target.format,
            args.target.distribution,
            args.target.architecture,
            &args.project,
            args.out,
        )
        .map(|()| ExitCode::SUCCESS),
        Command::Generate(args) => {
            workflows::generate(&global, args.kind, args.out).map(|()| ExitCode::SUCCESS)
        }
        Command::Provision(args) => workflows::provision(
            &global,
            args.target.format,
            args.target.distribution,
            args.target.architecture,
            args.environment.unwrap_or(EnvironmentKind::Docker),
        )
        .map(|()| ExitCode::SUCCESS),
        Command::List(args) => workflows::list(&global, args.presets).map(|()| ExitCode::SUCCESS),
        Command::Status => workflows::status(&global),
    }
}
