use std::path::PathBuf;

use anyhow::{Context, Result};
use dep_builder::config::BuilderConfig;
use dep_builder::manifest::Manifest;
use dep_builder::target::{Architecture, BuildTarget, PackageFormat};

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub(crate) struct GlobalArgs {
    pub(crate) manifest: Option<PathBuf>,
    pub(crate) config: Option<PathBuf>,
    pub(crate) output: Option<PathBuf>,
}

/// Defaults < config file < environment < command line.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<BuilderConfig> {
    let mut config = BuilderConfig::resolve(global.config.as_deref())?;
    if let Some(manifest) = &global.manifest {
        config.manifest = manifest.clone();
    }
    if let Some(output) = &global.output {
        config.output_dir = output.clone();
    }
    Ok(config)
}

pub(crate) fn load_manifest(config: &BuilderConfig) -> Result<Manifest> {
    Manifest::load_for_track(&config.manifest, &config.track).with_context(|| {
        format!(
            "loading dependency manifest for track '{}'",
            config.track
        )
    })
}

pub(crate) fn build_target(
    format: PackageFormat,
    distribution: Option<String>,
    architecture: Option<Architecture>,
) -> BuildTarget {
    let mut target = BuildTarget::new(format);
    if let Some(distribution) = distribution {
        target = target.with_distribution(distribution);
    }
    if let Some(architecture) = architecture {
        target = target.with_architecture(architecture);
    }
    target
}
