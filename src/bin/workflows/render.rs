use std::path::PathBuf;

use anyhow::{Context, Result};
use dep_builder::config::RenderConfig;
use dep_builder::error::ManifestError;
use dep_builder::target::{Architecture, PackageFormat};
use dep_builder::template::{render_bundle, TemplateSet};

use super::layout::{build_target, load_config, load_manifest, GlobalArgs};

pub(crate) fn render(
    global: &GlobalArgs,
    format: PackageFormat,
    distribution: Option<String>,
    architecture: Option<Architecture>,
    project: &str,
    out: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(global)?;
    let manifest = load_manifest(&config)?;
    let entry = manifest
        .get(project)
        .ok_or_else(|| ManifestError::UnknownProjects(vec![project.to_string()]))?;
    let target = build_target(format, distribution, architecture);

    let set = TemplateSet::for_target(&target, entry, config.templates_dir.as_deref())?;
    if set.is_empty() {
        println!("{target} has no packaging files to render for '{project}'");
        return Ok(());
    }
    let bundle = render_bundle(entry, &target, &set, &RenderConfig::from_builder(&config)?)?;

    let out = out.unwrap_or_else(|| {
        config
            .work_dir
            .join("rendered")
            .join(target.slug())
            .join(&entry.name)
    });
    let written = bundle
        .write_to(&out)
        .with_context(|| format!("writing packaging files to '{}'", out.display()))?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
