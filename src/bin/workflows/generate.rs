use std::path::PathBuf;

use anyhow::{Context, Result};
use dep_builder::config::RenderConfig;
use dep_builder::writers::{render_project_file, ProjectFile};

use super::layout::{load_config, load_manifest, GlobalArgs};

pub(crate) fn generate(global: &GlobalArgs, kind: ProjectFile, out: Option<PathBuf>) -> Result<()> {
    let config = load_config(global)?;
    let manifest = load_manifest(&config)?;
    let entries = manifest.entries().iter().collect::<Vec<_>>();
    let artifact = render_project_file(
        kind,
        manifest.project(),
        &entries,
        &RenderConfig::from_builder(&config)?,
        config.templates_dir.as_deref(),
    )?;

    match out {
        Some(path) => {
            artifact
                .write_file(&path)
                .with_context(|| format!("writing {kind} file '{}'", path.display()))?;
            println!("{}", path.display());
        }
        None => print!("{}", artifact.contents),
    }
    Ok(())
}
