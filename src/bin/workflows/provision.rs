use anyhow::Result;
use dep_builder::environment::{EnvironmentKind, Provisioner};
use dep_builder::target::{Architecture, PackageFormat};

use super::layout::{build_target, load_config, GlobalArgs};

pub(crate) fn provision(
    global: &GlobalArgs,
    format: PackageFormat,
    distribution: Option<String>,
    architecture: Option<Architecture>,
    environment: EnvironmentKind,
) -> Result<()> {
    let mut config = load_config(global)?;
    config.environment = environment;
    let target = build_target(format, distribution, architecture);
    let handle = Provisioner::new(&config).provision(&target)?;
    println!("{target}: {} ready", handle.name());
    Ok(())
}
