use anyhow::Result;
use dep_builder::target::PackageFormat;

use super::layout::{load_config, load_manifest, GlobalArgs};

pub(crate) fn list(global: &GlobalArgs, presets: bool) -> Result<()> {
    let config = load_config(global)?;
    let manifest = load_manifest(&config)?;

    if presets {
        for (name, preset) in manifest.presets() {
            let mut members = preset.projects.clone();
            members.extend(preset.presets.iter().map(|sub| format!("@{sub}")));
            println!("{name}: {}", members.join(", "));
        }
        return Ok(());
    }

    for entry in manifest.entries() {
        let disabled = PackageFormat::ALL
            .into_iter()
            .filter(|format| entry.is_disabled_for(*format))
            .map(PackageFormat::as_str)
            .collect::<Vec<_>>();
        if disabled.is_empty() {
            println!("{} {}", entry.name, entry.version);
        } else {
            println!(
                "{} {} (disabled: {})",
                entry.name,
                entry.version,
                disabled.join(", ")
            );
        }
    }
    Ok(())
}
