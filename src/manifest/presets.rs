use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use crate::error::ManifestError;

/// Named subset of manifest entries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Preset {
    #[serde(default)]
    pub projects: Vec<String>,
    /// Presets whose projects are included. Only one level is followed.
    #[serde(default)]
    pub presets: Vec<String>,
}

/// Which manifest entries a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Preset(String),
    Projects(Vec<String>),
}

impl Selection {
    /// Explicitly named projects are built even when disabled for a target.
    pub fn is_explicit(&self) -> bool {
        matches!(self, Selection::Projects(_))
    }
}

/// Project names of a preset, including the projects of its sub-presets.
pub(crate) fn resolve_preset(
    presets: &BTreeMap<String, Preset>,
    name: &str,
) -> Result<Vec<String>, ManifestError> {
    let preset = presets
        .get(name)
        .ok_or_else(|| ManifestError::UnknownPreset(name.to_string()))?;

    let mut project_names = preset.projects.clone();
    for sub_name in &preset.presets {
        let sub_preset = presets
            .get(sub_name)
            .ok_or_else(|| ManifestError::UnknownPreset(sub_name.clone()))?;
        if !sub_preset.presets.is_empty() {
            warn!(
                preset = name,
                sub_preset = %sub_name,
                nested = %sub_preset.presets.join(", "),
                "multiple levels of presets are not supported; ignoring nested presets"
            );
        }
        project_names.extend(sub_preset.projects.iter().cloned());
    }

    let mut seen = std::collections::BTreeSet::new();
    project_names.retain(|project| seen.insert(project.clone()));
    Ok(project_names)
}
