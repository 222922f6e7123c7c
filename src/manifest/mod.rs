//! Dependency manifest: the canonical list of packaged dependencies.
//!
//! The manifest is a TOML file with one `[[dependency]]` table per
//! dependency, in build order, plus optional `[presets.<name>]` tables that
//! select subsets of them.
//!
//! ```toml
//! [[dependency]]
//! name = "six"
//! version = "1.16.0"
//! flags = ["noarch"]
//! homepage_url = "https://github.com/benjaminp/six"
//! track_versions = { dev = "1.17.0" }
//!
//! [dependency.platform]
//! dpkg = "python3-six"
//!
//! [presets.core]
//! projects = ["six"]
//!
//! [project]
//! name = "plaso"
//! homepage_url = "https://github.com/log2timeline/plaso"
//! ```
//!
//! Loading fails as a whole: a manifest with a single bad entry is unusable.

mod presets;
mod version;

pub use presets::{Preset, Selection};
pub use version::{Comparison, VersionConstraint};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::Track;
use crate::error::ManifestError;
use crate::target::{PackageFamily, PackageFormat};

/// Architecture-independent package.
pub const FLAG_NOARCH: &str = "noarch";
/// Package contains compiled extensions and needs a compiler toolchain.
pub const FLAG_REQUIRES_COMPILE: &str = "requires-compile";

const KNOWN_FLAGS: &[&str] = &[FLAG_NOARCH, FLAG_REQUIRES_COMPILE];

/// How the upstream project is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystem {
    #[default]
    SetupPy,
    Pyproject,
    ConfigureMake,
}

impl BuildSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildSystem::SetupPy => "setup_py",
            BuildSystem::Pyproject => "pyproject",
            BuildSystem::ConfigureMake => "configure_make",
        }
    }

    pub fn is_python(self) -> bool {
        !matches!(self, BuildSystem::ConfigureMake)
    }
}

/// One packaged dependency. Immutable once the manifest is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    pub name: String,
    /// Version constraint for the selected track.
    pub version: VersionConstraint,
    pub platform_names: BTreeMap<PackageFamily, String>,
    pub flags: BTreeSet<String>,
    pub build_system: BuildSystem,
    pub description_short: Option<String>,
    pub description_long: Option<String>,
    pub homepage_url: Option<String>,
    pub upstream_maintainer: Option<String>,
    pub source_name: Option<String>,
    /// Build-order hints: entries that must be built before this one.
    pub depends_on: Vec<String>,
    pub build_dependencies: Vec<String>,
    pub dependencies: Vec<String>,
    pub patches: Vec<String>,
    /// Target format names (or `all`) this entry is not built for.
    pub disabled: BTreeSet<String>,
    pub configure_options: Vec<String>,
}

impl DependencyEntry {
    pub fn is_noarch(&self) -> bool {
        self.flags.contains(FLAG_NOARCH)
    }

    pub fn requires_compile(&self) -> bool {
        self.flags.contains(FLAG_REQUIRES_COMPILE)
    }

    /// Concrete version that gets built.
    pub fn version_string(&self) -> &str {
        self.version.pinned()
    }

    /// Package name for a family: the manifest override, or the name the
    /// family conventionally uses for this kind of project.
    pub fn package_name(&self, family: PackageFamily) -> String {
        if let Some(name) = self.platform_names.get(&family) {
            return name.clone();
        }
        match family {
            PackageFamily::Pypi => self.name.clone(),
            PackageFamily::Dpkg | PackageFamily::Rpm => {
                let base = self.name.to_ascii_lowercase().replace('_', "-");
                if !self.build_system.is_python() {
                    return base;
                }
                let base = base.strip_prefix("python-").unwrap_or(&base);
                format!("python3-{base}")
            }
        }
    }

    pub fn pypi_name(&self) -> String {
        self.package_name(PackageFamily::Pypi)
    }

    /// Debian source package name: the lowercased project name.
    pub fn source_package_name(&self) -> String {
        self.name.to_ascii_lowercase().replace('_', "-")
    }

    /// Base name of the source archive, `<source_name>-<version>.tar.gz`.
    pub fn source_name(&self) -> String {
        self.source_name.clone().unwrap_or_else(|| self.pypi_name())
    }

    pub fn is_disabled_for(&self, format: PackageFormat) -> bool {
        self.disabled.contains("all") || self.disabled.contains(format.as_str())
    }
}

/// The project that depends on the manifest's entries. Only the
/// project-level files (tox.ini, debian/control) use it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectInfo {
    pub name: Option<String>,
    pub description_short: Option<String>,
    pub description_long: Option<String>,
    pub homepage_url: Option<String>,
}

impl ProjectInfo {
    /// Python module name: the project name with dashes as underscores.
    pub fn module_name(&self) -> Option<String> {
        self.name
            .as_ref()
            .map(|name| name.to_ascii_lowercase().replace('-', "_"))
    }
}

/// Loaded dependency manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    entries: Vec<DependencyEntry>,
    presets: BTreeMap<String, Preset>,
    project: ProjectInfo,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestToml {
    #[serde(default, rename = "dependency")]
    dependencies: Vec<DependencyToml>,
    #[serde(default)]
    presets: BTreeMap<String, Preset>,
    #[serde(default)]
    project: ProjectInfo,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DependencyToml {
    name: String,
    version: String,
    #[serde(default)]
    platform: BTreeMap<String, String>,
    #[serde(default)]
    flags: Vec<String>,
    build_system: Option<BuildSystem>,
    description_short: Option<String>,
    description_long: Option<String>,
    homepage_url: Option<String>,
    maintainer: Option<String>,
    source_name: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    build_dependencies: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    patches: Vec<String>,
    #[serde(default)]
    disabled: Vec<String>,
    #[serde(default)]
    configure_options: Vec<String>,
    #[serde(default)]
    track_versions: BTreeMap<String, String>,
}

impl Manifest {
    /// Load the manifest for the default track.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        Self::load_for_track(path, &Track::default())
    }

    /// Load the manifest, resolving per-track version overrides for `track`.
    pub fn load_for_track(path: &Path, track: &Track) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path, track)
    }

    /// Parse manifest text; `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path, track: &Track) -> Result<Self, ManifestError> {
        let parsed: ManifestToml = toml::from_str(text).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let invalid = |message: String| ManifestError::Invalid {
            path: path.to_path_buf(),
            message,
        };

        let mut entries = Vec::with_capacity(parsed.dependencies.len());
        let mut names = BTreeSet::new();
        for raw in parsed.dependencies {
            let entry = convert_entry(raw, track).map_err(|e| match e {
                EntryError::Parse(message) => ManifestError::Parse {
                    path: path.to_path_buf(),
                    message,
                },
                EntryError::Invalid(message) => invalid(message),
            })?;
            if !names.insert(entry.name.clone()) {
                return Err(invalid(format!("duplicate dependency '{}'", entry.name)));
            }
            entries.push(entry);
        }

        for entry in &entries {
            for hint in &entry.depends_on {
                if hint == &entry.name {
                    return Err(invalid(format!("'{}' depends on itself", entry.name)));
                }
                if !names.contains(hint) {
                    return Err(invalid(format!(
                        "'{}' depends on undefined dependency '{}'",
                        entry.name, hint
                    )));
                }
            }
        }
        if let Some(cycle) = find_cycle(&entries) {
            return Err(invalid(format!(
                "build order cycle: {}",
                cycle.join(" -> ")
            )));
        }

        for (preset_name, preset) in &parsed.presets {
            let unknown_projects = preset
                .projects
                .iter()
                .filter(|project| !names.contains(*project))
                .cloned()
                .collect::<Vec<_>>();
            if !unknown_projects.is_empty() {
                return Err(invalid(format!(
                    "preset '{}' references undefined project(s): {}",
                    preset_name,
                    unknown_projects.join(", ")
                )));
            }
            if let Some(missing) = preset
                .presets
                .iter()
                .find(|sub| !parsed.presets.contains_key(*sub))
            {
                return Err(invalid(format!(
                    "preset '{}' references undefined preset '{}'",
                    preset_name, missing
                )));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            presets: parsed.presets,
            project: parsed.project,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries in manifest order.
    pub fn entries(&self) -> &[DependencyEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&DependencyEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn presets(&self) -> &BTreeMap<String, Preset> {
        &self.presets
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    /// Entries covered by `selection`, in manifest order.
    pub fn select(&self, selection: &Selection) -> Result<Vec<&DependencyEntry>, ManifestError> {
        let wanted = match selection {
            Selection::All => return Ok(self.entries.iter().collect()),
            Selection::Preset(name) => presets::resolve_preset(&self.presets, name)?,
            Selection::Projects(names) => names.clone(),
        };

        let unknown = wanted
            .iter()
            .filter(|name| self.get(name).is_none())
            .cloned()
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(ManifestError::UnknownProjects(unknown));
        }

        Ok(self
            .entries
            .iter()
            .filter(|entry| wanted.contains(&entry.name))
            .collect())
    }
}

enum EntryError {
    Parse(String),
    Invalid(String),
}

fn convert_entry(raw: DependencyToml, track: &Track) -> Result<DependencyEntry, EntryError> {
    validate_name(&raw.name).map_err(EntryError::Invalid)?;
    let name = raw.name;

    let mut platform_names = BTreeMap::new();
    for (key, package_name) in raw.platform {
        let family = key
            .parse::<PackageFamily>()
            .map_err(|e| EntryError::Parse(format!("dependency '{name}': {e}")))?;
        platform_names.insert(family, package_name);
    }

    let mut track_versions = BTreeMap::new();
    for (track_name, raw_version) in &raw.track_versions {
        let constraint = raw_version
            .parse::<VersionConstraint>()
            .map_err(|e| EntryError::Invalid(format!("dependency '{name}' track '{track_name}': {e}")))?;
        track_versions.insert(track_name.as_str(), constraint);
    }
    let version = match track_versions.remove(track.as_str()) {
        Some(version) => version,
        None => raw
            .version
            .parse::<VersionConstraint>()
            .map_err(|e| EntryError::Invalid(format!("dependency '{name}': {e}")))?,
    };

    let flags = raw.flags.into_iter().collect::<BTreeSet<_>>();
    if let Some(unknown) = flags.iter().find(|flag| !KNOWN_FLAGS.contains(&flag.as_str())) {
        return Err(EntryError::Invalid(format!(
            "dependency '{}': unknown build flag '{}'; expected one of: {}",
            name,
            unknown,
            KNOWN_FLAGS.join(", ")
        )));
    }
    if flags.contains(FLAG_NOARCH) && flags.contains(FLAG_REQUIRES_COMPILE) {
        return Err(EntryError::Invalid(format!(
            "dependency '{name}': flags '{FLAG_NOARCH}' and '{FLAG_REQUIRES_COMPILE}' are mutually exclusive"
        )));
    }

    let disabled = raw.disabled.into_iter().collect::<BTreeSet<_>>();
    if let Some(unknown) = disabled
        .iter()
        .find(|value| value.as_str() != "all" && value.parse::<PackageFormat>().is_err())
    {
        return Err(EntryError::Invalid(format!(
            "dependency '{name}': cannot disable unknown build target '{unknown}'"
        )));
    }

    Ok(DependencyEntry {
        name,
        version,
        platform_names,
        flags,
        build_system: raw.build_system.unwrap_or_default(),
        description_short: raw.description_short,
        description_long: raw.description_long,
        homepage_url: raw.homepage_url,
        upstream_maintainer: raw.maintainer,
        source_name: raw.source_name,
        depends_on: raw.depends_on,
        build_dependencies: raw.build_dependencies,
        dependencies: raw.dependencies,
        patches: raw.patches,
        disabled,
        configure_options: raw.configure_options,
    })
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("dependency name must not be empty".to_string());
    }
    if name.starts_with('.') {
        return Err(format!("dependency name '{name}' must not start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
    {
        return Err(format!(
            "dependency name '{name}' may only contain ASCII letters, digits, '-', '_', '.' and '+'"
        ));
    }
    Ok(())
}

/// First build-order cycle found among `entries`, as a path of names.
fn find_cycle(entries: &[DependencyEntry]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        by_name: &BTreeMap<&'a str, &'a DependencyEntry>,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(name).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return None,
            Mark::InProgress => {
                let start = stack.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle = stack[start..]
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            Mark::Unvisited => {}
        }

        marks.insert(name, Mark::InProgress);
        stack.push(name);
        if let Some(entry) = by_name.get(name) {
            for hint in &entry.depends_on {
                if let Some(cycle) = visit(hint, by_name, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(name, Mark::Done);
        None
    }

    let by_name = entries
        .iter()
        .map(|entry| (entry.name.as_str(), entry))
        .collect::<BTreeMap<_, _>>();
    let mut marks = BTreeMap::new();
    let mut stack = Vec::new();
    entries
        .iter()
        .find_map(|entry| visit(&entry.name, &by_name, &mut marks, &mut stack))
}
