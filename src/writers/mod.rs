//! Project-level files rendered from the whole manifest.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::manifest::{DependencyEntry, ProjectInfo};
use crate::target::{PackageFamily, PackageFormat};
use crate::template::{
    builtin, format_description_long, load_override_or, RenderedArtifact, TemplateContext,
};

/// Directory below the templates directory holding project file overrides.
const OVERRIDE_DIR: &str = "project";

/// Continuation indent so package lists line up after `PACKAGES="`.
const PACKAGES_INDENT: &str = "          ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProjectFile {
    Requirements,
    GiftPpa,
    GiftCopr,
    GithubActions,
    ToxIni,
    DpkgControl,
}

impl ProjectFile {
    pub const ALL: [ProjectFile; 6] = [
        ProjectFile::Requirements,
        ProjectFile::GiftPpa,
        ProjectFile::GiftCopr,
        ProjectFile::GithubActions,
        ProjectFile::ToxIni,
        ProjectFile::DpkgControl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectFile::Requirements => "requirements",
            ProjectFile::GiftPpa => "gift-ppa",
            ProjectFile::GiftCopr => "gift-copr",
            ProjectFile::GithubActions => "github-actions",
            ProjectFile::ToxIni => "tox-ini",
            ProjectFile::DpkgControl => "dpkg-control",
        }
    }

    /// Template name, also the override file name.
    fn template_name(self) -> &'static str {
        match self {
            ProjectFile::Requirements => "requirements.txt",
            ProjectFile::GiftPpa => "gift_ppa_install.sh",
            ProjectFile::GiftCopr => "gift_copr_install.sh",
            ProjectFile::GithubActions => "build_dependencies.yml",
            ProjectFile::ToxIni => "tox.ini",
            ProjectFile::DpkgControl => "control",
        }
    }

    /// Where the file lives in a project checkout.
    pub fn default_path(self) -> PathBuf {
        match self {
            ProjectFile::Requirements => PathBuf::from("requirements.txt"),
            ProjectFile::GiftPpa | ProjectFile::GiftCopr => {
                Path::new("config/linux").join(self.template_name())
            }
            ProjectFile::GithubActions => Path::new(".github/workflows").join(self.template_name()),
            ProjectFile::ToxIni => PathBuf::from("tox.ini"),
            ProjectFile::DpkgControl => Path::new("config/dpkg").join(self.template_name()),
        }
    }

    pub fn is_executable(self) -> bool {
        matches!(self, ProjectFile::GiftPpa | ProjectFile::GiftCopr)
    }

    fn builtin_body(self) -> &'static str {
        match self {
            ProjectFile::Requirements => builtin::REQUIREMENTS_TXT,
            ProjectFile::GiftPpa => builtin::GIFT_PPA_SCRIPT,
            ProjectFile::GiftCopr => builtin::GIFT_COPR_SCRIPT,
            ProjectFile::GithubActions => builtin::GITHUB_ACTIONS,
            ProjectFile::ToxIni => builtin::TOX_INI,
            ProjectFile::DpkgControl => builtin::PROJECT_DPKG_CONTROL,
        }
    }
}

impl fmt::Display for ProjectFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectFile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ProjectFile::ALL
            .into_iter()
            .find(|file| file.as_str() == value)
            .ok_or_else(|| {
                let known = ProjectFile::ALL.map(ProjectFile::as_str).join(", ");
                format!("unknown project file '{value}' (expected one of: {known})")
            })
    }
}

/// `pip>=7.0.0` followed by one requirement per Python project.
fn requirements(entries: &[&DependencyEntry]) -> String {
    let mut lines = vec!["pip>=7.0.0".to_string()];
    lines.extend(
        entries
            .iter()
            .filter(|entry| entry.build_system.is_python())
            .filter(|entry| !entry.is_disabled_for(PackageFormat::Wheel))
            .map(|entry| format!("{}{}", entry.pypi_name(), entry.version.pip_specifier())),
    );
    lines.join("\n")
}

/// Sorted package names of the entries enabled for `format`.
fn package_list(entries: &[&DependencyEntry], format: PackageFormat) -> String {
    let family = format.family();
    let mut packages = entries
        .iter()
        .filter(|entry| !entry.is_disabled_for(format))
        .map(|entry| entry.package_name(family))
        .collect::<Vec<_>>();
    packages.sort();
    packages.dedup();
    packages.join(&format!("\n{PACKAGES_INDENT}"))
}

/// Formats that have at least one enabled entry.
fn build_targets(entries: &[&DependencyEntry]) -> String {
    PackageFormat::ALL
        .into_iter()
        .filter(|format| entries.iter().any(|entry| !entry.is_disabled_for(*format)))
        .map(PackageFormat::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `<package> (>= <version>), ` for every Python entry enabled for dpkg,
/// ready to precede `${misc:Depends}`.
fn python3_depends(entries: &[&DependencyEntry]) -> String {
    entries
        .iter()
        .filter(|entry| entry.build_system.is_python())
        .filter(|entry| !entry.is_disabled_for(PackageFormat::Dpkg))
        .map(|entry| {
            format!(
                "{} {}, ",
                entry.package_name(PackageFamily::Dpkg),
                entry.version.dpkg_relation()
            )
        })
        .collect()
}

fn context(
    file: ProjectFile,
    project: &ProjectInfo,
    entries: &[&DependencyEntry],
    config: &RenderConfig,
) -> TemplateContext {
    let mut context = TemplateContext::new();
    context
        .insert("track", config.track.as_str())
        .insert("maintainer", config.maintainer.as_str())
        .insert_dates(config);
    match file {
        ProjectFile::Requirements => {
            context.insert("requirements", requirements(entries));
        }
        ProjectFile::GiftPpa => {
            context.insert("packages", package_list(entries, PackageFormat::Dpkg));
        }
        ProjectFile::GiftCopr => {
            context.insert("packages", package_list(entries, PackageFormat::Rpm));
        }
        ProjectFile::GithubActions => {
            context.insert("targets", build_targets(entries));
        }
        ProjectFile::ToxIni => {
            if let Some(module) = project.module_name() {
                context.insert("module_name", module);
            }
        }
        ProjectFile::DpkgControl => {
            if let Some(name) = &project.name {
                context.insert("project_name", name.to_ascii_lowercase());
            }
            if let Some(url) = &project.homepage_url {
                context.insert("homepage_url", url.as_str());
            }
            if let Some(description) = &project.description_short {
                context.insert("description_short", description.as_str());
            }
            if let Some(description) = &project.description_long {
                context.insert(
                    "description_long",
                    format_description_long(description, PackageFamily::Dpkg),
                );
            }
            context.insert("python3_depends", python3_depends(entries));
        }
    }
    context
}

/// Render `file` for `project` and its `entries`. A template at
/// `<templates_dir>/project/<name>` replaces the built-in body. Project
/// metadata a template needs but the manifest lacks is a missing field.
pub fn render_project_file(
    file: ProjectFile,
    project: &ProjectInfo,
    entries: &[&DependencyEntry],
    config: &RenderConfig,
    templates_dir: Option<&Path>,
) -> Result<RenderedArtifact, RenderError> {
    let candidates = templates_dir
        .map(|dir| vec![dir.join(OVERRIDE_DIR).join(file.template_name())])
        .unwrap_or_default();
    let (template, _) = load_override_or(file.template_name(), &candidates, file.builtin_body())?;
    let contents = template.substitute(&context(file, project, entries, config), file.as_str())?;
    Ok(RenderedArtifact {
        path: file.default_path(),
        contents,
        executable: file.is_executable(),
    })
}
