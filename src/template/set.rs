use std::path::{Path, PathBuf};

use tracing::debug;

use super::builtin;
use super::Template;
use crate::error::TemplateError;
use crate::manifest::{BuildSystem, DependencyEntry};
use crate::target::{BuildTarget, PackageFormat};

/// One template of a set, with where its output goes.
#[derive(Debug, Clone)]
pub struct TemplateFile {
    /// Output path relative to the bundle root.
    pub output: PathBuf,
    pub executable: bool,
    pub template: Template,
    /// Template file that replaced the built-in body, if any.
    pub source: Option<PathBuf>,
}

/// Templates rendered for one entry and target.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    files: Vec<TemplateFile>,
}

struct Builtin {
    /// Name relative to a format directory, also used for overrides.
    name: &'static str,
    body: &'static str,
    executable: bool,
}

fn builtins(format: PackageFormat, build_system: BuildSystem) -> Vec<Builtin> {
    let native = !build_system.is_python();
    let file = |name, body, executable| Builtin {
        name,
        body,
        executable,
    };
    match format {
        PackageFormat::Dpkg | PackageFormat::DpkgSource => vec![
            file(
                "debian/control",
                if native {
                    builtin::DPKG_CONTROL_NATIVE
                } else {
                    builtin::DPKG_CONTROL_PYTHON
                },
                false,
            ),
            file(
                "debian/rules",
                if native {
                    builtin::DPKG_RULES_NATIVE
                } else {
                    builtin::DPKG_RULES_PYTHON
                },
                true,
            ),
            file("debian/changelog", builtin::DPKG_CHANGELOG, false),
            file("debian/source/format", builtin::DPKG_SOURCE_FORMAT, false),
            file("debian/source/options", builtin::DPKG_SOURCE_OPTIONS, false),
            file("debian/copyright", builtin::DPKG_COPYRIGHT, false),
        ],
        PackageFormat::Rpm | PackageFormat::Srpm => vec![file(
            "package.spec",
            if native {
                builtin::RPM_SPEC_NATIVE
            } else {
                builtin::RPM_SPEC_PYTHON
            },
            false,
        )],
        PackageFormat::Wheel | PackageFormat::Source => Vec::new(),
    }
}

/// Format directories searched for overrides, most specific first. Source
/// package formats fall back to the templates of their binary format.
fn override_formats(format: PackageFormat) -> &'static [PackageFormat] {
    match format {
        PackageFormat::DpkgSource => &[PackageFormat::DpkgSource, PackageFormat::Dpkg],
        PackageFormat::Srpm => &[PackageFormat::Srpm, PackageFormat::Rpm],
        PackageFormat::Dpkg => &[PackageFormat::Dpkg],
        PackageFormat::Rpm => &[PackageFormat::Rpm],
        PackageFormat::Wheel => &[PackageFormat::Wheel],
        PackageFormat::Source => &[PackageFormat::Source],
    }
}

/// Parse the first existing file of `candidates`, or `builtin` when none
/// exists. Returns the template and the file it came from.
pub(crate) fn load_override_or(
    name: &str,
    candidates: &[PathBuf],
    builtin: &str,
) -> Result<(Template, Option<PathBuf>), TemplateError> {
    match candidates.iter().find(|path| path.is_file()) {
        Some(path) => {
            debug!(template = name, path = %path.display(), "using template override");
            Ok((Template::load(name, path)?, Some(path.clone())))
        }
        None => Ok((Template::parse(name, builtin)?, None)),
    }
}

impl TemplateSet {
    /// Template set for `entry` on `target`.
    ///
    /// With a templates directory, `<dir>/<format>/<entry>/<file>` wins over
    /// `<dir>/<format>/<file>`, which wins over the built-in body.
    pub fn for_target(
        target: &BuildTarget,
        entry: &DependencyEntry,
        templates_dir: Option<&Path>,
    ) -> Result<Self, TemplateError> {
        let mut files = Vec::new();
        for default in builtins(target.format, entry.build_system) {
            let candidates = match templates_dir {
                Some(dir) => override_formats(target.format)
                    .iter()
                    .flat_map(|format| {
                        let format_dir = dir.join(format.as_str());
                        [
                            format_dir.join(&entry.name).join(default.name),
                            format_dir.join(default.name),
                        ]
                    })
                    .collect::<Vec<_>>(),
                None => Vec::new(),
            };
            let (template, source) = load_override_or(default.name, &candidates, default.body)?;

            let output = if default.name == "package.spec" {
                PathBuf::from(format!("{}.spec", entry.name))
            } else {
                PathBuf::from(default.name)
            };
            files.push(TemplateFile {
                output,
                executable: default.executable,
                template,
                source,
            });
        }
        Ok(Self { files })
    }

    pub fn files(&self) -> &[TemplateFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use std::fs;

    fn entry(build_system: &str) -> DependencyEntry {
        let text = format!(
            "[[dependency]]\nname = \"pytsk3\"\nversion = \"20231007\"\nbuild_system = \"{build_system}\"\n"
        );
        let manifest =
            Manifest::parse(&text, Path::new("dependencies.toml"), &Default::default()).unwrap();
        manifest.entries()[0].clone()
    }

    #[test]
    fn builtin_sets_per_format() {
        let python = entry("setup_py");
        let dpkg = TemplateSet::for_target(&BuildTarget::new(PackageFormat::Dpkg), &python, None)
            .unwrap();
        let outputs = dpkg
            .files()
            .iter()
            .map(|file| file.output.display().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            outputs,
            vec![
                "debian/control",
                "debian/rules",
                "debian/changelog",
                "debian/source/format",
                "debian/source/options",
                "debian/copyright"
            ]
        );

        let rpm =
            TemplateSet::for_target(&BuildTarget::new(PackageFormat::Srpm), &python, None).unwrap();
        assert_eq!(rpm.files()[0].output, PathBuf::from("pytsk3.spec"));

        let wheel =
            TemplateSet::for_target(&BuildTarget::new(PackageFormat::Wheel), &python, None)
                .unwrap();
        assert!(wheel.is_empty());
    }

    #[test]
    fn native_projects_get_native_rules() {
        let native = entry("configure_make");
        let set = TemplateSet::for_target(&BuildTarget::new(PackageFormat::Dpkg), &native, None)
            .unwrap();
        assert!(set.files()[1]
            .template
            .placeholders()
            .contains("configure_options"));
    }

    #[test]
    fn per_entry_override_wins_over_format_override() {
        let temp = tempfile::TempDir::new().unwrap();
        let format_dir = temp.path().join("dpkg");
        fs::create_dir_all(format_dir.join("pytsk3/debian")).unwrap();
        fs::create_dir_all(format_dir.join("debian")).unwrap();
        fs::write(format_dir.join("debian/control"), "generic ${name}\n").unwrap();
        fs::write(format_dir.join("pytsk3/debian/control"), "specific ${name}\n").unwrap();
        fs::write(format_dir.join("debian/copyright"), "copyright ${year}\n").unwrap();

        let set = TemplateSet::for_target(
            &BuildTarget::new(PackageFormat::DpkgSource),
            &entry("setup_py"),
            Some(temp.path()),
        )
        .unwrap();

        let control = &set.files()[0];
        assert_eq!(
            control.source.as_deref(),
            Some(format_dir.join("pytsk3/debian/control").as_path())
        );
        let copyright = set
            .files()
            .iter()
            .find(|file| file.output == Path::new("debian/copyright"))
            .unwrap();
        assert_eq!(
            copyright.source.as_deref(),
            Some(format_dir.join("debian/copyright").as_path())
        );
        let changelog = &set.files()[2];
        assert!(changelog.source.is_none());
    }

    #[test]
    fn broken_override_is_a_syntax_error() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("rpm")).unwrap();
        fs::write(temp.path().join("rpm/package.spec"), "Version: $ 1\n").unwrap();
        let err = TemplateSet::for_target(
            &BuildTarget::new(PackageFormat::Rpm),
            &entry("setup_py"),
            Some(temp.path()),
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }
}
