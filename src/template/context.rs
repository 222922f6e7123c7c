use std::collections::BTreeMap;

use time::format_description::well_known::Rfc2822;
use time::macros::format_description;

use crate::config::RenderConfig;
use crate::manifest::{BuildSystem, DependencyEntry};
use crate::target::{BuildTarget, PackageFamily};

/// Placeholder values available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    fn insert_opt(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Context for rendering `entry`'s packaging files for `target`.
    ///
    /// Optional entry fields are only present when the entry sets them.
    pub fn for_entry(entry: &DependencyEntry, target: &BuildTarget, config: &RenderConfig) -> Self {
        let family = target.family();
        let version = entry.version_string().to_string();
        let source_name = entry.source_name();

        let mut context = Self::new();
        context
            .insert("name", entry.name.as_str())
            .insert("version", version.as_str())
            .insert("version_constraint", entry.version.to_string())
            .insert("package_name", entry.package_name(family))
            .insert("source_package_name", entry.source_package_name())
            .insert("pypi_name", entry.pypi_name())
            .insert("source_archive", format!("{source_name}-{version}.tar.gz"))
            .insert("source_dir", format!("{source_name}-{version}"))
            .insert(
                "architecture",
                target.architecture.token(family, entry.is_noarch()),
            )
            .insert("format", target.format.as_str())
            .insert("build_system", entry.build_system.as_str())
            .insert("configure_options", entry.configure_options.join(" "))
            .insert("build_depends", build_depends(entry, family))
            .insert("depends", depends(entry, family))
            .insert("track", config.track.as_str())
            .insert("maintainer", config.maintainer.as_str());
        context
            .insert_opt("distribution", target.distribution.as_deref())
            .insert_opt("description_short", entry.description_short.as_deref())
            .insert_opt("homepage_url", entry.homepage_url.as_deref())
            .insert_opt("upstream_maintainer", entry.upstream_maintainer.as_deref());
        if let Some(description) = entry.description_long.as_deref() {
            context.insert("description_long", format_description_long(description, family));
        }
        if family == PackageFamily::Rpm {
            context.insert(
                "python_sitedir",
                if entry.requires_compile() {
                    "%{python3_sitearch}"
                } else {
                    "%{python3_sitelib}"
                },
            );
        }
        context.insert_dates(config);
        context
    }

    /// Build date fields derived from `config`.
    pub fn insert_dates(&mut self, config: &RenderConfig) -> &mut Self {
        let date = config.build_date;
        // These descriptions cannot fail for a dated UTC value.
        let rfc2822 = date.format(&Rfc2822).unwrap_or_default();
        let iso = date
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_default();
        let rpm = date
            .format(format_description!(
                "[weekday repr:short] [month repr:short] [day] [year]"
            ))
            .unwrap_or_default();
        self.insert("date_rfc2822", rfc2822)
            .insert("date", iso)
            .insert("date_rpm", rpm)
            .insert("year", date.year().to_string())
    }
}

/// Host package names for build dependencies known by their library name.
const BUILD_DEPENDENCY_PACKAGES: &[(&str, &str, &str)] = &[
    ("bzip2", "libbz2-dev", "bzip2-devel"),
    ("fuse", "libfuse-dev", "fuse-devel"),
    ("libcrypto", "libssl-dev", "openssl-devel"),
    ("liblzma", "liblzma-dev", "xz-devel"),
    ("sqlite", "libsqlite3-dev", "sqlite-devel"),
    ("zeromq", "libzmq3-dev", "zeromq-devel"),
    ("zlib", "zlib1g-dev", "zlib-devel"),
];

fn build_dependency_package(name: &str, family: PackageFamily) -> String {
    BUILD_DEPENDENCY_PACKAGES
        .iter()
        .find(|(library, _, _)| *library == name)
        .map(|(_, dpkg, rpm)| match family {
            PackageFamily::Dpkg => dpkg.to_string(),
            PackageFamily::Rpm => rpm.to_string(),
            PackageFamily::Pypi => name.to_string(),
        })
        .unwrap_or_else(|| name.to_string())
}

fn build_depends(entry: &DependencyEntry, family: PackageFamily) -> String {
    let mut packages: Vec<String> = match (family, entry.build_system) {
        (PackageFamily::Dpkg, BuildSystem::ConfigureMake) => {
            vec!["debhelper-compat (= 13)".into(), "autotools-dev".into()]
        }
        (PackageFamily::Dpkg, _) => {
            let mut base = vec![
                "debhelper-compat (= 13)".to_string(),
                "dh-python".to_string(),
                "python3-all".to_string(),
                "python3-setuptools".to_string(),
            ];
            if entry.requires_compile() {
                base.push("python3-all-dev".to_string());
            }
            base
        }
        (PackageFamily::Rpm, BuildSystem::ConfigureMake) => {
            vec!["gcc".into(), "make".into()]
        }
        (PackageFamily::Rpm, _) => {
            let mut base = vec!["python3-devel".to_string(), "python3-setuptools".to_string()];
            if entry.requires_compile() {
                base.push("gcc".to_string());
            }
            base
        }
        (PackageFamily::Pypi, _) => vec!["setuptools".into(), "wheel".into()],
    };
    packages.extend(
        entry
            .build_dependencies
            .iter()
            .map(|name| build_dependency_package(name, family)),
    );
    dedup_keep_order(&mut packages);
    packages.join(", ")
}

/// Runtime dependency names for a family. Dependencies are named by their
/// project name; dpkg and rpm use the `python3-` convention for Python
/// projects.
fn depends(entry: &DependencyEntry, family: PackageFamily) -> String {
    let mapped = entry.dependencies.iter().map(|name| match family {
        PackageFamily::Pypi => name.clone(),
        PackageFamily::Dpkg | PackageFamily::Rpm if entry.build_system.is_python() => {
            let base = name.to_ascii_lowercase().replace('_', "-");
            let base = base.strip_prefix("python-").unwrap_or(&base);
            format!("python3-{base}")
        }
        PackageFamily::Dpkg | PackageFamily::Rpm => name.clone(),
    });

    let mut packages: Vec<String> = match (family, entry.build_system.is_python()) {
        (PackageFamily::Dpkg, true) => vec!["${python3:Depends}".into(), "${misc:Depends}".into()],
        (PackageFamily::Dpkg, false) => vec!["${shlibs:Depends}".into(), "${misc:Depends}".into()],
        (PackageFamily::Rpm, true) => vec!["python3".into()],
        _ => Vec::new(),
    };
    packages.extend(mapped);
    dedup_keep_order(&mut packages);
    packages.join(", ")
}

fn dedup_keep_order(values: &mut Vec<String>) {
    let mut seen = std::collections::BTreeSet::new();
    values.retain(|value| seen.insert(value.clone()));
}

/// Debian descriptions indent continuation lines and mark paragraph breaks
/// with ` .`.
pub(crate) fn format_description_long(description: &str, family: PackageFamily) -> String {
    let description = description.trim();
    if family != PackageFamily::Dpkg {
        return description.to_string();
    }
    description
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if line.is_empty() {
                " .".to_string()
            } else {
                format!(" {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
