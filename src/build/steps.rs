//! Per-format tool invocations and package lookup.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use super::source::pack_tree;
use crate::manifest::{BuildSystem, DependencyEntry};
use crate::process::{Invocation, Tool};
use crate::target::{BuildTarget, PackageFamily, PackageFormat};

/// Working directories of one entry.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// `<work>/<target-slug>/<name>/`
    pub entry_dir: PathBuf,
    /// Unpacked source tree inside `entry_dir`.
    pub source_tree: PathBuf,
}

impl Workspace {
    pub fn rpm_topdir(&self) -> PathBuf {
        self.entry_dir.join("rpmbuild")
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.entry_dir.join("patches")
    }

    /// Name of the source tree directory, relative to `entry_dir`.
    pub fn tree_name(&self) -> String {
        self.source_tree
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory the rendered bundle is written below.
    pub fn bundle_root(&self, format: PackageFormat) -> PathBuf {
        match format.family() {
            PackageFamily::Rpm => self.rpm_topdir().join("SPECS"),
            PackageFamily::Dpkg | PackageFamily::Pypi => self.source_tree.clone(),
        }
    }
}

/// `<source-name>-<version>`, the tree name tools and tarballs expect.
pub fn source_dir_name(entry: &DependencyEntry) -> String {
    format!("{}-{}", entry.source_name(), entry.version_string())
}

/// Pristine upstream tarball dpkg expects next to the source tree.
pub fn write_orig_tarball(entry: &DependencyEntry, workspace: &Workspace) -> Result<PathBuf> {
    let orig = workspace.entry_dir.join(format!(
        "{}_{}.orig.tar.gz",
        entry.source_package_name(),
        entry.version_string()
    ));
    pack_tree(&workspace.source_tree, &source_dir_name(entry), &orig)?;
    Ok(orig)
}

/// Remove packaging files shipped upstream that the rendered bundle
/// replaces.
pub fn clear_packaging_dir(format: PackageFormat, workspace: &Workspace) -> Result<()> {
    if format.family() != PackageFamily::Dpkg {
        return Ok(());
    }
    let debian = workspace.source_tree.join("debian");
    if debian.exists() {
        fs::remove_dir_all(&debian)
            .with_context(|| format!("removing upstream '{}'", debian.display()))?;
    }
    Ok(())
}

/// Set up what the tools expect besides the source tree.
pub fn prepare_invoke(target: &BuildTarget, entry: &DependencyEntry, workspace: &Workspace) -> Result<()> {
    if target.family() != PackageFamily::Rpm {
        return Ok(());
    }
    let topdir = workspace.rpm_topdir();
    for sub in ["BUILD", "RPMS", "SOURCES", "SPECS", "SRPMS"] {
        fs::create_dir_all(topdir.join(sub))
            .with_context(|| format!("creating '{}'", topdir.join(sub).display()))?;
    }
    let archive = topdir
        .join("SOURCES")
        .join(format!("{}.tar.gz", source_dir_name(entry)));
    pack_tree(&workspace.source_tree, &source_dir_name(entry), &archive)
}

/// Invocation applying `patch` to the source tree.
pub fn patch_invocation(patch: &Path, workspace: &Workspace) -> Invocation {
    Invocation::new(Tool::Patch, &workspace.source_tree)
        .args(["-p1", "--forward", "--batch", "-i"])
        .arg(patch.display().to_string())
}

/// Tool invocations that build the package, in order.
pub fn invocations(
    target: &BuildTarget,
    entry: &DependencyEntry,
    workspace: &Workspace,
    source_date_epoch: i64,
) -> Vec<Invocation> {
    let tree = &workspace.source_tree;
    let epoch = source_date_epoch.to_string();
    let spec = format!("SPECS/{}.spec", entry.name);
    let topdir_define = format!("_topdir {}", workspace.rpm_topdir().display());

    let invocations = match target.format {
        PackageFormat::Dpkg => vec![Invocation::new(Tool::DpkgBuildpackage, tree)
            .args(["-uc", "-us", "-b", "-rfakeroot"])
            .env("DEB_BUILD_OPTIONS", "nocheck")],
        PackageFormat::DpkgSource => vec![Invocation::new(Tool::DpkgSource, &workspace.entry_dir)
            .args(["--auto-commit", "-b"])
            .arg(workspace.tree_name())],
        PackageFormat::Rpm => vec![Invocation::new(Tool::Rpmbuild, workspace.rpm_topdir())
            .args(["-bb", "--nocheck", "--define"])
            .arg(topdir_define)
            .arg(spec)],
        PackageFormat::Srpm => vec![Invocation::new(Tool::Rpmbuild, workspace.rpm_topdir())
            .args(["-bs", "--define"])
            .arg(topdir_define)
            .arg(spec)],
        PackageFormat::Wheel => vec![Invocation::new(Tool::Python, tree).args([
            "-m",
            "pip",
            "wheel",
            "--no-deps",
            "--no-build-isolation",
            "--wheel-dir",
            "dist",
            ".",
        ])],
        PackageFormat::Source if entry.build_system == BuildSystem::ConfigureMake => vec![
            Invocation::new(Tool::Shell, tree)
                .arg("./configure")
                .args(entry.configure_options.iter().cloned()),
            Invocation::new(Tool::Make, tree).arg("dist"),
        ],
        PackageFormat::Source => vec![Invocation::new(Tool::Python, tree).args([
            "-m",
            "build",
            "--sdist",
            "--no-isolation",
            "--outdir",
            "dist",
            ".",
        ])],
    };

    invocations
        .into_iter()
        .map(|invocation| invocation.env("SOURCE_DATE_EPOCH", epoch.as_str()))
        .collect()
}

/// Files below `dir` (up to `max_depth` levels) whose name satisfies
/// `accept`, sorted.
fn find_files(dir: &Path, max_depth: usize, accept: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let mut found = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|item| item.file_type().is_file())
        .filter(|item| accept(&item.file_name().to_string_lossy()))
        .map(|item| item.into_path())
        .collect::<Vec<_>>();
    found.sort();
    found
}

/// The package the tools produced for `entry`.
pub fn locate_package(
    target: &BuildTarget,
    entry: &DependencyEntry,
    workspace: &Workspace,
) -> Result<PathBuf> {
    let package_name = entry.package_name(target.family());
    let version = entry.version_string();
    let (dir, depth, found) = match target.format {
        PackageFormat::Dpkg => {
            let prefix = format!("{package_name}_{version}");
            let dir = workspace.entry_dir.clone();
            let found = find_files(&dir, 1, |name| {
                name.starts_with(&prefix) && name.ends_with(".deb") && !name.contains("-dbgsym")
            });
            (dir, 1, found)
        }
        PackageFormat::DpkgSource => {
            let prefix = format!("{}_{version}", entry.source_package_name());
            let dir = workspace.entry_dir.clone();
            let found = find_files(&dir, 1, |name| name.starts_with(&prefix) && name.ends_with(".dsc"));
            (dir, 1, found)
        }
        PackageFormat::Rpm => {
            let prefix = format!("{package_name}-{version}");
            let dir = workspace.rpm_topdir().join("RPMS");
            let found = find_files(&dir, 2, |name| {
                name.starts_with(&prefix)
                    && name.ends_with(".rpm")
                    && !name.ends_with(".src.rpm")
                    && !name.contains("-debuginfo")
                    && !name.contains("-debugsource")
            });
            (dir, 2, found)
        }
        PackageFormat::Srpm => {
            let dir = workspace.rpm_topdir().join("SRPMS");
            let found = find_files(&dir, 1, |name| name.ends_with(".src.rpm"));
            (dir, 1, found)
        }
        PackageFormat::Wheel => {
            let dir = workspace.source_tree.join("dist");
            let found = find_files(&dir, 1, |name| name.ends_with(".whl"));
            (dir, 1, found)
        }
        PackageFormat::Source if entry.build_system == BuildSystem::ConfigureMake => {
            let dir = workspace.source_tree.clone();
            let found = find_files(&dir, 1, |name| name.ends_with(".tar.gz"));
            (dir, 1, found)
        }
        PackageFormat::Source => {
            let dir = workspace.source_tree.join("dist");
            let found = find_files(&dir, 1, |name| name.ends_with(".tar.gz"));
            (dir, 1, found)
        }
    };

    match found.into_iter().next() {
        Some(path) => Ok(path),
        None => bail!(
            "no .{} package for '{}' found in '{}' (searched {} level(s))",
            target.format.extension(),
            entry.name,
            dir.display(),
            depth
        ),
    }
}
