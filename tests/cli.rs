//! Smoke tests for the dep-builder binary.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[[dependency]]
name = "six"
version = "1.16.0"
flags = ["noarch"]
description_short = "Python 2 and 3 compatibility library"
description_long = "Six is a Python 2 and 3 compatibility library."
homepage_url = "https://github.com/benjaminp/six"

[[dependency]]
name = "pytsk3"
version = "20231007"
disabled = ["rpm"]

[presets.plaso]
projects = ["six", "pytsk3"]
"#;

/// A project directory with a manifest and a config that keeps every path
/// inside it. Tool overrides point at /bin/sh so host preflight passes
/// without packaging tools installed.
fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("dependencies.toml"), MANIFEST).unwrap();
    fs::write(
        temp.path().join("dep-builder.toml"),
        "maintainer = \"Packager <packager@example.org>\"\n\
         [tools]\n\
         python = \"/bin/sh\"\n\
         patch = \"/bin/sh\"\n",
    )
    .unwrap();
    temp
}

fn dep_builder(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dep-builder"));
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env("SOURCE_DATE_EPOCH", "1700000000")
        .env_remove("DEP_BUILDER_TRACK")
        .env_remove("DEP_BUILDER_MAINTAINER")
        .env_remove("DEP_BUILDER_PYTHON")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn list_shows_entries_and_disabled_formats() {
    let temp = project();
    dep_builder(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("six 1.16.0\n"))
        .stdout(predicate::str::contains("pytsk3 20231007 (disabled: rpm)"));
}

#[test]
fn list_presets() {
    let temp = project();
    dep_builder(temp.path())
        .args(["list", "--presets"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plaso: six, pytsk3"));
}

#[test]
fn render_writes_debian_directory() {
    let temp = project();
    let out = temp.path().join("rendered");
    dep_builder(temp.path())
        .args(["render", "--target", "dpkg", "--distribution", "bookworm", "--project", "six"])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("debian/control"));

    let changelog = fs::read_to_string(out.join("debian/changelog")).unwrap();
    assert!(changelog.starts_with("six (1.16.0-1) bookworm; urgency=low"));
    assert!(changelog.contains("Tue, 14 Nov 2023 22:13:20 +0000"));
    let control = fs::read_to_string(out.join("debian/control")).unwrap();
    assert!(control.contains("Package: python3-six"));
}

#[test]
fn render_fails_fast_on_missing_fields() {
    let temp = project();
    dep_builder(temp.path())
        .args(["render", "--target", "dpkg", "--project", "pytsk3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no value for"))
        .stderr(predicate::str::contains("homepage_url"));
}

#[test]
fn unknown_project_is_rejected() {
    let temp = project();
    dep_builder(temp.path())
        .args(["render", "--target", "rpm", "--project", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("undefined project(s): nope"));
}

#[test]
fn generate_requirements_to_stdout() {
    let temp = project();
    dep_builder(temp.path())
        .args(["generate", "requirements"])
        .assert()
        .success()
        .stdout("pip>=7.0.0\nsix>=1.16.0\npytsk3>=20231007\n");
}

#[test]
fn generate_install_script_to_file() {
    let temp = project();
    let out = temp.path().join("config/linux/gift_ppa_install.sh");
    dep_builder(temp.path())
        .args(["generate", "gift-ppa", "--out"])
        .arg(&out)
        .assert()
        .success();
    let script = fs::read_to_string(&out).unwrap();
    assert!(script.contains("PACKAGES=\"python3-pytsk3\n          python3-six\";"));
}

#[test]
fn status_without_report() {
    let temp = project();
    dep_builder(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("no run report in"));
}

#[test]
fn build_with_missing_sources_exits_one() {
    let temp = project();
    fs::create_dir_all(temp.path().join("sources")).unwrap();
    dep_builder(temp.path())
        .args(["build", "--target", "wheel", "--projects", "six", "--continue-on-error"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("0 succeeded, 1 failed, 0 skipped"))
        .stdout(predicate::str::contains("failed:  six (extract): no source archive"))
        .stderr(predicate::str::contains("1 of 1 dependencies failed"));

    assert!(temp.path().join("dist/run-report.json").is_file());
    dep_builder(temp.path())
        .arg("status")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed:  six (extract)"));
}

/// Stand-in for `python3 -m pip wheel`: drops a wheel named after the
/// source tree into `dist/`.
const FAKE_PIP: &str = "#!/bin/sh\n\
mkdir -p dist\n\
touch \"dist/$(basename \"$PWD\")-py3-none-any.whl\"\n";

#[test]
fn successful_build_writes_checksums() {
    let temp = project();
    let tree = temp.path().join("upstream/six");
    fs::create_dir_all(&tree).unwrap();
    fs::write(tree.join("setup.py"), "from setuptools import setup\n").unwrap();
    dep_builder::build::source::pack_tree(
        &tree,
        "six-1.16.0",
        &temp.path().join("sources/six-1.16.0.tar.gz"),
    )
    .unwrap();
    let pip = temp.path().join("fake-pip");
    fs::write(&pip, FAKE_PIP).unwrap();
    fs::set_permissions(&pip, fs::Permissions::from_mode(0o755)).unwrap();

    dep_builder(temp.path())
        .env("DEP_BUILDER_PYTHON", &pip)
        .args(["build", "--target", "wheel", "--projects", "six"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 succeeded, 0 failed, 0 skipped"))
        .stdout(predicate::str::contains("built:   six -> six-1.16.0-py3-none-any.whl"));

    assert!(temp.path().join("dist/six-1.16.0-py3-none-any.whl").is_file());
    let sums = fs::read_to_string(temp.path().join("dist/SHA256SUMS")).unwrap();
    assert!(sums.ends_with("  six-1.16.0-py3-none-any.whl\n"), "{sums}");

    dep_builder(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 succeeded"));
}

#[test]
fn unknown_target_is_a_usage_error() {
    let temp = project();
    dep_builder(temp.path())
        .args(["build", "--target", "msi"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("msi"));
}
