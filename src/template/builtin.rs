//! Built-in template bodies.
//!
//! Every body here can be replaced from a templates directory; see
//! [`super::TemplateSet`].

pub const DPKG_CONTROL_PYTHON: &str = "\
Source: ${source_package_name}
Section: python
Priority: optional
Maintainer: ${maintainer}
Build-Depends: ${build_depends}
Standards-Version: 4.6.2
Rules-Requires-Root: no
Homepage: ${homepage_url}

Package: ${package_name}
Architecture: ${architecture}
Depends: ${depends}
Description: ${description_short}
${description_long}
";

pub const DPKG_CONTROL_NATIVE: &str = "\
Source: ${source_package_name}
Section: libs
Priority: optional
Maintainer: ${maintainer}
Build-Depends: ${build_depends}
Standards-Version: 4.6.2
Rules-Requires-Root: no
Homepage: ${homepage_url}

Package: ${package_name}
Architecture: ${architecture}
Depends: ${depends}
Description: ${description_short}
${description_long}
";

pub const DPKG_RULES_PYTHON: &str = "\
#!/usr/bin/make -f

export PYBUILD_NAME=${pypi_name}
export PYBUILD_DISABLE=test

%:
\tdh $$@ --buildsystem=pybuild --with=python3
";

pub const DPKG_RULES_NATIVE: &str = "\
#!/usr/bin/make -f

%:
\tdh $$@

override_dh_auto_configure:
\tdh_auto_configure -- ${configure_options}

override_dh_auto_test:
";

pub const DPKG_CHANGELOG: &str = "\
${source_package_name} (${version}-1) ${distribution}; urgency=low

  * Auto-generated from the ${track} dependency track.

 -- ${maintainer}  ${date_rfc2822}
";

pub const DPKG_SOURCE_FORMAT: &str = "3.0 (quilt)\n";

pub const DPKG_SOURCE_OPTIONS: &str = "\
extend-diff-ignore = \"(^|/)(config\\.log|config\\.status|Makefile|[^/]*\\.egg-info/.*)$$\"
";

pub const DPKG_COPYRIGHT: &str = "\
Format: https://www.debian.org/doc/packaging-manuals/copyright-format/1.0/
Upstream-Name: ${pypi_name}
Source: ${homepage_url}

Files: *
Copyright: upstream authors
License: see upstream

Files: debian/*
Copyright: ${year} ${maintainer}
License: Apache-2.0
";

pub const RPM_SPEC_PYTHON: &str = "\
Name: ${package_name}
Version: ${version}
Release: 1%{?dist}
Summary: ${description_short}
License: see upstream
URL: ${homepage_url}
Source0: ${source_archive}
BuildArch: ${architecture}
BuildRequires: ${build_depends}
Requires: ${depends}

%description
${description_long}

%prep
%autosetup -n ${source_dir}

%build
%py3_build

%install
%py3_install

%files
${python_sitedir}/*

%changelog
* ${date_rpm} ${maintainer} - ${version}-1
- Auto-generated from the ${track} dependency track.
";

pub const RPM_SPEC_NATIVE: &str = "\
Name: ${package_name}
Version: ${version}
Release: 1%{?dist}
Summary: ${description_short}
License: see upstream
URL: ${homepage_url}
Source0: ${source_archive}
BuildRequires: ${build_depends}

%description
${description_long}

%prep
%autosetup -n ${source_dir}

%build
%configure ${configure_options}
%make_build

%install
%make_install

%files
%{_prefix}/*

%changelog
* ${date_rpm} ${maintainer} - ${version}-1
- Auto-generated from the ${track} dependency track.
";

pub const DOCKERFILE_DPKG: &str = "\
FROM ${base_image}:${image_tag}
LABEL maintainer=\"${maintainer}\"

ENV DEBIAN_FRONTEND=noninteractive

RUN apt-get update -q && \\
    apt-get install -y -q --no-install-recommends \\
      autotools-dev build-essential debhelper devscripts dh-python \\
      fakeroot patch python3-all python3-all-dev python3-pip \\
      python3-setuptools python3-wheel && \\
    apt-get clean && rm -rf /var/lib/apt/lists/*
";

pub const DOCKERFILE_RPM: &str = "\
FROM ${base_image}:${image_tag}
LABEL maintainer=\"${maintainer}\"

RUN dnf install -y \\
      gcc gcc-c++ make patch rpm-build python3-devel python3-pip \\
      python3-setuptools python3-wheel && \\
    dnf clean all
";

pub const DOCKERFILE_PYTHON: &str = "\
FROM ${base_image}:${image_tag}
LABEL maintainer=\"${maintainer}\"

RUN apt-get update -q && \\
    apt-get install -y -q --no-install-recommends build-essential make patch && \\
    apt-get clean && rm -rf /var/lib/apt/lists/* && \\
    pip install --no-cache-dir build setuptools wheel
";

pub const REQUIREMENTS_TXT: &str = "\
${requirements}
";

pub const GIFT_PPA_SCRIPT: &str = "\
#!/usr/bin/env bash
#
# Script to set up a Ubuntu host with the ${track} dependencies.

set -e

PACKAGES=\"${packages}\";

sudo add-apt-repository ppa:gift/${track} -y
sudo apt-get update -q
sudo apt-get install -q -y $${PACKAGES}
";

pub const GIFT_COPR_SCRIPT: &str = "\
#!/usr/bin/env bash
#
# Script to set up a Fedora host with the ${track} dependencies.

set -e

PACKAGES=\"${packages}\";

sudo dnf install -y dnf-plugins-core
sudo dnf copr -y enable @gift/${track}
sudo dnf install -y $${PACKAGES}
";

pub const GITHUB_ACTIONS: &str = "\
name: build_dependencies
on: [push, pull_request]
permissions: read-all
jobs:
  build:
    runs-on: ubuntu-22.04
    strategy:
      fail-fast: false
      matrix:
        target: [${targets}]
    env:
      DEP_BUILDER_TRACK: ${track}
    steps:
    - uses: actions/checkout@v4
    - uses: dtolnay/rust-toolchain@stable
    - name: Build dependencies
      run: |
        cargo run --release -- build --target $${{ matrix.target }} --env docker --continue-on-error
    - uses: actions/upload-artifact@v4
      with:
        name: packages-$${{ matrix.target }}
        path: dist/
";

pub const TOX_INI: &str = "\
[tox]
envlist = py3{10,11,12},coverage,lint

[testenv]
allowlist_externals = ./run_tests.py
pip_pre = True
passenv =
  CFLAGS
  CPPFLAGS
  LDFLAGS
setenv =
  PYTHONPATH = {toxinidir}
deps =
  -rrequirements.txt
  coverage: coverage
commands =
  py3{10,11,12}: ./run_tests.py
  coverage: coverage erase
  coverage: coverage run --source=${module_name} --omit=\"*_test*,*__init__*,*test_lib*\" run_tests.py
  coverage: coverage xml

[testenv:lint]
skipsdist = True
deps =
  -rrequirements.txt
  pylint >= 3.0.0, < 3.1.0
commands =
  pylint --version
  pylint --rcfile=.pylintrc ${module_name} tests
";

pub const PROJECT_DPKG_CONTROL: &str = "\
Source: ${project_name}
Section: python
Priority: extra
Maintainer: ${maintainer}
Build-Depends: debhelper (>= 9), dh-python, python3-all (>= 3.6~), python3-setuptools
Standards-Version: 4.1.4
X-Python3-Version: >= 3.6
Homepage: ${homepage_url}

Package: python3-${project_name}
Architecture: all
Depends: ${python3_depends}$${misc:Depends}
Description: Python 3 module of ${description_short}
${description_long}
";
